//! Read-through repository over the session caches and local orders.

mod bank;
mod error;

pub use bank::{BankRepository, TransactionKey};
pub use error::{DataError, UnavailableCause};
