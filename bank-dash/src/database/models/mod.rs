//! Row models. Timestamps are epoch milliseconds, enums stored as text.

pub mod credential;
pub mod history;
pub mod order;
pub mod sync_log;

pub use credential::*;
pub use history::*;
pub use order::*;
pub use sync_log::*;
