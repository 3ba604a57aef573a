//! Credential storage.
//!
//! Holds the user's long-lived login material and the refresh state of the
//! current session. Pure data access; the protocol lives in [`crate::session`].

mod error;
mod store;
mod types;

pub use error::CredentialError;
pub use store::{CredentialStore, MemoryCredentialStore};
pub use types::{Credentials, RefreshState};
