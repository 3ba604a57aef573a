//! bank-dash library crate.
//!
//! Push-TAN session management for the bank's API, single-flight token
//! renewal and a repository that caches account data per session.

pub mod cache;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod database;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod repository;
pub mod session;

pub use error::{Error, Result};
