//! Client for the comdirect REST API.
//!
//! The crate is a thin protocol layer: each module maps one area of the API
//! to plain async functions taking a [`ComdirectClient`]. It performs no
//! retries and keeps no session state; callers own both.
//!
//! - [`oauth`]: password, `cd_secondary` and `refresh_token` grants
//! - [`session`]: session status, validation (push-TAN challenge) and activation
//! - [`banking`]: account balances and transactions
//! - [`brokerage`]: order placement

pub mod banking;
pub mod brokerage;
pub mod client;
pub mod error;
pub mod models;
pub mod oauth;
pub mod session;

pub use client::{
    ComdirectClient, DEFAULT_API_BASE_URL, DEFAULT_OAUTH_URL, RequestContext,
    install_rustls_provider,
};
pub use error::ApiError;
