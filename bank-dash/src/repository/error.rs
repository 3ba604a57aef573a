use thiserror::Error;

use crate::domain::OrderStatus;
use crate::session::{AuthError, TransportError};

/// Why data could not be fetched.
#[derive(Debug, Clone, Error)]
pub enum UnavailableCause {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum DataError {
    /// Nothing usable in the cache and the fetch failed.
    #[error("{resource} unavailable: {cause}")]
    Unavailable {
        resource: String,
        #[source]
        cause: UnavailableCause,
    },

    /// The order is in a state that does not allow syncing.
    #[error("Order {order_id} cannot be synced while {status}")]
    SyncConflict { order_id: String, status: OrderStatus },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error(transparent)]
    Storage(#[from] crate::Error),
}

impl DataError {
    pub(crate) fn unavailable(resource: impl Into<String>, cause: impl Into<UnavailableCause>) -> Self {
        Self::Unavailable {
            resource: resource.into(),
            cause: cause.into(),
        }
    }

    /// The authentication failure behind this error, if any.
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            Self::Unavailable {
                cause: UnavailableCause::Auth(err),
                ..
            } => Some(err),
            _ => None,
        }
    }

    /// Whether the presentation layer should send the user back to the login.
    pub fn requires_relogin(&self) -> bool {
        self.auth_error().is_some_and(AuthError::requires_relogin)
    }
}
