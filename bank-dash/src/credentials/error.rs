//! Credential error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credentials stored for the user.
    #[error("No credentials configured for user {0}")]
    NotFound(String),

    /// Stored credentials are incomplete.
    #[error("Invalid credentials: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CredentialError {
    /// Whether the user has to supply credentials before a login can succeed.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Invalid(_))
    }
}

impl From<crate::Error> for CredentialError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Database(e) => CredentialError::Database(e),
            crate::Error::NotFound { id, .. } => CredentialError::NotFound(id),
            crate::Error::Validation(msg) => CredentialError::Invalid(msg),
            other => CredentialError::Internal(other.to_string()),
        }
    }
}
