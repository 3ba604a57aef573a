//! Authentication error types.

use thiserror::Error;

use super::transport::TransportError;

/// Why a login, a handshake step or a renewal failed.
///
/// `Clone` so that one failed renewal can be handed to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The bank refused the long-lived credentials.
    #[error("Invalid credentials: {reason}")]
    InvalidCredentials { reason: String },

    /// The bank refused the session (validation, or a 401 on a session-bound call).
    #[error("Session rejected: {reason}")]
    SessionRejected { reason: String },

    #[error("Challenge expired before it was approved")]
    ChallengeExpired,

    #[error("Challenge rejected")]
    ChallengeRejected,

    #[error("Secondary token grant denied: {reason}")]
    SecondaryGrantDenied { reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Login cancelled")]
    Cancelled,

    #[error("Credential store unavailable: {0}")]
    CredentialStore(String),
}

/// Error category without payload, for presentation and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AuthErrorKind {
    InvalidCredentials,
    SessionRejected,
    ChallengeExpired,
    ChallengeRejected,
    SecondaryGrantDenied,
    Transport,
    Protocol,
    Cancelled,
    CredentialStore,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::InvalidCredentials { .. } => AuthErrorKind::InvalidCredentials,
            Self::SessionRejected { .. } => AuthErrorKind::SessionRejected,
            Self::ChallengeExpired => AuthErrorKind::ChallengeExpired,
            Self::ChallengeRejected => AuthErrorKind::ChallengeRejected,
            Self::SecondaryGrantDenied { .. } => AuthErrorKind::SecondaryGrantDenied,
            Self::Transport(_) => AuthErrorKind::Transport,
            Self::Protocol(_) => AuthErrorKind::Protocol,
            Self::Cancelled => AuthErrorKind::Cancelled,
            Self::CredentialStore(_) => AuthErrorKind::CredentialStore,
        }
    }

    /// Whether trying again later may succeed without user involvement.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::CredentialStore(_))
    }

    /// Whether the user has to go through the login again.
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. }
                | Self::SessionRejected { .. }
                | Self::ChallengeExpired
                | Self::ChallengeRejected
                | Self::SecondaryGrantDenied { .. }
                | Self::Cancelled
        )
    }

    /// Classify a transport failure of a handshake step.
    ///
    /// Malformed answers become [`AuthError::Protocol`], refusals by the bank
    /// become whatever `on_rejection` builds, everything else stays a
    /// transport error.
    pub fn from_transport(err: TransportError, on_rejection: impl FnOnce(String) -> AuthError) -> Self {
        match err {
            TransportError::Protocol(msg) => AuthError::Protocol(msg),
            err if err.is_rejection() => on_rejection(err.to_string()),
            err => AuthError::Transport(err),
        }
    }
}
