//! Session lifecycle notifications.

use chrono::{DateTime, Utc};

use super::types::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum InvalidationReason {
    /// The bank refused the session's token.
    Rejected,
    RefreshFailed,
    /// The token ran out with nothing to refresh it with.
    Expired,
    Logout,
    /// The login was cancelled after the bank had already granted the session.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established {
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    },
    Renewed {
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    },
    Invalidated {
        session_id: SessionId,
        reason: InvalidationReason,
    },
}

/// Synchronously told about invalidated sessions, before the scheduler moves on.
pub trait SessionObserver: Send + Sync {
    fn on_session_invalidated(&self, session_id: &SessionId, reason: InvalidationReason);
}
