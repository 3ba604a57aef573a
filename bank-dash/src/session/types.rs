use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AuthError;
use super::transport::CallContext;

/// Client-side session id. Sent to the bank with every request of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Handshake phase of a login attempt.
///
/// `Active` and `Failed` end an attempt. A failed attempt is never resumed;
/// the next login starts over from `Unauthenticated`.
#[derive(Debug, Clone)]
pub enum SessionPhase {
    Unauthenticated,
    /// Primary (unprivileged) token obtained.
    PrimaryGranted,
    /// The bank issued a challenge; waiting for the user to approve it.
    ChallengeIssued,
    /// Challenge approved, activation outstanding.
    ChallengePending,
    /// Session TAN activated, secondary grant outstanding.
    Activated,
    Active,
    Failed(AuthError),
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::PrimaryGranted => "primary_granted",
            Self::ChallengeIssued => "challenge_issued",
            Self::ChallengePending => "challenge_pending",
            Self::Activated => "activated",
            Self::Active => "active",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Whether the user is expected to approve a challenge right now.
    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self, Self::ChallengeIssued)
    }

    pub fn failure(&self) -> Option<&AuthError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn same_phase(&self, other: &SessionPhase) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "failed ({})", err.kind()),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    /// Nothing to wait for; the session can be activated right away.
    ImmediateApproval,
    /// Approved out of band; its status has to be polled.
    TimedPoll,
}

/// Challenge issued by session validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDescriptor {
    /// The bank's identifier of the session being validated.
    pub remote_session_id: String,
    pub challenge_id: String,
    pub kind: ChallengeKind,
    /// Text to show the user, if the bank sent any.
    pub prompt: Option<String>,
    /// Where the challenge status is polled.
    pub status_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    Primary,
    /// Secondary token bound to an activated session; the one used for data calls.
    SessionBound,
}

/// Raw answer of a token grant.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Duration,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// An issued token pair. Never mutated; renewal produces a new pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    access_token: String,
    refresh_token: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    scope: TokenScope,
}

impl TokenPair {
    pub fn from_grant(grant: TokenGrant, scope: TokenScope, issued_at: DateTime<Utc>) -> Self {
        let lifetime =
            chrono::Duration::from_std(grant.expires_in).unwrap_or(chrono::Duration::zero());
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            issued_at,
            expires_at: issued_at + lifetime,
            scope,
        }
    }

    /// Same as [`TokenPair::from_grant`], keeping `previous` refresh token when the grant has none.
    pub fn renewed(
        grant: TokenGrant,
        previous: &TokenPair,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let mut pair = Self::from_grant(grant, previous.scope, issued_at);
        if pair.refresh_token.is_none() {
            pair.refresh_token = previous.refresh_token.clone();
        }
        pair
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scope(&self) -> TokenScope {
        self.scope
    }

    /// Remaining lifetime; negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True unless more than `margin` of lifetime is left.
    pub fn needs_renewal(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.remaining(now)
            .to_std()
            .map(|remaining| remaining <= margin)
            .unwrap_or(true)
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("scope", &self.scope)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// A login session as driven by the state machine.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    pub(super) phase: SessionPhase,
    pub(super) primary: Option<TokenPair>,
    pub(super) session_bound: bool,
    pub(super) challenge: Option<ChallengeDescriptor>,
    created_at: DateTime<Utc>,
    pub(super) expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub(crate) fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            phase: SessionPhase::Unauthenticated,
            primary: None,
            session_bound: false,
            challenge: None,
            created_at,
            expires_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn primary_token(&self) -> Option<&TokenPair> {
        self.primary.as_ref()
    }

    pub fn is_session_bound(&self) -> bool {
        self.session_bound
    }

    pub fn challenge(&self) -> Option<&ChallengeDescriptor> {
        self.challenge.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            phase: self.phase.clone(),
            challenge_kind: self.challenge.as_ref().map(|c| c.kind),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Read-only view of a session for presentation layers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub phase: SessionPhase,
    pub challenge_kind: Option<ChallengeKind>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The session-bound token handed out to data callers, tagged with its session.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub session_id: SessionId,
    pub tokens: Arc<TokenPair>,
}

impl SessionToken {
    pub fn new(session_id: SessionId, tokens: TokenPair) -> Self {
        Self {
            session_id,
            tokens: Arc::new(tokens),
        }
    }

    pub fn access_token(&self) -> &str {
        self.tokens.access_token()
    }

    pub fn context(&self) -> CallContext<'_> {
        CallContext::new(self.session_id, self.tokens.access_token())
    }
}
