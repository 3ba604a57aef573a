//! Boundary to the bank's API.
//!
//! [`ChallengeTransport`] carries the handshake and token calls,
//! [`BankingTransport`] the data calls made with a session-bound token.
//! Implementations live in [`super::platforms`]; retries are layered on top by
//! [`super::retry::RetryingTransport`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::types::{ChallengeDescriptor, ChallengeStatus, SessionId, TokenGrant};
use crate::credentials::Credentials;
use crate::domain::{AccountBalance, AccountTransaction, LocalOrder, OrderAck, TransactionQuery};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The bank answered, but not in a shape we understand.
    #[error("malformed response: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// A 4xx refusal other than timeout/throttling.
    pub fn is_rejection(&self) -> bool {
        matches!(self.status(), Some(s) if (400..500).contains(&s) && s != 408 && s != 429)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Session id and bearer token attached to a call.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    pub session_id: SessionId,
    pub access_token: &'a str,
}

impl<'a> CallContext<'a> {
    pub fn new(session_id: SessionId, access_token: &'a str) -> Self {
        Self {
            session_id,
            access_token,
        }
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ChallengeTransport: Send + Sync {
    /// Exchange long-lived credentials for a primary token.
    async fn primary_grant(&self, credentials: &Credentials) -> Result<TokenGrant, TransportError>;

    /// Validate the session opened by the primary token; yields the challenge.
    async fn validate(&self, ctx: CallContext<'_>) -> Result<ChallengeDescriptor, TransportError>;

    async fn poll_challenge(
        &self,
        ctx: CallContext<'_>,
        challenge: &ChallengeDescriptor,
    ) -> Result<ChallengeStatus, TransportError>;

    /// Confirm an approved challenge.
    async fn activate_challenge(
        &self,
        ctx: CallContext<'_>,
        challenge: &ChallengeDescriptor,
    ) -> Result<(), TransportError>;

    /// Exchange the primary token of an activated session for a session-bound pair.
    async fn secondary_grant(
        &self,
        credentials: &Credentials,
        ctx: CallContext<'_>,
    ) -> Result<TokenGrant, TransportError>;

    async fn refresh(
        &self,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, TransportError>;

    /// Revoke a token on logout. Banks without revocation keep the default.
    async fn revoke(&self, _access_token: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
pub trait BankingTransport: Send + Sync {
    async fn fetch_balances(
        &self,
        ctx: CallContext<'_>,
    ) -> Result<Vec<AccountBalance>, TransportError>;

    async fn fetch_transactions(
        &self,
        ctx: CallContext<'_>,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<AccountTransaction>, TransportError>;

    /// Submit an order. Never retried automatically.
    async fn submit_order(
        &self,
        ctx: CallContext<'_>,
        order: &LocalOrder,
    ) -> Result<OrderAck, TransportError>;
}
