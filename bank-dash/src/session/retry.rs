//! Retry policy and the retrying transport wrapper.
//!
//! All transport retries happen here. The primary grant and order submission
//! go straight through: the first so that a wrong password is not replayed,
//! the second because the bank gives no idempotency guarantee.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::transport::{BankingTransport, CallContext, ChallengeTransport, TransportError};
use super::types::{ChallengeDescriptor, ChallengeStatus, TokenGrant};
use crate::credentials::Credentials;
use crate::domain::{AccountBalance, AccountTransaction, LocalOrder, OrderAck, TransactionQuery};

/// Retry policy for transient transport errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    #[serde(default = "default_true")]
    pub use_jitter: bool,
    /// HTTP statuses worth retrying.
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_retry_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn no_retry() -> Self {
        Self::with_max_retries(0)
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = base_delay.min(self.max_delay_ms as f64) as u64;

        if self.use_jitter {
            let jitter = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            Duration::from_millis(delay_ms + jitter)
        } else {
            Duration::from_millis(delay_ms)
        }
    }

    /// Delay before retrying `err`; a server-sent `Retry-After` wins, capped at the max delay.
    pub fn delay_for(&self, attempt: u32, err: &TransportError) -> Duration {
        match err.retry_after() {
            Some(retry_after) => retry_after.min(Duration::from_millis(self.max_delay_ms)),
            None => self.delay_for_attempt(attempt),
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn is_retryable(&self, err: &TransportError) -> bool {
        match err {
            TransportError::Network(_) | TransportError::Timeout => true,
            TransportError::Status { status, .. } => self.retry_statuses.contains(status),
            TransportError::Protocol(_) => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            use_jitter: default_true(),
            retry_statuses: default_retry_statuses(),
        }
    }
}

/// Wraps a transport and retries its idempotent calls according to a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn retry<R, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<R, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if self.policy.is_retryable(&err) && self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt, &err);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transport call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<T: ChallengeTransport> ChallengeTransport for RetryingTransport<T> {
    async fn primary_grant(&self, credentials: &Credentials) -> Result<TokenGrant, TransportError> {
        self.inner.primary_grant(credentials).await
    }

    async fn validate(&self, ctx: CallContext<'_>) -> Result<ChallengeDescriptor, TransportError> {
        self.retry("validate", || self.inner.validate(ctx)).await
    }

    async fn poll_challenge(
        &self,
        ctx: CallContext<'_>,
        challenge: &ChallengeDescriptor,
    ) -> Result<ChallengeStatus, TransportError> {
        self.retry("poll_challenge", || self.inner.poll_challenge(ctx, challenge))
            .await
    }

    async fn activate_challenge(
        &self,
        ctx: CallContext<'_>,
        challenge: &ChallengeDescriptor,
    ) -> Result<(), TransportError> {
        self.retry("activate_challenge", || {
            self.inner.activate_challenge(ctx, challenge)
        })
        .await
    }

    async fn secondary_grant(
        &self,
        credentials: &Credentials,
        ctx: CallContext<'_>,
    ) -> Result<TokenGrant, TransportError> {
        self.retry("secondary_grant", || {
            self.inner.secondary_grant(credentials, ctx)
        })
        .await
    }

    async fn refresh(
        &self,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, TransportError> {
        self.retry("refresh", || self.inner.refresh(credentials, refresh_token))
            .await
    }

    async fn revoke(&self, access_token: &str) -> Result<(), TransportError> {
        self.inner.revoke(access_token).await
    }
}

#[async_trait]
impl<T: BankingTransport> BankingTransport for RetryingTransport<T> {
    async fn fetch_balances(
        &self,
        ctx: CallContext<'_>,
    ) -> Result<Vec<AccountBalance>, TransportError> {
        self.retry("fetch_balances", || self.inner.fetch_balances(ctx))
            .await
    }

    async fn fetch_transactions(
        &self,
        ctx: CallContext<'_>,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<AccountTransaction>, TransportError> {
        self.retry("fetch_transactions", || {
            self.inner.fetch_transactions(ctx, account_id, query)
        })
        .await
    }

    async fn submit_order(
        &self,
        ctx: CallContext<'_>,
        order: &LocalOrder,
    ) -> Result<OrderAck, TransportError> {
        self.inner.submit_order(ctx, order).await
    }
}
