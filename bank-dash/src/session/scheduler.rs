//! Token renewal scheduler.
//!
//! [`TokenScheduler::acquire_token`] is the single entry point for a usable
//! session-bound token. It returns the current token while more than the
//! safety margin of its lifetime is left; otherwise it refreshes the token,
//! and when that fails it invalidates the session and runs a new handshake.
//!
//! Renewals are single-flight: callers arriving while one is running wait
//! for it and receive the same result.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, OnceCell, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::AuthError;
use super::events::{InvalidationReason, SessionEvent, SessionObserver};
use super::machine::{EstablishedSession, SessionStateMachine};
use super::types::{Session, SessionId, SessionPhase, SessionSnapshot, SessionToken, TokenPair};
use crate::clock::Clock;
use crate::credentials::{CredentialError, CredentialStore, Credentials, RefreshState};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalConfig {
    /// Renew once no more than this much lifetime is left.
    pub safety_margin: Duration,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(60),
        }
    }
}

type RenewalResult = Result<SessionToken, AuthError>;

fn no_active_session() -> AuthError {
    AuthError::SessionRejected {
        reason: "no active session".to_string(),
    }
}

struct InFlightRenewal {
    result: OnceCell<RenewalResult>,
    notify: Notify,
}

impl InFlightRenewal {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn ready(result: RenewalResult) -> Self {
        Self {
            result: OnceCell::new_with(Some(result)),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: RenewalResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> RenewalResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

struct ActiveSession {
    session: Session,
    token: SessionToken,
}

pub struct TokenScheduler {
    user_id: String,
    machine: Arc<SessionStateMachine>,
    credentials: Arc<dyn CredentialStore>,
    config: RenewalConfig,
    current: RwLock<Option<ActiveSession>>,
    in_flight: Mutex<Option<Arc<InFlightRenewal>>>,
    attempt_cancel: Mutex<Option<CancellationToken>>,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl TokenScheduler {
    pub fn new(
        user_id: impl Into<String>,
        machine: Arc<SessionStateMachine>,
        credentials: Arc<dyn CredentialStore>,
        config: RenewalConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            user_id: user_id.into(),
            machine,
            credentials,
            config,
            current: RwLock::new(None),
            in_flight: Mutex::new(None),
            attempt_cancel: Mutex::new(None),
            observers: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.machine.clock()
    }

    pub fn register_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observers.write().push(observer);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.machine.subscribe()
    }

    /// Id of the active session, without triggering any renewal.
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.current.read().as_ref().map(|a| a.token.session_id)
    }

    pub fn has_active_session(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn session_info(&self) -> Option<SessionSnapshot> {
        self.current.read().as_ref().map(|a| a.session.snapshot())
    }

    pub fn is_renewing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    fn fresh_token(&self) -> Option<SessionToken> {
        let current = self.current.read();
        let active = current.as_ref()?;
        let now = self.clock().now();
        if active.token.tokens.needs_renewal(now, self.config.safety_margin) {
            None
        } else {
            Some(active.token.clone())
        }
    }

    /// Get a token that stays valid for at least the safety margin.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn acquire_token(self: &Arc<Self>) -> Result<SessionToken, AuthError> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }
        let renewal = self.join_or_start_renewal(true);
        renewal.wait().await
    }

    /// Like [`TokenScheduler::acquire_token`], but never starts a login.
    ///
    /// Fails when there is no session or its refresh fails. For background
    /// work that must not prompt the user for a push-TAN.
    pub async fn acquire_token_silently(self: &Arc<Self>) -> Result<SessionToken, AuthError> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }
        if !self.has_active_session() {
            return Err(no_active_session());
        }
        let renewal = self.join_or_start_renewal(false);
        renewal.wait().await
    }

    fn join_or_start_renewal(self: &Arc<Self>, interactive: bool) -> Arc<InFlightRenewal> {
        let mut slot = self.in_flight.lock();
        if let Some(existing) = slot.as_ref() {
            debug!("Joining in-flight renewal");
            return Arc::clone(existing);
        }
        // A renewal may have finished between the fast path and taking the slot.
        if let Some(token) = self.fresh_token() {
            return Arc::new(InFlightRenewal::ready(Ok(token)));
        }

        let renewal = Arc::new(InFlightRenewal::new());
        *slot = Some(Arc::clone(&renewal));
        let cancel = CancellationToken::new();
        *self.attempt_cancel.lock() = Some(cancel.clone());

        // Detached, so an abandoned waiter does not abort the renewal for the others.
        let this = Arc::clone(self);
        let task_renewal = Arc::clone(&renewal);
        tokio::spawn(async move {
            let result = this.renew(&cancel, interactive).await;
            this.complete_renewal(&task_renewal, result);
        });

        renewal
    }

    fn complete_renewal(&self, renewal: &Arc<InFlightRenewal>, result: RenewalResult) {
        *self.attempt_cancel.lock() = None;
        {
            let mut slot = self.in_flight.lock();
            if slot.as_ref().is_some_and(|r| Arc::ptr_eq(r, renewal)) {
                *slot = None;
            }
        }
        renewal.set_result(result);
    }

    async fn renew(&self, cancel: &CancellationToken, interactive: bool) -> RenewalResult {
        let previous = self.current.read().as_ref().map(|a| a.token.clone());

        let failure = match previous {
            Some(previous) => match previous.tokens.refresh_token() {
                Some(refresh_token) => match self.refresh(&previous, refresh_token).await {
                    Ok(token) => return Ok(token),
                    Err(AuthError::Cancelled) => return Err(AuthError::Cancelled),
                    Err(err) => {
                        warn!(
                            session_id = %previous.session_id,
                            error = %err,
                            "Token refresh failed"
                        );
                        self.invalidate_session(
                            &previous.session_id,
                            InvalidationReason::RefreshFailed,
                        );
                        err
                    }
                },
                None => {
                    self.invalidate_session(&previous.session_id, InvalidationReason::Expired);
                    no_active_session()
                }
            },
            None => no_active_session(),
        };

        if !interactive {
            self.machine.reset();
            return Err(failure);
        }
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        info!("Starting a new login");
        self.handshake(cancel).await
    }

    #[instrument(skip_all, fields(session_id = %previous.session_id))]
    async fn refresh(&self, previous: &SessionToken, refresh_token: &str) -> RenewalResult {
        let credentials = self.load_credentials().await?;
        let grant = self
            .machine
            .transport()
            .refresh(&credentials, refresh_token)
            .await
            .map_err(|err| {
                AuthError::from_transport(err, |reason| AuthError::SessionRejected { reason })
            })?;

        let tokens = TokenPair::renewed(grant, &previous.tokens, self.clock().now());
        self.record_refresh_state(&previous.session_id, &tokens).await;

        let token = SessionToken::new(previous.session_id, tokens);
        let replaced = {
            let mut current = self.current.write();
            match current.as_mut() {
                Some(active) if active.token.session_id == previous.session_id => {
                    active.session.expires_at = Some(token.tokens.expires_at());
                    active.token = token.clone();
                    true
                }
                _ => false,
            }
        };
        if !replaced {
            // Logged out while refreshing: the state recorded above must not outlive the session.
            debug!("Session ended during refresh, dropping the refreshed token");
            if let Err(e) = self.machine.transport().revoke(token.access_token()).await {
                warn!(error = %e, "Failed to revoke refreshed token");
            }
            if let Err(e) = self.credentials.clear(&self.user_id).await {
                warn!(error = %e, "Failed to clear refresh state");
            }
            return Err(AuthError::Cancelled);
        }

        info!(expires_at = %token.tokens.expires_at(), "Token refreshed");
        let _ = self.events.send(SessionEvent::Renewed {
            session_id: token.session_id,
            expires_at: token.tokens.expires_at(),
        });
        Ok(token)
    }

    async fn handshake(&self, cancel: &CancellationToken) -> RenewalResult {
        *self.current.write() = None;

        let credentials = match self.load_credentials().await {
            Ok(credentials) => credentials,
            Err(err) => {
                self.machine.publish_failure(&err);
                return Err(err);
            }
        };

        let EstablishedSession { session, tokens } = self.machine.run(&credentials, cancel).await?;
        let token = SessionToken::new(session.id(), tokens);
        if cancel.is_cancelled() {
            return Err(self.discard_session(&token).await);
        }
        self.record_refresh_state(&token.session_id, &token.tokens).await;

        // `cancel` and `logout` fire the token before reading `current`, so
        // checking it under the write lock leaves no window for a late install.
        let installed = {
            let mut current = self.current.write();
            if cancel.is_cancelled() {
                false
            } else {
                *current = Some(ActiveSession {
                    session,
                    token: token.clone(),
                });
                true
            }
        };
        if !installed {
            return Err(self.discard_session(&token).await);
        }

        info!(session_id = %token.session_id, "Session established");
        let _ = self.events.send(SessionEvent::Established {
            session_id: token.session_id,
            expires_at: token.tokens.expires_at(),
        });
        Ok(token)
    }

    /// Throw away a session whose attempt was cancelled after the bank granted it.
    async fn discard_session(&self, token: &SessionToken) -> AuthError {
        info!(session_id = %token.session_id, "Login cancelled, discarding the granted session");
        if let Err(e) = self.machine.transport().revoke(token.access_token()).await {
            warn!(error = %e, "Failed to revoke token of a cancelled login");
        }
        if let Err(e) = self.credentials.clear(&self.user_id).await {
            warn!(error = %e, "Failed to clear refresh state");
        }
        for observer in self.observers.read().iter() {
            observer.on_session_invalidated(&token.session_id, InvalidationReason::Cancelled);
        }
        let err = AuthError::Cancelled;
        self.machine.publish_failure(&err);
        err
    }

    async fn load_credentials(&self) -> Result<Credentials, AuthError> {
        self.credentials
            .load(&self.user_id)
            .await
            .map_err(|err| match err {
                CredentialError::NotFound(_) | CredentialError::Invalid(_) => {
                    AuthError::InvalidCredentials {
                        reason: err.to_string(),
                    }
                }
                other => AuthError::CredentialStore(other.to_string()),
            })
    }

    /// Persist refresh material; failures are logged and otherwise ignored.
    async fn record_refresh_state(&self, session_id: &SessionId, tokens: &TokenPair) {
        let Some(refresh_token) = tokens.refresh_token() else {
            return;
        };
        let state = RefreshState {
            session_id: session_id.to_string(),
            refresh_token: refresh_token.to_string(),
            access_expires_at: tokens.expires_at(),
            updated_at: self.clock().now(),
        };
        if let Err(e) = self.credentials.persist(&self.user_id, &state).await {
            warn!(error = %e, "Failed to persist refresh state (non-fatal)");
        }
    }

    /// Drop `session_id` if it is the active session and tell every observer.
    ///
    /// Observers run before this returns, so no cache entry of the session
    /// survives the call. Returns whether the active session was dropped.
    pub fn invalidate_session(&self, session_id: &SessionId, reason: InvalidationReason) -> bool {
        let removed = {
            let mut current = self.current.write();
            match current.as_ref() {
                Some(active) if active.token.session_id == *session_id => current.take(),
                _ => None,
            }
        };

        for observer in self.observers.read().iter() {
            observer.on_session_invalidated(session_id, reason);
        }

        if removed.is_some() {
            info!(session_id = %session_id, reason = %reason, "Session invalidated");
            if !self.is_renewing() {
                self.machine.reset();
            }
            let _ = self.events.send(SessionEvent::Invalidated {
                session_id: *session_id,
                reason,
            });
        }
        removed.is_some()
    }

    /// Cancel the running login attempt, if any. Waiters get [`AuthError::Cancelled`].
    pub fn cancel(&self) -> bool {
        match self.attempt_cancel.lock().as_ref() {
            Some(token) => {
                info!("Cancelling login attempt");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// End the session: cancel any attempt, revoke and drop the token, evict its data.
    pub async fn logout(&self) {
        self.cancel();

        let active = self.current.read().as_ref().map(|a| a.token.clone());
        if let Some(token) = active {
            if let Err(e) = self.machine.transport().revoke(token.access_token()).await {
                warn!(error = %e, "Failed to revoke token");
            }
            self.invalidate_session(&token.session_id, InvalidationReason::Logout);
        }

        if let Err(e) = self.credentials.clear(&self.user_id).await {
            warn!(error = %e, "Failed to clear refresh state");
        }
        self.machine.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_flight_waiters_share_result() {
        let renewal = Arc::new(InFlightRenewal::new());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let renewal = renewal.clone();
                tokio::spawn(async move { renewal.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        renewal.set_result(Err(AuthError::ChallengeRejected));

        for waiter in waiters {
            assert!(matches!(
                waiter.await.unwrap(),
                Err(AuthError::ChallengeRejected)
            ));
        }
    }

    #[tokio::test]
    async fn test_ready_renewal_returns_immediately() {
        let renewal = InFlightRenewal::ready(Err(AuthError::Cancelled));
        assert!(matches!(renewal.wait().await, Err(AuthError::Cancelled)));
    }
}
