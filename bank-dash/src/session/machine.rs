//! Login handshake state machine.
//!
//! ```text
//! Unauthenticated -login-> PrimaryGranted -validate-> ChallengeIssued
//!   -await-> ChallengePending -activate-> Activated -secondary-> Active
//! ```
//!
//! Any step may end in `Failed`. Each step is a separate method so a caller
//! can drive it one transition at a time; [`SessionStateMachine::run`] drives
//! the whole sequence. The current phase is published on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::AuthError;
use super::transport::{CallContext, ChallengeTransport};
use super::types::{ChallengeKind, ChallengeStatus, Session, SessionPhase, TokenPair, TokenScope};
use crate::clock::Clock;
use crate::credentials::Credentials;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Pause between two challenge status polls.
    pub poll_interval: Duration,
    /// How long the user has to approve a challenge.
    pub max_challenge_wait: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_challenge_wait: Duration::from_secs(300),
        }
    }
}

/// Outcome of a completed handshake.
#[derive(Debug)]
pub struct EstablishedSession {
    pub session: Session,
    pub tokens: TokenPair,
}

pub struct SessionStateMachine {
    transport: Arc<dyn ChallengeTransport>,
    clock: Arc<dyn Clock>,
    config: HandshakeConfig,
    phase_tx: watch::Sender<SessionPhase>,
    /// Serializes [`SessionStateMachine::run`].
    attempt_lock: Mutex<()>,
}

impl SessionStateMachine {
    pub fn new(
        transport: Arc<dyn ChallengeTransport>,
        clock: Arc<dyn Clock>,
        config: HandshakeConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Unauthenticated);
        Self {
            transport,
            clock,
            config,
            phase_tx,
            attempt_lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn ChallengeTransport> {
        &self.transport
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Phase of the most recent attempt.
    pub fn phase(&self) -> SessionPhase {
        self.phase_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// Publish `Unauthenticated` after the session was destroyed.
    pub(crate) fn reset(&self) {
        self.phase_tx.send_replace(SessionPhase::Unauthenticated);
    }

    /// Publish a failure that happened before an attempt could start.
    pub(crate) fn publish_failure(&self, err: &AuthError) {
        self.phase_tx.send_replace(SessionPhase::Failed(err.clone()));
    }

    fn transition(&self, session: &mut Session, next: SessionPhase) {
        debug!(
            session_id = %session.id(),
            from = %session.phase,
            to = %next,
            "Session phase change"
        );
        session.phase = next.clone();
        self.phase_tx.send_replace(next);
    }

    fn fail(&self, session: &mut Session, err: &AuthError) {
        if !session.phase.is_failed() {
            warn!(session_id = %session.id(), phase = %session.phase, error = %err, "Login attempt failed");
            self.transition(session, SessionPhase::Failed(err.clone()));
        }
    }

    fn require(
        &self,
        session: &mut Session,
        expected: SessionPhase,
        step: &str,
    ) -> Result<(), AuthError> {
        if session.phase.same_phase(&expected) {
            return Ok(());
        }
        let err = AuthError::Protocol(format!(
            "{step} requires phase {expected}, session is {}",
            session.phase
        ));
        self.fail(session, &err);
        Err(err)
    }

    fn primary_access_token(session: &Session) -> Result<String, AuthError> {
        session
            .primary
            .as_ref()
            .map(|t| t.access_token().to_string())
            .ok_or_else(|| AuthError::Protocol("session has no primary token".to_string()))
    }

    /// `Unauthenticated -> PrimaryGranted`: start a new session with a primary grant.
    #[instrument(skip_all, fields(user_id = %credentials.user_id))]
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let mut session = Session::new(self.clock.now());
        self.phase_tx.send_replace(SessionPhase::Unauthenticated);

        match self.transport.primary_grant(credentials).await {
            Ok(grant) => {
                session.primary = Some(TokenPair::from_grant(
                    grant,
                    TokenScope::Primary,
                    self.clock.now(),
                ));
                self.transition(&mut session, SessionPhase::PrimaryGranted);
                Ok(session)
            }
            Err(err) => {
                let err = AuthError::from_transport(err, |reason| AuthError::InvalidCredentials {
                    reason,
                });
                self.fail(&mut session, &err);
                Err(err)
            }
        }
    }

    /// `PrimaryGranted -> ChallengeIssued`.
    #[instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn validate_session(&self, session: &mut Session) -> Result<(), AuthError> {
        self.require(session, SessionPhase::PrimaryGranted, "validate_session")?;
        let access_token = Self::primary_access_token(session)?;
        let ctx = CallContext::new(session.id(), &access_token);

        match self.transport.validate(ctx).await {
            Ok(challenge) => {
                info!(
                    challenge_id = %challenge.challenge_id,
                    kind = %challenge.kind,
                    "Challenge issued"
                );
                session.challenge = Some(challenge);
                self.transition(session, SessionPhase::ChallengeIssued);
                Ok(())
            }
            Err(err) => {
                let err =
                    AuthError::from_transport(err, |reason| AuthError::SessionRejected { reason });
                self.fail(session, &err);
                Err(err)
            }
        }
    }

    /// `ChallengeIssued -> ChallengePending`: wait until the user approved the challenge.
    ///
    /// Timed-poll challenges are polled every `poll_interval` until approved,
    /// rejected, expired or `max_challenge_wait` has passed. Cancelling `cancel`
    /// ends the wait with [`AuthError::Cancelled`].
    #[instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn await_challenge(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        self.require(session, SessionPhase::ChallengeIssued, "await_challenge")?;
        let challenge = match session.challenge.clone() {
            Some(challenge) => challenge,
            None => {
                let err = AuthError::Protocol("no challenge issued".to_string());
                self.fail(session, &err);
                return Err(err);
            }
        };

        if challenge.kind == ChallengeKind::ImmediateApproval {
            self.transition(session, SessionPhase::ChallengePending);
            return Ok(());
        }

        let access_token = Self::primary_access_token(session)?;
        let ctx = CallContext::new(session.id(), &access_token);
        let deadline = Instant::now() + self.config.max_challenge_wait;
        let mut polls = 0u32;

        let outcome = loop {
            let now = Instant::now();
            if now >= deadline {
                break Err(AuthError::ChallengeExpired);
            }
            let wait = self.config.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(AuthError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }

            polls += 1;
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(AuthError::Cancelled),
                status = self.transport.poll_challenge(ctx, &challenge) => status,
            };

            match status {
                Ok(ChallengeStatus::Pending) => {
                    debug!(polls, "Challenge still pending");
                }
                Ok(ChallengeStatus::Approved) => break Ok(()),
                Ok(ChallengeStatus::Rejected) => break Err(AuthError::ChallengeRejected),
                Ok(ChallengeStatus::Expired) => break Err(AuthError::ChallengeExpired),
                Err(err) => {
                    break Err(AuthError::from_transport(err, |reason| {
                        AuthError::SessionRejected { reason }
                    }));
                }
            }
        };

        match outcome {
            Ok(()) => {
                info!(polls, "Challenge approved");
                self.transition(session, SessionPhase::ChallengePending);
                Ok(())
            }
            Err(err) => {
                self.fail(session, &err);
                Err(err)
            }
        }
    }

    /// `ChallengePending -> Activated`.
    #[instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn activate(&self, session: &mut Session) -> Result<(), AuthError> {
        self.require(session, SessionPhase::ChallengePending, "activate")?;
        let Some(challenge) = session.challenge.clone() else {
            let err = AuthError::Protocol("no challenge issued".to_string());
            self.fail(session, &err);
            return Err(err);
        };
        let access_token = Self::primary_access_token(session)?;
        let ctx = CallContext::new(session.id(), &access_token);

        match self.transport.activate_challenge(ctx, &challenge).await {
            Ok(()) => {
                self.transition(session, SessionPhase::Activated);
                Ok(())
            }
            Err(err) => {
                let err = AuthError::from_transport(err, |_| AuthError::ChallengeRejected);
                self.fail(session, &err);
                Err(err)
            }
        }
    }

    /// `Activated -> Active`: obtain the session-bound token pair.
    #[instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn grant_secondary(
        &self,
        session: &mut Session,
        credentials: &Credentials,
    ) -> Result<TokenPair, AuthError> {
        self.require(session, SessionPhase::Activated, "grant_secondary")?;
        let access_token = Self::primary_access_token(session)?;
        let ctx = CallContext::new(session.id(), &access_token);

        match self.transport.secondary_grant(credentials, ctx).await {
            Ok(grant) => {
                let tokens = TokenPair::from_grant(grant, TokenScope::SessionBound, self.clock.now());
                session.session_bound = true;
                session.expires_at = Some(tokens.expires_at());
                self.transition(session, SessionPhase::Active);
                info!(expires_at = %tokens.expires_at(), "Session active");
                Ok(tokens)
            }
            Err(err) => {
                let err = AuthError::from_transport(err, |reason| {
                    AuthError::SecondaryGrantDenied { reason }
                });
                self.fail(session, &err);
                Err(err)
            }
        }
    }

    /// Run the full handshake.
    ///
    /// Concurrent calls are serialized. On error the session is dropped and
    /// the published phase is `Failed`.
    pub async fn run(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<EstablishedSession, AuthError> {
        let _attempt = self.attempt_lock.lock().await;

        let mut session = match cancellable(cancel, self.login(credentials)).await {
            Ok(session) => session,
            Err(err) => {
                if !self.phase().is_failed() {
                    self.phase_tx.send_replace(SessionPhase::Failed(err.clone()));
                }
                return Err(err);
            }
        };

        if let Err(err) = cancellable(cancel, self.validate_session(&mut session)).await {
            self.fail(&mut session, &err);
            return Err(err);
        }
        self.await_challenge(&mut session, cancel).await?;
        if let Err(err) = cancellable(cancel, self.activate(&mut session)).await {
            self.fail(&mut session, &err);
            return Err(err);
        }
        match cancellable(cancel, self.grant_secondary(&mut session, credentials)).await {
            Ok(tokens) => Ok(EstablishedSession { session, tokens }),
            Err(err) => {
                self.fail(&mut session, &err);
                Err(err)
            }
        }
    }
}

/// Await `step` unless `cancel` fires first.
async fn cancellable<T, F>(cancel: &CancellationToken, step: F) -> Result<T, AuthError>
where
    F: std::future::Future<Output = Result<T, AuthError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        result = step => result,
    }
}
