//! Shared fixtures: a scripted bank and a fully wired session stack.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bank_dash::Result;
use bank_dash::clock::{Clock, ManualClock};
use bank_dash::config::CacheConfig;
use bank_dash::credentials::{
    CredentialError, CredentialStore, Credentials, MemoryCredentialStore, RefreshState,
};
use bank_dash::database::models::{SyncLogDbModel, SyncStatus, history_key};
use bank_dash::database::repositories::{HistoryRepository, OrderRepository, SyncLogRepository};
use bank_dash::domain::{
    AccountBalance, AccountTransaction, Amount, LocalOrder, OrderAck, TransactionQuery,
};
use bank_dash::repository::BankRepository;
use bank_dash::session::{
    BankingTransport, CallContext, ChallengeDescriptor, ChallengeKind, ChallengeStatus,
    ChallengeTransport, HandshakeConfig, RenewalConfig, RetryPolicy, RetryingTransport,
    SessionStateMachine, TokenGrant, TokenScheduler, TransportError,
};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

pub const USER_ID: &str = "test-user";
pub const ACCOUNT_ID: &str = "ACC-1";
pub const TOKEN_LIFETIME_SECS: u64 = 600;

pub fn credentials() -> Credentials {
    Credentials {
        user_id: USER_ID.to_string(),
        username: "12345678".to_string(),
        password: "0000".to_string(),
        client_id: "User_TEST".to_string(),
        client_secret: "secret".to_string(),
    }
}

fn unavailable() -> TransportError {
    TransportError::Status {
        status: 503,
        message: "service unavailable".to_string(),
        retry_after: None,
    }
}

fn unauthorized() -> TransportError {
    TransportError::Status {
        status: 401,
        message: "invalid token".to_string(),
        retry_after: None,
    }
}

/// Bank double answering every call from counters and switches.
///
/// Access tokens are numbered per grant so a test can tell which grant a
/// data call was made with.
pub struct FakeBank {
    pub challenge_kind: Mutex<ChallengeKind>,
    /// Poll number at which the challenge resolves to `challenge_outcome`.
    pub polls_until_resolved: AtomicU32,
    pub challenge_outcome: Mutex<ChallengeStatus>,
    pub token_lifetime_secs: AtomicU64,
    /// Time a balance fetch takes.
    pub fetch_delay_ms: AtomicU64,

    pub refresh_fails: AtomicBool,
    pub fetch_fails: AtomicBool,
    pub fetch_unauthorized: AtomicBool,
    pub submit_fails: AtomicBool,
    pub submit_refused: AtomicBool,

    pub primary_grants: AtomicU32,
    pub secondary_grants: AtomicU32,
    pub polls: AtomicU32,
    pub refreshes: AtomicU32,
    pub revokes: AtomicU32,
    pub balance_fetches: AtomicU32,
    pub transaction_fetches: AtomicU32,
    pub submits: AtomicU32,
    pub accepted_orders: AtomicU32,

    challenge_polls: AtomicU32,
    grants: AtomicU32,
    tokens_seen: Mutex<Vec<String>>,
}

impl Default for FakeBank {
    fn default() -> Self {
        Self {
            challenge_kind: Mutex::new(ChallengeKind::TimedPoll),
            polls_until_resolved: AtomicU32::new(2),
            challenge_outcome: Mutex::new(ChallengeStatus::Approved),
            token_lifetime_secs: AtomicU64::new(TOKEN_LIFETIME_SECS),
            fetch_delay_ms: AtomicU64::new(0),
            refresh_fails: AtomicBool::new(false),
            fetch_fails: AtomicBool::new(false),
            fetch_unauthorized: AtomicBool::new(false),
            submit_fails: AtomicBool::new(false),
            submit_refused: AtomicBool::new(false),
            primary_grants: AtomicU32::new(0),
            secondary_grants: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            revokes: AtomicU32::new(0),
            balance_fetches: AtomicU32::new(0),
            transaction_fetches: AtomicU32::new(0),
            submits: AtomicU32::new(0),
            accepted_orders: AtomicU32::new(0),
            challenge_polls: AtomicU32::new(0),
            grants: AtomicU32::new(0),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBank {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    /// Access tokens the data calls were made with, in call order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().clone()
    }

    fn grant(&self, prefix: &str) -> TokenGrant {
        let n = self.grants.fetch_add(1, Ordering::SeqCst) + 1;
        TokenGrant {
            access_token: format!("{prefix}-{n}"),
            refresh_token: Some(format!("refresh-{n}")),
            expires_in: Duration::from_secs(self.token_lifetime_secs.load(Ordering::SeqCst)),
        }
    }

    fn data_call(&self, ctx: CallContext<'_>) -> std::result::Result<(), TransportError> {
        self.tokens_seen.lock().push(ctx.access_token.to_string());
        if self.fetch_unauthorized.load(Ordering::SeqCst) {
            return Err(unauthorized());
        }
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeTransport for FakeBank {
    async fn primary_grant(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<TokenGrant, TransportError> {
        self.primary_grants.fetch_add(1, Ordering::SeqCst);
        if credentials.password != "0000" {
            return Err(unauthorized());
        }
        Ok(self.grant("primary"))
    }

    async fn validate(
        &self,
        _ctx: CallContext<'_>,
    ) -> std::result::Result<ChallengeDescriptor, TransportError> {
        self.challenge_polls.store(0, Ordering::SeqCst);
        Ok(ChallengeDescriptor {
            remote_session_id: "remote-session".to_string(),
            challenge_id: "challenge".to_string(),
            kind: *self.challenge_kind.lock(),
            prompt: Some("Approve in the app".to_string()),
            status_link: Some("/authentications/challenge".to_string()),
        })
    }

    async fn poll_challenge(
        &self,
        _ctx: CallContext<'_>,
        _challenge: &ChallengeDescriptor,
    ) -> std::result::Result<ChallengeStatus, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let poll = self.challenge_polls.fetch_add(1, Ordering::SeqCst) + 1;
        if poll < self.polls_until_resolved.load(Ordering::SeqCst) {
            Ok(ChallengeStatus::Pending)
        } else {
            Ok(*self.challenge_outcome.lock())
        }
    }

    async fn activate_challenge(
        &self,
        _ctx: CallContext<'_>,
        _challenge: &ChallengeDescriptor,
    ) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    async fn secondary_grant(
        &self,
        _credentials: &Credentials,
        ctx: CallContext<'_>,
    ) -> std::result::Result<TokenGrant, TransportError> {
        assert!(ctx.access_token.starts_with("primary-"));
        self.secondary_grants.fetch_add(1, Ordering::SeqCst);
        Ok(self.grant("session"))
    }

    async fn refresh(
        &self,
        _credentials: &Credentials,
        _refresh_token: &str,
    ) -> std::result::Result<TokenGrant, TransportError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 400,
                message: "invalid_grant".to_string(),
                retry_after: None,
            });
        }
        Ok(self.grant("refreshed"))
    }

    async fn revoke(&self, _access_token: &str) -> std::result::Result<(), TransportError> {
        self.revokes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BankingTransport for FakeBank {
    async fn fetch_balances(
        &self,
        ctx: CallContext<'_>,
    ) -> std::result::Result<Vec<AccountBalance>, TransportError> {
        let n = self.balance_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.data_call(ctx)?;
        Ok(vec![AccountBalance {
            account_id: ACCOUNT_ID.to_string(),
            display_id: Some("1234567890".to_string()),
            account_type: Some("CA".to_string()),
            balance: Some(Amount::new(format!("{n}00.00"), "EUR")),
            available_cash: None,
        }])
    }

    async fn fetch_transactions(
        &self,
        ctx: CallContext<'_>,
        account_id: &str,
        _query: &TransactionQuery,
    ) -> std::result::Result<Vec<AccountTransaction>, TransportError> {
        let n = self.transaction_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.data_call(ctx)?;
        Ok(vec![AccountTransaction {
            reference: Some(format!("{account_id}-tx-{n}")),
            booking_status: "BOOKED".to_string(),
            booking_date: None,
            amount: Amount::new("-12.50", "EUR"),
            counterparty: Some("Bakery".to_string()),
            remittance_info: None,
            transaction_type: Some("DIRECT_DEBIT".to_string()),
        }])
    }

    async fn submit_order(
        &self,
        ctx: CallContext<'_>,
        order: &LocalOrder,
    ) -> std::result::Result<OrderAck, TransportError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().push(ctx.access_token.to_string());
        if self.submit_fails.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        if self.submit_refused.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 422,
                message: "insufficient funds".to_string(),
                retry_after: None,
            });
        }
        self.accepted_orders.fetch_add(1, Ordering::SeqCst);
        Ok(OrderAck {
            remote_order_id: Some(format!("remote-{}", order.id)),
            accepted: true,
            message: None,
        })
    }
}

/// Order repository kept in memory, newest first on listing.
#[derive(Default)]
pub struct MemoryOrderRepository {
    orders: Mutex<HashMap<String, LocalOrder>>,
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn insert(&self, order: &LocalOrder) -> Result<()> {
        self.orders.lock().insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &LocalOrder) -> Result<()> {
        let mut orders = self.orders.lock();
        match orders.get_mut(&order.id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(bank_dash::Error::not_found("order", order.id.clone())),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<LocalOrder>> {
        Ok(self.orders.lock().get(id).cloned())
    }

    async fn list(&self, account_id: Option<&str>) -> Result<Vec<LocalOrder>> {
        let mut orders: Vec<_> = self
            .orders
            .lock()
            .values()
            .filter(|o| account_id.is_none_or(|a| o.account_id == a))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[derive(Default)]
pub struct MemorySyncLogRepository {
    logs: Mutex<Vec<SyncLogDbModel>>,
}

#[async_trait]
impl SyncLogRepository for MemorySyncLogRepository {
    async fn start(&self, log: &SyncLogDbModel) -> Result<()> {
        self.logs.lock().push(log.clone());
        Ok(())
    }

    async fn finish(
        &self,
        id: &str,
        status: SyncStatus,
        detail: Option<&str>,
        finished_at: i64,
    ) -> Result<()> {
        let mut logs = self.logs.lock();
        let log = logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| bank_dash::Error::not_found("sync_log", id))?;
        log.status = status.to_string();
        log.detail = detail.map(str::to_string);
        log.finished_at = Some(finished_at);
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<SyncLogDbModel>> {
        let logs = self.logs.lock();
        Ok(logs.iter().rev().take(limit.max(0) as usize).cloned().collect())
    }

    async fn prune(&self, before: i64) -> Result<u64> {
        let mut logs = self.logs.lock();
        let len = logs.len();
        logs.retain(|l| l.started_at >= before);
        Ok((len - logs.len()) as u64)
    }
}

/// History kept in memory; transactions are listed in insertion order.
#[derive(Default)]
pub struct MemoryHistoryRepository {
    balances: Mutex<Vec<AccountBalance>>,
    transactions: Mutex<Vec<(String, String, AccountTransaction)>>,
}

#[async_trait]
impl HistoryRepository for MemoryHistoryRepository {
    async fn upsert_balances(&self, balances: &[AccountBalance], _now: DateTime<Utc>) -> Result<()> {
        let mut stored = self.balances.lock();
        for balance in balances {
            stored.retain(|b| b.account_id != balance.account_id);
            stored.push(balance.clone());
        }
        stored.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(())
    }

    async fn upsert_transactions(
        &self,
        account_id: &str,
        transactions: &[AccountTransaction],
        _now: DateTime<Utc>,
    ) -> Result<()> {
        let mut stored = self.transactions.lock();
        for tx in transactions {
            let key = history_key(account_id, tx);
            match stored.iter_mut().find(|(_, k, _)| *k == key) {
                Some(entry) => entry.2 = tx.clone(),
                None => stored.push((account_id.to_string(), key, tx.clone())),
            }
        }
        Ok(())
    }

    async fn list_balances(&self) -> Result<Vec<AccountBalance>> {
        Ok(self.balances.lock().clone())
    }

    async fn list_transactions(&self, account_id: &str) -> Result<Vec<AccountTransaction>> {
        Ok(self
            .transactions
            .lock()
            .iter()
            .filter(|(account, _, _)| account == account_id)
            .map(|(_, _, tx)| tx.clone())
            .collect())
    }
}

/// [`MemoryCredentialStore`] whose writes of refresh state can be slowed down.
#[derive(Default)]
pub struct TestCredentialStore {
    inner: MemoryCredentialStore,
    pub persist_delay_ms: AtomicU64,
}

impl TestCredentialStore {
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: MemoryCredentialStore::with_credentials(credentials),
            persist_delay_ms: AtomicU64::new(0),
        }
    }

    pub fn insert(&self, credentials: Credentials) {
        self.inner.insert(credentials);
    }
}

#[async_trait]
impl CredentialStore for TestCredentialStore {
    async fn load(&self, user_id: &str) -> std::result::Result<Credentials, CredentialError> {
        self.inner.load(user_id).await
    }

    async fn persist(
        &self,
        user_id: &str,
        state: &RefreshState,
    ) -> std::result::Result<(), CredentialError> {
        let delay = self.persist_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.persist(user_id, state).await
    }

    async fn load_refresh_state(
        &self,
        user_id: &str,
    ) -> std::result::Result<Option<RefreshState>, CredentialError> {
        self.inner.load_refresh_state(user_id).await
    }

    async fn clear(&self, user_id: &str) -> std::result::Result<(), CredentialError> {
        self.inner.clear(user_id).await
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
        use_jitter: false,
        retry_statuses: vec![500, 502, 503, 504],
    }
}

pub fn fast_handshake() -> HandshakeConfig {
    HandshakeConfig {
        poll_interval: Duration::from_millis(10),
        max_challenge_wait: Duration::from_secs(5),
    }
}

/// The session stack wired the way the binary wires it, around a [`FakeBank`].
pub struct Harness {
    pub transport: Arc<RetryingTransport<FakeBank>>,
    pub clock: Arc<ManualClock>,
    pub credentials: Arc<TestCredentialStore>,
    pub scheduler: Arc<TokenScheduler>,
    pub orders: Arc<MemoryOrderRepository>,
    pub history: Arc<MemoryHistoryRepository>,
    pub repository: Arc<BankRepository>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_bank(FakeBank::default(), fast_handshake())
    }

    pub fn with_bank(bank: FakeBank, handshake: HandshakeConfig) -> Self {
        let transport = Arc::new(RetryingTransport::new(bank, fast_retry()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let credentials = Arc::new(TestCredentialStore::with_credentials(credentials()));

        let machine = Arc::new(SessionStateMachine::new(
            transport.clone(),
            clock.clone() as Arc<dyn Clock>,
            handshake,
        ));
        let scheduler = Arc::new(TokenScheduler::new(
            USER_ID,
            machine,
            credentials.clone(),
            RenewalConfig {
                safety_margin: Duration::from_secs(60),
            },
        ));
        let orders = Arc::new(MemoryOrderRepository::default());
        let history = Arc::new(MemoryHistoryRepository::default());
        let repository = Arc::new(
            BankRepository::new(
                scheduler.clone(),
                transport.clone(),
                orders.clone(),
                CacheConfig::default(),
            )
            .with_history(history.clone()),
        );

        Self {
            transport,
            clock,
            credentials,
            scheduler,
            orders,
            history,
            repository,
        }
    }

    pub fn bank(&self) -> &FakeBank {
        self.transport.inner()
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}
