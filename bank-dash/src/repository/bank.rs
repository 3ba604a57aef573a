//! Bank data repository.
//!
//! Reads are served from the session caches while fresh. Otherwise a token is
//! acquired from the [`TokenScheduler`], the data is fetched and the entry is
//! restamped with the fetching session. A failed fetch falls back to a stale
//! entry of the same session, if there is one.
//!
//! With a [`HistoryRepository`] attached, every successful fetch is also
//! written to the account history. The history outlives sessions and is only
//! read back through the `list_cached_*` calls.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::error::DataError;
use crate::cache::{CacheStats, Cached, KeyedLocks, SessionCache};
use crate::config::CacheConfig;
use crate::clock::Clock;
use crate::database::repositories::{HistoryRepository, OrderRepository};
use crate::domain::{
    AccountBalance, AccountTransaction, BalanceSummary, LocalOrder, OrderAck, OrderInstructions,
    OrderStatus, TransactionQuery,
};
use crate::session::{
    AuthError, BankingTransport, InvalidationReason, SessionToken, TokenScheduler, TransportError,
};

const BALANCES_KEY: &str = "all";

/// How a read that misses the cache obtains its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenPolicy {
    /// Renew or log in as needed. A login may wait for a push-TAN approval.
    Interactive,
    /// Use or refresh the current session only.
    Silent,
}

/// Cache key of a transaction list: the account and the filters it was fetched with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub account_id: String,
    pub query: TransactionQuery,
}

pub struct BankRepository {
    scheduler: Arc<TokenScheduler>,
    transport: Arc<dyn BankingTransport>,
    orders: Arc<dyn OrderRepository>,
    history: Option<Arc<dyn HistoryRepository>>,
    config: CacheConfig,
    balances: Arc<SessionCache<&'static str, Vec<AccountBalance>>>,
    transactions: Arc<SessionCache<TransactionKey, Vec<AccountTransaction>>>,
    order_locks: KeyedLocks<String>,
}

impl BankRepository {
    /// Create the repository and subscribe its caches to session invalidation.
    pub fn new(
        scheduler: Arc<TokenScheduler>,
        transport: Arc<dyn BankingTransport>,
        orders: Arc<dyn OrderRepository>,
        config: CacheConfig,
    ) -> Self {
        let balances = Arc::new(SessionCache::new("balances"));
        let transactions = Arc::new(SessionCache::new("transactions"));
        scheduler.register_observer(balances.clone());
        scheduler.register_observer(transactions.clone());

        Self {
            scheduler,
            transport,
            orders,
            history: None,
            config,
            balances,
            transactions,
            order_locks: KeyedLocks::new(),
        }
    }

    /// Record every successful fetch in `history`.
    pub fn with_history(mut self, history: Arc<dyn HistoryRepository>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn scheduler(&self) -> &Arc<TokenScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn balance_cache_stats(&self) -> CacheStats {
        self.balances.stats()
    }

    pub fn transaction_cache_stats(&self) -> CacheStats {
        self.transactions.stats()
    }

    async fn read_through<K, V, F, Fut>(
        &self,
        cache: &SessionCache<K, V>,
        key: K,
        max_staleness: Duration,
        policy: TokenPolicy,
        fetch: F,
    ) -> Result<Cached<V>, DataError>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync,
        V: Send + Sync,
        F: FnOnce(SessionToken) -> Fut,
        Fut: Future<Output = Result<V, TransportError>>,
    {
        let clock = self.scheduler.clock();
        let fresh = |key: &K| {
            self.scheduler
                .current_session_id()
                .and_then(|session| cache.get_fresh(key, session, max_staleness, clock.now()))
        };

        if let Some(hit) = fresh(&key) {
            debug!(cache = cache.name(), key = ?key, "Cache hit");
            return Ok(hit);
        }

        let _guard = cache.lock_key(&key).await;
        // Filled by another caller while we waited for the lock.
        if let Some(hit) = fresh(&key) {
            return Ok(hit);
        }

        let token = match policy {
            TokenPolicy::Interactive => self.scheduler.acquire_token().await,
            TokenPolicy::Silent => self.scheduler.acquire_token_silently().await,
        }
        .map_err(|err| DataError::unavailable(cache.name(), err))?;
        let session_id = token.session_id;

        match fetch(token).await {
            Ok(value) => {
                debug!(cache = cache.name(), key = ?key, session_id = %session_id, "Fetched fresh data");
                Ok(cache.insert(key, value, session_id, clock.now()))
            }
            Err(err) if err.is_unauthorized() => {
                warn!(cache = cache.name(), session_id = %session_id, "Bank refused the session token");
                self.scheduler
                    .invalidate_session(&session_id, InvalidationReason::Rejected);
                Err(DataError::unavailable(
                    cache.name(),
                    AuthError::SessionRejected {
                        reason: err.to_string(),
                    },
                ))
            }
            Err(err) => match cache.get_usable(&key, session_id, max_staleness, clock.now()) {
                Some(stale) => {
                    warn!(
                        cache = cache.name(),
                        key = ?key,
                        error = %err,
                        fetched_at = %stale.fetched_at,
                        "Fetch failed, serving stale data"
                    );
                    Ok(stale)
                }
                None => Err(DataError::unavailable(cache.name(), err)),
            },
        }
    }

    /// Balances of all accounts, at most `max_staleness` old unless the bank is unreachable.
    #[instrument(skip(self))]
    pub async fn get_balances(
        &self,
        max_staleness: Duration,
    ) -> Result<Cached<Vec<AccountBalance>>, DataError> {
        self.read_balances(max_staleness, TokenPolicy::Interactive)
            .await
    }

    async fn read_balances(
        &self,
        max_staleness: Duration,
        policy: TokenPolicy,
    ) -> Result<Cached<Vec<AccountBalance>>, DataError> {
        let transport = Arc::clone(&self.transport);
        let history = self.history.clone();
        let clock = Arc::clone(self.scheduler.clock());
        self.read_through(
            &self.balances,
            BALANCES_KEY,
            max_staleness,
            policy,
            move |token| async move {
                let balances = transport.fetch_balances(token.context()).await?;
                if let Some(history) = history
                    && let Err(e) = history.upsert_balances(&balances, clock.now()).await
                {
                    warn!(error = %e, "Failed to record balance history");
                }
                Ok(balances)
            },
        )
        .await
    }

    pub async fn balances(&self) -> Result<Cached<Vec<AccountBalance>>, DataError> {
        self.get_balances(self.config.balances_max_staleness).await
    }

    /// Bypass the cache and fetch balances now.
    pub async fn refresh_balances(&self) -> Result<Cached<Vec<AccountBalance>>, DataError> {
        self.invalidate_balances();
        self.balances().await
    }

    /// Like [`BankRepository::refresh_balances`], but never starts a login.
    ///
    /// Without a usable session this fails with [`DataError::Unavailable`].
    pub async fn refresh_balances_silently(
        &self,
    ) -> Result<Cached<Vec<AccountBalance>>, DataError> {
        self.invalidate_balances();
        self.read_balances(self.config.balances_max_staleness, TokenPolicy::Silent)
            .await
    }

    /// Balances stored by earlier fetches, from any session. Empty without a history.
    pub async fn list_cached_balances(&self) -> Result<Vec<AccountBalance>, DataError> {
        match &self.history {
            Some(history) => Ok(history.list_balances().await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn balance_summary(&self) -> Result<Vec<BalanceSummary>, DataError> {
        let balances = self.balances().await?;
        Ok(balances.iter().filter_map(AccountBalance::summary).collect())
    }

    pub fn invalidate_balances(&self) -> bool {
        self.balances.invalidate(&BALANCES_KEY)
    }

    #[instrument(skip(self, query))]
    pub async fn get_transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
        max_staleness: Duration,
    ) -> Result<Cached<Vec<AccountTransaction>>, DataError> {
        self.read_transactions(account_id, query, max_staleness, TokenPolicy::Interactive)
            .await
    }

    async fn read_transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
        max_staleness: Duration,
        policy: TokenPolicy,
    ) -> Result<Cached<Vec<AccountTransaction>>, DataError> {
        let key = TransactionKey {
            account_id: account_id.to_string(),
            query: query.clone(),
        };
        let transport = Arc::clone(&self.transport);
        let history = self.history.clone();
        let clock = Arc::clone(self.scheduler.clock());
        let fetch_key = key.clone();
        self.read_through(
            &self.transactions,
            key,
            max_staleness,
            policy,
            move |token| async move {
                let transactions = transport
                    .fetch_transactions(token.context(), &fetch_key.account_id, &fetch_key.query)
                    .await?;
                if let Some(history) = history
                    && let Err(e) = history
                        .upsert_transactions(&fetch_key.account_id, &transactions, clock.now())
                        .await
                {
                    warn!(
                        account_id = %fetch_key.account_id,
                        error = %e,
                        "Failed to record transaction history"
                    );
                }
                Ok(transactions)
            },
        )
        .await
    }

    pub async fn transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Cached<Vec<AccountTransaction>>, DataError> {
        self.get_transactions(account_id, query, self.config.transactions_max_staleness)
            .await
    }

    pub async fn refresh_transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Cached<Vec<AccountTransaction>>, DataError> {
        self.invalidate_transactions(account_id, query);
        self.transactions(account_id, query).await
    }

    /// Like [`BankRepository::refresh_transactions`], but never starts a login.
    pub async fn refresh_transactions_silently(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Cached<Vec<AccountTransaction>>, DataError> {
        self.invalidate_transactions(account_id, query);
        self.read_transactions(
            account_id,
            query,
            self.config.transactions_max_staleness,
            TokenPolicy::Silent,
        )
        .await
    }

    /// Transactions of `account_id` stored by earlier fetches of any query and session.
    pub async fn list_cached_transactions(
        &self,
        account_id: &str,
    ) -> Result<Vec<AccountTransaction>, DataError> {
        match &self.history {
            Some(history) => Ok(history.list_transactions(account_id).await?),
            None => Ok(Vec::new()),
        }
    }

    pub fn invalidate_transactions(&self, account_id: &str, query: &TransactionQuery) -> bool {
        self.transactions.invalidate(&TransactionKey {
            account_id: account_id.to_string(),
            query: query.clone(),
        })
    }

    /// Record a draft order. Nothing is sent to the bank.
    #[instrument(skip(self, instructions), fields(instrument = %instructions.instrument))]
    pub async fn create_local_order(
        &self,
        account_id: &str,
        instructions: OrderInstructions,
    ) -> Result<LocalOrder, DataError> {
        instructions.validate()?;
        if account_id.trim().is_empty() {
            return Err(crate::Error::validation("account_id is required").into());
        }

        let order = LocalOrder::new(account_id, instructions, self.scheduler.clock().now());
        self.orders.insert(&order).await?;
        info!(order_id = %order.id, "Draft order created");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<LocalOrder, DataError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| DataError::OrderNotFound(order_id.to_string()))
    }

    pub async fn list_orders(&self, account_id: Option<&str>) -> Result<Vec<LocalOrder>, DataError> {
        Ok(self.orders.list(account_id).await?)
    }

    /// Orders with a sync or reopen running or waiting.
    pub fn locked_orders(&self) -> usize {
        self.order_locks.len()
    }

    /// Submit a draft order to the bank.
    ///
    /// The order is stored as `Submitted` before the request goes out. A
    /// transport failure puts it back to `Draft` with the error recorded; a
    /// refusal by the bank makes it `Rejected`. An order still `Submitted`
    /// (outcome unknown) is never resent; see [`BankRepository::reopen_order`].
    /// Final orders are returned unchanged.
    #[instrument(skip(self))]
    pub async fn sync_order(&self, order_id: &str) -> Result<LocalOrder, DataError> {
        let _guard = self.order_locks.lock(order_id.to_string()).await;
        let now = || self.scheduler.clock().now();

        let mut order = self.get_order(order_id).await?;
        match order.status {
            OrderStatus::Draft => {}
            OrderStatus::Submitted => {
                return Err(DataError::SyncConflict {
                    order_id: order.id,
                    status: order.status,
                });
            }
            OrderStatus::Confirmed | OrderStatus::Rejected => {
                debug!(status = %order.status, "Order already final");
                return Ok(order);
            }
        }

        let token = match self.scheduler.acquire_token().await {
            Ok(token) => token,
            Err(err) => {
                order.last_sync_error = Some(err.to_string());
                order.updated_at = now();
                self.orders.update(&order).await?;
                return Err(DataError::unavailable("order sync", err));
            }
        };

        order.mark_submitted(now())?;
        self.orders.update(&order).await?;

        match self.transport.submit_order(token.context(), &order).await {
            Ok(ack) => {
                info!(accepted = ack.accepted, remote_order_id = ?ack.remote_order_id, "Order answered");
                order.apply_ack(ack, now())?;
                self.orders.update(&order).await?;
                Ok(order)
            }
            Err(err) if err.is_unauthorized() => {
                self.scheduler
                    .invalidate_session(&token.session_id, InvalidationReason::Rejected);
                order.revert_to_draft(err.to_string(), now())?;
                self.orders.update(&order).await?;
                Err(DataError::unavailable(
                    "order sync",
                    AuthError::SessionRejected {
                        reason: err.to_string(),
                    },
                ))
            }
            Err(err) if err.is_rejection() => {
                warn!(error = %err, "Order refused by the bank");
                order.apply_ack(
                    OrderAck {
                        remote_order_id: None,
                        accepted: false,
                        message: Some(err.to_string()),
                    },
                    now(),
                )?;
                self.orders.update(&order).await?;
                Ok(order)
            }
            Err(err) => {
                warn!(error = %err, "Order submission failed, back to draft");
                order.revert_to_draft(err.to_string(), now())?;
                self.orders.update(&order).await?;
                Err(DataError::unavailable("order sync", err))
            }
        }
    }

    /// Move an order whose submission outcome is unknown back to draft.
    ///
    /// Only for the user to call after checking the bank's order book.
    #[instrument(skip(self))]
    pub async fn reopen_order(&self, order_id: &str) -> Result<LocalOrder, DataError> {
        let _guard = self.order_locks.lock(order_id.to_string()).await;

        let mut order = self.get_order(order_id).await?;
        match order.status {
            OrderStatus::Draft => Ok(order),
            OrderStatus::Submitted => {
                order.revert_to_draft("reopened by user", self.scheduler.clock().now())?;
                self.orders.update(&order).await?;
                Ok(order)
            }
            status => Err(DataError::SyncConflict {
                order_id: order.id,
                status,
            }),
        }
    }
}
