//! Periodic refresh of balances and transactions.
//!
//! Each run is recorded in `sync_logs`. A run never starts a login: without
//! an active session it is recorded as skipped, and reads that lose the
//! session midway fail instead of prompting for a push-TAN.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RefreshJobConfig;
use crate::database::models::{SyncLogDbModel, SyncStatus};
use crate::database::repositories::SyncLogRepository;
use crate::database::time::datetime_to_ms;
use crate::domain::TransactionQuery;
use crate::repository::BankRepository;

const JOB_NAME: &str = "data_refresh";

/// Accounts whose transactions are fetched at the same time.
const ACCOUNT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub status: SyncStatus,
    pub detail: Option<String>,
}

pub struct DataRefreshJob {
    repository: Arc<BankRepository>,
    logs: Arc<dyn SyncLogRepository>,
    accounts: Vec<String>,
}

impl DataRefreshJob {
    pub fn new(
        repository: Arc<BankRepository>,
        logs: Arc<dyn SyncLogRepository>,
        config: &RefreshJobConfig,
    ) -> Self {
        Self {
            repository,
            logs,
            accounts: config.accounts.clone(),
        }
    }

    /// Run every `interval` until `cancel` fires. The first run starts after one interval.
    pub fn start(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Data refresh job started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Data refresh job shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome = self.run_once().await;
                        debug!(status = %outcome.status, "Data refresh run finished");
                    }
                }
            }
        })
    }

    /// One refresh run, recorded in the sync log.
    pub async fn run_once(&self) -> RefreshOutcome {
        let clock = self.repository.scheduler().clock().clone();
        let log = SyncLogDbModel::started(JOB_NAME, clock.now());
        if let Err(e) = self.logs.start(&log).await {
            warn!(error = %e, "Failed to record sync start");
        }

        let outcome = self.refresh().await;
        match outcome.status {
            SyncStatus::Failed => {
                error!(detail = ?outcome.detail, "Data refresh failed");
            }
            SyncStatus::Skipped => info!(detail = ?outcome.detail, "Data refresh skipped"),
            _ => info!("Data refresh succeeded"),
        }

        if let Err(e) = self
            .logs
            .finish(
                &log.id,
                outcome.status,
                outcome.detail.as_deref(),
                datetime_to_ms(clock.now()),
            )
            .await
        {
            warn!(error = %e, "Failed to record sync result");
        }
        outcome
    }

    async fn refresh(&self) -> RefreshOutcome {
        let scheduler = self.repository.scheduler();
        if !scheduler.has_active_session() {
            return RefreshOutcome {
                status: SyncStatus::Skipped,
                detail: Some("no active session".to_string()),
            };
        }
        if let Err(e) = scheduler.acquire_token_silently().await {
            return RefreshOutcome {
                status: SyncStatus::Skipped,
                detail: Some(format!("session not renewable: {e}")),
            };
        }

        let mut failures = Vec::new();
        let mut refreshed = 0usize;

        match self.repository.refresh_balances_silently().await {
            Ok(balances) => refreshed += balances.len(),
            Err(e) => failures.push(format!("balances: {e}")),
        }

        let results: Vec<_> = stream::iter(self.accounts.clone())
            .map(|account_id| {
                let repository = Arc::clone(&self.repository);
                async move {
                    let result = repository
                        .refresh_transactions_silently(&account_id, &TransactionQuery::default())
                        .await;
                    (account_id, result)
                }
            })
            .buffer_unordered(ACCOUNT_CONCURRENCY)
            .collect()
            .await;

        for (account_id, result) in results {
            match result {
                Ok(transactions) => refreshed += transactions.len(),
                Err(e) => failures.push(format!("transactions {account_id}: {e}")),
            }
        }

        if failures.is_empty() {
            RefreshOutcome {
                status: SyncStatus::Succeeded,
                detail: Some(format!("{refreshed} records refreshed")),
            }
        } else {
            RefreshOutcome {
                status: SyncStatus::Failed,
                detail: Some(failures.join("; ")),
            }
        }
    }
}
