use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bank_dash::clock::{Clock, SystemClock};
use bank_dash::config::AppConfig;
use bank_dash::database::{self, repositories};
use bank_dash::jobs::DataRefreshJob;
use bank_dash::logging;
use bank_dash::repository::BankRepository;
use bank_dash::session::platforms::ComdirectTransport;
use bank_dash::session::{
    BankingTransport, ChallengeTransport, RetryingTransport, SessionStateMachine, TokenScheduler,
};
use comdirect_api::ComdirectClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = logging::init(&config.logging)?;
    if let Some(dir) = &config.logging.dir
        && let Err(e) = logging::prune_old_logs(Path::new(dir), logging::LOG_RETENTION_DAYS).await
    {
        warn!(error = %e, "Failed to prune old log files");
    }

    comdirect_api::install_rustls_provider();

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let credential_store = Arc::new(repositories::SqlxCredentialStore::new(pool.clone()));
    if let Some(credentials) = &config.credentials {
        credential_store
            .upsert_credentials(credentials, clock.now())
            .await
            .context("Failed to store credentials")?;
    }

    let client = ComdirectClient::new(
        &config.comdirect.api_base_url,
        &config.comdirect.oauth_url,
        Some(config.comdirect.request_timeout),
    )?;
    let transport = Arc::new(RetryingTransport::new(
        ComdirectTransport::new(client),
        config.retry.clone(),
    ));
    let challenge_transport: Arc<dyn ChallengeTransport> = transport.clone();
    let banking_transport: Arc<dyn BankingTransport> = transport;

    let machine = Arc::new(SessionStateMachine::new(
        challenge_transport,
        clock,
        config.session.handshake.clone(),
    ));
    let scheduler = Arc::new(TokenScheduler::new(
        config.user_id.clone(),
        machine,
        credential_store,
        config.session.renewal.clone(),
    ));
    let repository = Arc::new(
        BankRepository::new(
            scheduler.clone(),
            banking_transport,
            Arc::new(repositories::SqlxOrderRepository::new(pool.clone())),
            config.cache.clone(),
        )
        .with_history(Arc::new(repositories::SqlxHistoryRepository::new(pool.clone()))),
    );

    let mut phases = scheduler.watch_phase();
    tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = phases.borrow_and_update().clone();
            if phase.is_awaiting_approval() {
                info!("Approve the push-TAN in the banking app to continue");
            } else {
                info!(phase = %phase, "Session phase changed");
            }
        }
    });

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                scheduler.cancel();
                shutdown.cancel();
            }
        });
    }

    let token = scheduler.acquire_token().await?;
    info!(session_id = %token.session_id, "Logged in");

    match repository.balance_summary().await {
        Ok(summaries) => {
            for summary in summaries {
                info!(
                    account_id = %summary.account_id,
                    amount = %summary.amount,
                    currency = %summary.currency,
                    "Balance"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to load balances");
            if let Ok(known) = repository.list_cached_balances().await {
                for summary in known.iter().filter_map(|b| b.summary()) {
                    info!(
                        account_id = %summary.account_id,
                        amount = %summary.amount,
                        currency = %summary.currency,
                        "Last known balance"
                    );
                }
            }
        }
    }

    if let Some(interval) = config.refresh_job.interval {
        let job = Arc::new(DataRefreshJob::new(
            repository.clone(),
            Arc::new(repositories::SqlxSyncLogRepository::new(pool.clone())),
            &config.refresh_job,
        ));
        let handle = job.start(interval, shutdown.clone());
        shutdown.cancelled().await;
        if let Err(e) = handle.await {
            warn!(error = %e, "Data refresh job ended abnormally");
        }
    }

    scheduler.logout().await;
    pool.close().await;
    info!("bank-dash stopped");
    Ok(())
}
