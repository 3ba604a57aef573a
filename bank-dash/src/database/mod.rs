//! SQLite persistence: pool setup, migrations, models and repositories.

pub mod models;
pub mod repositories;
pub mod time;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};

pub type DbPool = Pool<Sqlite>;

const DEFAULT_POOL_SIZE: u32 = 5;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Open a WAL-mode pool on `database_url` (e.g. `sqlite:bank-dash.db?mode=rwc`).
pub async fn init_pool_with_size(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    tracing::info!(max_connections, "Database pool initialized");
    Ok(pool)
}

pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    init_pool_with_size(database_url, DEFAULT_POOL_SIZE).await
}

pub async fn run_migrations(pool: &DbPool) -> crate::Result<()> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}
