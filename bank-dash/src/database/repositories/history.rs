//! Account history: balances and transactions as last fetched from the bank.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::Result;
use crate::database::models::{PositionDbModel, TransactionDbModel};
use crate::domain::{AccountBalance, AccountTransaction};

/// Persistent record of fetched data.
///
/// This is history, not a cache: rows survive sessions and restarts and are
/// only read through the `list_*` calls, never to answer a cached read.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Replace the stored balance of every account in `balances`.
    async fn upsert_balances(&self, balances: &[AccountBalance], now: DateTime<Utc>) -> Result<()>;

    /// Insert new transactions of `account_id` and update the known ones.
    async fn upsert_transactions(
        &self,
        account_id: &str,
        transactions: &[AccountTransaction],
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Stored balances ordered by account id.
    async fn list_balances(&self) -> Result<Vec<AccountBalance>>;

    /// Stored transactions of `account_id`: undated first, then newest booking date first.
    async fn list_transactions(&self, account_id: &str) -> Result<Vec<AccountTransaction>>;
}

pub struct SqlxHistoryRepository {
    pool: SqlitePool,
}

impl SqlxHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqlxHistoryRepository {
    async fn upsert_balances(&self, balances: &[AccountBalance], now: DateTime<Utc>) -> Result<()> {
        if balances.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for balance in balances {
            let row = PositionDbModel::from_balance(balance, now)?;
            sqlx::query(
                r#"
                INSERT INTO positions (account_id, amount, currency, raw, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(account_id) DO UPDATE SET
                    amount = excluded.amount,
                    currency = excluded.currency,
                    raw = excluded.raw,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&row.account_id)
            .bind(&row.amount)
            .bind(&row.currency)
            .bind(&row.raw)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = balances.len(), "Balance history updated");
        Ok(())
    }

    async fn upsert_transactions(
        &self,
        account_id: &str,
        transactions: &[AccountTransaction],
        now: DateTime<Utc>,
    ) -> Result<()> {
        if transactions.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for transaction in transactions {
            let row = TransactionDbModel::from_transaction(account_id, transaction, now)?;
            // created_at keeps the time the transaction was first seen.
            sqlx::query(
                r#"
                INSERT INTO transactions (
                    history_key, external_id, account_id, booking_status, booking_date,
                    amount, currency, raw, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(history_key) DO UPDATE SET
                    booking_status = excluded.booking_status,
                    booking_date = excluded.booking_date,
                    amount = excluded.amount,
                    currency = excluded.currency,
                    raw = excluded.raw,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&row.history_key)
            .bind(&row.external_id)
            .bind(&row.account_id)
            .bind(&row.booking_status)
            .bind(&row.booking_date)
            .bind(&row.amount)
            .bind(&row.currency)
            .bind(&row.raw)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(account_id, count = transactions.len(), "Transaction history updated");
        Ok(())
    }

    async fn list_balances(&self) -> Result<Vec<AccountBalance>> {
        let rows = sqlx::query_as::<_, PositionDbModel>(
            "SELECT * FROM positions ORDER BY account_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(PositionDbModel::balance).collect()
    }

    async fn list_transactions(&self, account_id: &str) -> Result<Vec<AccountTransaction>> {
        let rows = sqlx::query_as::<_, TransactionDbModel>(
            r#"
            SELECT * FROM transactions
            WHERE account_id = ?
            ORDER BY booking_date IS NOT NULL, booking_date DESC, id DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(TransactionDbModel::transaction).collect()
    }
}
