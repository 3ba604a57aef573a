//! Local order persistence.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::LocalOrderDbModel;
use crate::domain::LocalOrder;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &LocalOrder) -> Result<()>;

    /// Overwrite the stored order; `NotFound` when it does not exist.
    async fn update(&self, order: &LocalOrder) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<LocalOrder>>;

    /// Newest first, optionally restricted to one account.
    async fn list(&self, account_id: Option<&str>) -> Result<Vec<LocalOrder>>;
}

pub struct SqlxOrderRepository {
    pool: SqlitePool,
}

impl SqlxOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn insert(&self, order: &LocalOrder) -> Result<()> {
        let row = LocalOrderDbModel::from(order);
        sqlx::query(
            r#"
            INSERT INTO local_orders (
                id, account_id, instrument, side, order_type, quantity, limit_price, notes,
                status, remote_order_id, last_sync_error, sync_attempts,
                created_at, updated_at, last_synced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.account_id)
        .bind(&row.instrument)
        .bind(&row.side)
        .bind(&row.order_type)
        .bind(row.quantity)
        .bind(row.limit_price)
        .bind(&row.notes)
        .bind(&row.status)
        .bind(&row.remote_order_id)
        .bind(&row.last_sync_error)
        .bind(row.sync_attempts)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.last_synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, order: &LocalOrder) -> Result<()> {
        let row = LocalOrderDbModel::from(order);
        let result = sqlx::query(
            r#"
            UPDATE local_orders
            SET status = ?,
                remote_order_id = ?,
                last_sync_error = ?,
                sync_attempts = ?,
                updated_at = ?,
                last_synced_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.status)
        .bind(&row.remote_order_id)
        .bind(&row.last_sync_error)
        .bind(row.sync_attempts)
        .bind(row.updated_at)
        .bind(row.last_synced_at)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(crate::Error::not_found("LocalOrder", &row.id));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<LocalOrder>> {
        let row = sqlx::query_as::<_, LocalOrderDbModel>("SELECT * FROM local_orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(LocalOrder::try_from).transpose()
    }

    async fn list(&self, account_id: Option<&str>) -> Result<Vec<LocalOrder>> {
        let rows = match account_id {
            Some(account_id) => {
                sqlx::query_as::<_, LocalOrderDbModel>(
                    "SELECT * FROM local_orders WHERE account_id = ? ORDER BY created_at DESC, id",
                )
                .bind(account_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LocalOrderDbModel>(
                    "SELECT * FROM local_orders ORDER BY created_at DESC, id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(LocalOrder::try_from).collect()
    }
}
