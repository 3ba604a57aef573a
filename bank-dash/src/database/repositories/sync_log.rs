//! Background job run history.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{SyncLogDbModel, SyncStatus};

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    async fn start(&self, log: &SyncLogDbModel) -> Result<()>;

    async fn finish(
        &self,
        id: &str,
        status: SyncStatus,
        detail: Option<&str>,
        finished_at: i64,
    ) -> Result<()>;

    /// Most recent runs first.
    async fn recent(&self, limit: i64) -> Result<Vec<SyncLogDbModel>>;

    /// Delete runs started before `before`; returns the number removed.
    async fn prune(&self, before: i64) -> Result<u64>;
}

pub struct SqlxSyncLogRepository {
    pool: SqlitePool,
}

impl SqlxSyncLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncLogRepository for SqlxSyncLogRepository {
    async fn start(&self, log: &SyncLogDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_logs (id, job, status, detail, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.job)
        .bind(&log.status)
        .bind(&log.detail)
        .bind(log.started_at)
        .bind(log.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish(
        &self,
        id: &str,
        status: SyncStatus,
        detail: Option<&str>,
        finished_at: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE sync_logs SET status = ?, detail = ?, finished_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(detail)
            .bind(finished_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<SyncLogDbModel>> {
        let logs = sqlx::query_as::<_, SyncLogDbModel>(
            "SELECT * FROM sync_logs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn prune(&self, before: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sync_logs WHERE started_at < ?")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
