//! Credential store repository (SQLx).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::credentials::{CredentialError, CredentialStore, Credentials, RefreshState};
use crate::database::models::{BankCredentialDbModel, RefreshStateDbModel};
use crate::database::time::datetime_to_ms;

/// SQLx-backed credential store.
pub struct SqlxCredentialStore {
    pool: SqlitePool,
}

impl SqlxCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the login material of `credentials.user_id`.
    #[instrument(skip_all, fields(user_id = %credentials.user_id))]
    pub async fn upsert_credentials(
        &self,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        credentials.validate()?;
        let now = datetime_to_ms(now);

        sqlx::query(
            r#"
            INSERT INTO bank_credentials (
                user_id, username, password, client_id, client_secret, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                password = excluded.password,
                client_id = excluded.client_id,
                client_secret = excluded.client_secret,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credentials.user_id)
        .bind(&credentials.username)
        .bind(&credentials.password)
        .bind(&credentials.client_id)
        .bind(&credentials.client_secret)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Credentials stored");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqlxCredentialStore {
    async fn load(&self, user_id: &str) -> Result<Credentials, CredentialError> {
        let row = sqlx::query_as::<_, BankCredentialDbModel>(
            "SELECT * FROM bank_credentials WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CredentialError::NotFound(user_id.to_string()))?;

        let credentials = Credentials::from(row);
        credentials.validate()?;
        Ok(credentials)
    }

    async fn persist(&self, user_id: &str, state: &RefreshState) -> Result<(), CredentialError> {
        let row = RefreshStateDbModel::from_state(user_id, state);
        sqlx::query(
            r#"
            INSERT INTO refresh_state (
                user_id, session_id, refresh_token, access_expires_at, updated_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                session_id = excluded.session_id,
                refresh_token = excluded.refresh_token,
                access_expires_at = excluded.access_expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.user_id)
        .bind(&row.session_id)
        .bind(&row.refresh_token)
        .bind(row.access_expires_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_refresh_state(
        &self,
        user_id: &str,
    ) -> Result<Option<RefreshState>, CredentialError> {
        let row = sqlx::query_as::<_, RefreshStateDbModel>(
            "SELECT * FROM refresh_state WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshState::from))
    }

    async fn clear(&self, user_id: &str) -> Result<(), CredentialError> {
        sqlx::query("DELETE FROM refresh_state WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
