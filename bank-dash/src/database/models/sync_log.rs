use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Succeeded,
    Failed,
    /// Nothing to do, e.g. no active session.
    Skipped,
}

/// One run of a background job.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncLogDbModel {
    pub id: String,
    pub job: String,
    pub status: String,
    pub detail: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

impl SyncLogDbModel {
    pub fn started(job: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job: job.into(),
            status: SyncStatus::Running.to_string(),
            detail: None,
            started_at: datetime_to_ms(now),
            finished_at: None,
        }
    }

    pub fn status(&self) -> Option<SyncStatus> {
        self.status.parse().ok()
    }

    pub fn get_started_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.started_at)
    }

    pub fn get_finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at.map(ms_to_datetime)
    }
}
