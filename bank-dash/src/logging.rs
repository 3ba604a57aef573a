//! Tracing subscriber setup.
//!
//! Console output always; JSON instead of text when configured; a daily
//! rolling file when a log directory is set. Files older than the retention
//! window are removed by [`prune_old_logs`].

use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LoggingConfig;

pub const DEFAULT_LOG_FILTER: &str = "bank_dash=info,comdirect_api=info,sqlx=warn";

const LOG_FILE_PREFIX: &str = "bank-dash.log";

pub const LOG_RETENTION_DAYS: i64 = 7;

/// Timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Install the global subscriber. Keep the returned guard alive to flush the file writer.
pub fn init(config: &LoggingConfig) -> crate::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (file_writer, guard) = match &config.dir {
        Some(dir) => {
            let path = PathBuf::from(dir);
            std::fs::create_dir_all(&path)?;
            let appender = tracing_appender::rolling::daily(&path, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let console_text = (!config.json).then(|| fmt::layer().with_ansi(true).with_timer(LocalTimer));
    let console_json = config
        .json
        .then(|| fmt::layer().json().with_timer(LocalTimer));
    let file = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_timer(LocalTimer)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_text)
        .with(console_json)
        .with(file)
        .try_init()
        .map_err(|e| crate::Error::Logging(e.to_string()))?;

    Ok(guard)
}

/// Delete rolled log files older than `retention_days`. Returns the number deleted.
pub async fn prune_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{LOG_FILE_PREFIX}.");

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }
    Ok(deleted)
}
