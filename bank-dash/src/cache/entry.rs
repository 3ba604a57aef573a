use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::session::SessionId;

/// A cached payload and the session whose token fetched it.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub payload: Arc<T>,
    pub fetched_at: DateTime<Utc>,
    pub source_session: SessionId,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            fetched_at: self.fetched_at,
            source_session: self.source_session,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, fetched_at: DateTime<Utc>, source_session: SessionId) -> Self {
        Self {
            payload: Arc::new(payload),
            fetched_at,
            source_session,
        }
    }

    /// Age at `now`; zero for entries stamped in the future.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_staleness: Duration) -> bool {
        self.age(now) <= max_staleness
    }
}

/// A value handed out by a repository read.
#[derive(Debug)]
pub struct Cached<T> {
    pub value: Arc<T>,
    pub fetched_at: DateTime<Utc>,
    pub session_id: SessionId,
    /// Served past its staleness window because a refetch failed.
    pub stale: bool,
}

impl<T> Clone for Cached<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
            session_id: self.session_id,
            stale: self.stale,
        }
    }
}

impl<T> Cached<T> {
    pub(crate) fn from_entry(entry: &CacheEntry<T>, stale: bool) -> Self {
        Self {
            value: Arc::clone(&entry.payload),
            fetched_at: entry.fetched_at,
            session_id: entry.source_session,
            stale,
        }
    }
}

impl<T> std::ops::Deref for Cached<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}
