//! Concurrent cache keyed per resource, with entries stamped by session.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tracing::debug;

use super::entry::{CacheEntry, Cached};
use super::locks::{KeyedGuard, KeyedLocks};
use crate::session::{InvalidationReason, SessionId, SessionObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Cache of one resource kind.
///
/// An entry is only ever served to the session that fetched it, and never
/// after that session was invalidated. Writers of the same key serialize on
/// [`SessionCache::lock_key`]; different keys proceed in parallel.
pub struct SessionCache<K, V>
where
    K: Eq + Hash,
{
    name: &'static str,
    entries: DashMap<K, CacheEntry<V>>,
    key_locks: KeyedLocks<K>,
    revoked: DashSet<SessionId>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> SessionCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Send + Sync,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            key_locks: KeyedLocks::new(),
            revoked: DashSet::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn servable(&self, entry: &CacheEntry<V>, session: SessionId) -> bool {
        entry.source_session == session && !self.revoked.contains(&entry.source_session)
    }

    /// Entry of `session` no older than `max_staleness`.
    pub fn get_fresh(
        &self,
        key: &K,
        session: SessionId,
        max_staleness: Duration,
        now: DateTime<Utc>,
    ) -> Option<Cached<V>> {
        let hit = self
            .entries
            .get(key)
            .filter(|entry| self.servable(entry, session) && entry.is_fresh(now, max_staleness))
            .map(|entry| Cached::from_entry(&entry, false));

        match hit {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Entry of `session` regardless of age, marked stale when past `max_staleness`.
    pub fn get_usable(
        &self,
        key: &K,
        session: SessionId,
        max_staleness: Duration,
        now: DateTime<Utc>,
    ) -> Option<Cached<V>> {
        let entry = self.entries.get(key)?;
        if !self.servable(&entry, session) {
            return None;
        }
        Some(Cached::from_entry(&entry, !entry.is_fresh(now, max_staleness)))
    }

    /// Store `value` as fetched by `session`. Dropped when `session` was invalidated meanwhile.
    pub fn insert(
        &self,
        key: K,
        value: V,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> Cached<V> {
        let entry = CacheEntry::new(value, now, session);
        let cached = Cached::from_entry(&entry, false);
        if self.revoked.contains(&session) {
            debug!(cache = self.name, key = ?key, session_id = %session, "Not caching data of an invalidated session");
            return cached;
        }
        self.entries.insert(key, entry);
        cached
    }

    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Evict every entry fetched by `session` and refuse it from now on.
    pub fn invalidate_session(&self, session: &SessionId) -> usize {
        self.revoked.insert(*session);
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.source_session != *session);
        let evicted = before.saturating_sub(self.entries.len());
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        if evicted > 0 {
            debug!(cache = self.name, session_id = %session, evicted, "Evicted session entries");
        }
        evicted
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Serialize fetch-and-store of one key until the guard is dropped.
    pub async fn lock_key(&self, key: &K) -> KeyedGuard<'_, K> {
        self.key_locks.lock(key.clone()).await
    }

    /// Keys with a fetch running or waiting.
    pub fn locked_keys(&self) -> usize {
        self.key_locks.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> SessionObserver for SessionCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync,
    V: Send + Sync,
{
    fn on_session_invalidated(&self, session_id: &SessionId, _reason: InvalidationReason) {
        self.invalidate_session(session_id);
    }
}
