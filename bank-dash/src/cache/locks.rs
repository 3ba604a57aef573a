//! Per-key async locks that do not outlive their users.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key, created on first use.
///
/// The entry of a key is removed when its last guard is dropped and nobody
/// else is waiting for it, so the map only holds keys in use.
pub struct KeyedLocks<K>
where
    K: Eq + Hash,
{
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = Arc::clone(&lock).lock_owned().await;
        KeyedGuard {
            locks: self,
            key,
            lock,
            guard: Some(guard),
        }
    }

    /// Keys currently locked or waited for.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct KeyedGuard<'a, K>
where
    K: Eq + Hash,
{
    locks: &'a KeyedLocks<K>,
    key: K,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyedGuard<'_, K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        // Release first so the guard's own Arc no longer counts.
        self.guard.take();
        // Map entry plus ours: nobody else holds or awaits this lock.
        self.locks.locks.remove_if(&self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}
