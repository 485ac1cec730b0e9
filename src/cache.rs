//! Time-bounded in-memory cache.
//!
//! Entries live for `ttl` after their last refresh. Expired entries are
//! evicted lazily by [`ExpiringCache::get`] and in bulk by
//! [`ExpiringCache::sweep_expired`], which the service runs on a timer.
//! Timestamps come from `tokio::time::Instant` so tests can drive the clock
//! with a paused runtime.

use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    last_refreshed: Instant,
}

/// Concurrent map from key to value with TTL-based invalidation.
#[derive(Debug)]
pub struct ExpiringCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value if present and fresh; evict it if stale.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if now.saturating_duration_since(entry.last_refreshed) < self.ttl {
                return Some(entry.value.clone());
            }
        }
        // The read guard must be released before touching the shard again.
        self.entries
            .remove_if(key, |_, entry| self.is_expired(entry, now));
        None
    }

    /// Insert or overwrite `key`, stamping it with the current time.
    pub fn put(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_refreshed: Instant::now(),
            },
        );
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_refreshed) >= self.ttl
    }
}
