//! # Bounded Cache Module
//!
//! A small least-recently-used cache with a per-entry time-to-live, used to
//! keep fetched footer code images around for the lifetime of a long-running
//! process without unbounded growth.
//!
//! ## Overview
//!
//! - **Bounded growth**: at most `capacity` entries; inserting into a full
//!   cache evicts the least recently used entry
//! - **Expiry**: entries older than `ttl` are dropped lazily on lookup
//! - **Thread-safe**: an [`lru::LruCache`] behind a mutex, each value stamped
//!   with its insertion time
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use longshot::core::bounded_cache::BoundedCache;
//!
//! let cache = BoundedCache::new(2, Duration::from_secs(60));
//! cache.insert("a".to_string(), 1u32);
//! cache.insert("b".to_string(), 2u32);
//! assert_eq!(cache.get(&"a".to_string()), Some(1));
//!
//! // "b" is now least recently used and gets evicted.
//! cache.insert("c".to_string(), 3u32);
//! assert_eq!(cache.get(&"b".to_string()), None);
//! assert_eq!(cache.stats(), (2, 2));
//! ```

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

/// LRU cache with a time-to-live per entry.
#[derive(Debug)]
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, (Instant, V)>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Creates an empty cache. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, (Instant, V)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Looks up `key`, refreshing its recency. Expired entries are removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let inserted_at = entries.peek(key)?.0;
        if inserted_at.elapsed() >= self.ttl {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|(_, value)| value.clone())
    }

    /// Inserts or replaces `key`, evicting the least recently used entry when full.
    pub fn insert(&self, key: K, value: V) {
        self.lock().put(key, (Instant::now(), value));
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns `(entries, capacity)`.
    pub fn stats(&self) -> (usize, usize) {
        let entries = self.lock();
        (entries.len(), entries.cap().get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic() {
        let cache = BoundedCache::new(3, Duration::from_secs(60));
        cache.insert(1u32, "one".to_string());
        assert_eq!(cache.get(&1), Some("one".to_string()));
        assert_eq!(cache.get(&2), None);

        cache.insert(1u32, "uno".to_string());
        assert_eq!(cache.get(&1), Some("uno".to_string()));
        assert_eq!(cache.stats(), (1, 3));
    }

    #[test]
    fn test_cache_overflow_evicts_least_recent() {
        let cache = BoundedCache::new(2, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.insert("c", 3);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
        let (len, _) = cache.stats();
        assert_eq!(len, 2);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = BoundedCache::new(0, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = BoundedCache::new(4, Duration::from_secs(10));
        cache.insert("a", 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get(&"a"), Some(1));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.stats().0, 0);

        cache.clear();
        assert_eq!(cache.stats().0, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_per_entry() {
        let cache = BoundedCache::new(4, Duration::from_secs(10));
        cache.insert("old", 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("new", 2);
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(cache.get(&"old"), None);
        assert_eq!(cache.get(&"new"), Some(2));
        assert_eq!(cache.stats(), (1, 4));
    }
}
