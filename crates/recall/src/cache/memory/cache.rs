//! In-memory cache implementation with LRU eviction.
//!
//! Provides a thread-safe in-memory cache with TTL support using
//! tokio synchronization primitives and LRU eviction policy.
//!
//! Keys that belong to a learner (`progress:{learner}:...` and
//! `learner:{learner}:...`) are tracked per learner so that invalidating a
//! learner's prefix never scans the whole cache.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use recall_core::cache::{
    extract_learner_id_from_key, extract_learner_id_from_prefix, Cache, Result,
};

/// A single cache entry with an absolute expiry.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now + Duration::from_secs(86_400 * 365));
        Self { value, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Snapshot of the cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub live: usize,
    pub expired: usize,
}

/// In-memory cache implementation with LRU eviction.
///
/// Thread-safe cache using `Arc<RwLock<LruCache>>` for concurrent access.
/// Expired entries are dropped when read, by [`MemoryCache::purge_expired`]
/// or by the task of [`MemoryCache::spawn_purger`].
/// Uses LRU eviction to limit memory usage when max_entries is reached.
///
/// Lock order is always `store` then `tracking`.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    /// Main key-value store with LRU eviction.
    store: Arc<RwLock<LruCache<String, CacheEntry>>>,
    /// Maps learner_id -> set of cache keys belonging to that learner.
    tracking: Arc<RwLock<HashMap<Uuid, HashSet<String>>>>,
}

impl MemoryCache {
    /// Creates a new in-memory cache with LRU eviction.
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is 0.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).expect("max_entries must be > 0");
        Self {
            store: Arc::new(RwLock::new(LruCache::new(capacity))),
            tracking: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Counts live and expired entries without touching recency.
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        let now = Instant::now();
        let expired = store.iter().filter(|(_, e)| e.is_expired(now)).count();
        CacheStats {
            entries: store.len(),
            live: store.len() - expired,
            expired,
        }
    }

    /// Removes every expired entry and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut store = self.store.write().await;
        let now = Instant::now();
        let expired: Vec<String> = store
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            store.pop(key);
        }

        let mut tracking = self.tracking.write().await;
        for key in &expired {
            untrack(&mut tracking, key);
        }

        tracing::debug!(purged = expired.len(), "purged expired cache entries");
        expired.len()
    }

    /// Purges expired entries every `every` on a background task.
    ///
    /// The task stops when the returned handle is dropped.
    pub fn spawn_purger(&self, every: Duration) -> PurgeTask {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(every);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                cache.purge_expired().await;
            }
        });
        PurgeTask { handle }
    }
}

/// Handle of the task started by [`MemoryCache::spawn_purger`].
#[derive(Debug)]
pub struct PurgeTask {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for PurgeTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn untrack(tracking: &mut HashMap<Uuid, HashSet<String>>, key: &str) {
    let Some(learner_id) = extract_learner_id_from_key(key) else {
        return;
    };
    if let Some(keys) = tracking.get_mut(&learner_id) {
        keys.remove(key);
        if keys.is_empty() {
            tracking.remove(&learner_id);
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut store = self.store.write().await;

        let expired = match store.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            store.pop(key);
            let mut tracking = self.tracking.write().await;
            untrack(&mut tracking, key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut store = self.store.write().await;
        let evicted = store.push(key.to_string(), CacheEntry::new(value.to_vec(), ttl));

        let mut tracking = self.tracking.write().await;
        if let Some((evicted_key, _)) = evicted {
            if evicted_key != key {
                untrack(&mut tracking, &evicted_key);
            }
        }
        if let Some(learner_id) = extract_learner_id_from_key(key) {
            tracking
                .entry(learner_id)
                .or_default()
                .insert(key.to_string());
        }

        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.pop(key);

        let mut tracking = self.tracking.write().await;
        untrack(&mut tracking, key);

        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
        let mut store = self.store.write().await;

        let Some(learner_id) = extract_learner_id_from_prefix(prefix) else {
            // Not scoped to one learner: full scan
            let keys: Vec<String> = store
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                store.pop(key);
            }
            let mut tracking = self.tracking.write().await;
            for key in &keys {
                untrack(&mut tracking, key);
            }
            return Ok(());
        };

        let mut tracking = self.tracking.write().await;
        if let Some(keys) = tracking.get_mut(&learner_id) {
            keys.retain(|key| {
                if key.starts_with(prefix) {
                    store.pop(key);
                    false
                } else {
                    true
                }
            });
            if keys.is_empty() {
                tracking.remove(&learner_id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::cache::{learner_prefix, learner_schedule_key, progress_key};

    /// Default max entries for tests
    const TEST_MAX_ENTRIES: usize = 1000;

    const LONG: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);

        cache.set("test:key", b"test value", LONG).await.unwrap();

        assert_eq!(
            cache.get("test:key").await.unwrap(),
            Some(b"test value".to_vec())
        );
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);

        assert_eq!(cache.get("nonexistent:key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);

        cache.set("test:delete", b"to be deleted", LONG).await.unwrap();
        assert!(cache.get("test:delete").await.unwrap().is_some());

        cache.invalidate("test:delete").await.unwrap();
        assert!(cache.get("test:delete").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiration_evicts_on_read() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);
        let key = progress_key(Uuid::new_v4(), Uuid::new_v4());

        cache
            .set(&key, b"short-lived", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(cache.get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get(&key).await.unwrap().is_none());
        assert_eq!(cache.stats().await.entries, 0);
        assert!(cache.tracking.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_immediately_expired() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);

        cache.set("test:zero", b"gone", Duration::ZERO).await.unwrap();

        assert!(cache.get("test:zero").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_prefix_uses_learner_tracking() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);
        let learner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let item = Uuid::new_v4();

        cache.set(&learner_schedule_key(learner), b"1", LONG).await.unwrap();
        cache.set(&progress_key(learner, item), b"2", LONG).await.unwrap();
        cache.set(&learner_schedule_key(other), b"3", LONG).await.unwrap();
        cache.set("session:123", b"4", LONG).await.unwrap();

        {
            let tracking = cache.tracking.read().await;
            assert_eq!(tracking.get(&learner).map(HashSet::len), Some(2));
        }

        cache.invalidate_prefix(&learner_prefix(learner)).await.unwrap();

        assert!(cache.get(&learner_schedule_key(learner)).await.unwrap().is_none());
        // Progress keys live outside the learner query prefix
        assert!(cache.get(&progress_key(learner, item)).await.unwrap().is_some());
        assert!(cache.get(&learner_schedule_key(other)).await.unwrap().is_some());
        assert!(cache.get("session:123").await.unwrap().is_some());

        let tracking = cache.tracking.read().await;
        assert_eq!(tracking.get(&learner).map(HashSet::len), Some(1));
    }

    #[tokio::test]
    async fn test_invalidate_prefix_no_matches() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);

        cache.set("session:123", b"value", LONG).await.unwrap();
        cache
            .invalidate_prefix(&learner_prefix(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(cache.get("session:123").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_prefix_unscoped_falls_back_to_scan() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);

        cache.set("session:123:profile", b"1", LONG).await.unwrap();
        cache.set("session:456:profile", b"2", LONG).await.unwrap();
        cache.set("session:123:settings", b"3", LONG).await.unwrap();

        cache.invalidate_prefix("session:123:").await.unwrap();

        assert!(cache.get("session:123:profile").await.unwrap().is_none());
        assert!(cache.get("session:123:settings").await.unwrap().is_none());
        assert!(cache.get("session:456:profile").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_removes_from_tracking() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);
        let learner = Uuid::new_v4();
        let key = progress_key(learner, Uuid::new_v4());

        cache.set(&key, b"state", LONG).await.unwrap();
        cache.invalidate(&key).await.unwrap();

        assert!(cache.tracking.read().await.get(&learner).is_none());
    }

    #[tokio::test]
    async fn test_overwrite_value() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);

        cache.set("test:overwrite", b"first", LONG).await.unwrap();
        cache.set("test:overwrite", b"second", LONG).await.unwrap();

        assert_eq!(
            cache.get("test:overwrite").await.unwrap(),
            Some(b"second".to_vec())
        );
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = MemoryCache::new(3);

        cache.set("key1", b"value1", LONG).await.unwrap();
        cache.set("key2", b"value2", LONG).await.unwrap();
        cache.set("key3", b"value3", LONG).await.unwrap();

        // Access key1 to make it recently used
        cache.get("key1").await.unwrap();

        cache.set("key4", b"value4", LONG).await.unwrap();

        assert!(cache.get("key1").await.unwrap().is_some());
        assert!(cache.get("key2").await.unwrap().is_none());
        assert!(cache.get("key3").await.unwrap().is_some());
        assert!(cache.get("key4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lru_eviction_untracks_learner_keys() {
        let cache = MemoryCache::new(1);
        let learner = Uuid::new_v4();

        cache.set(&learner_schedule_key(learner), b"1", LONG).await.unwrap();
        cache.set("key2", b"2", LONG).await.unwrap();

        assert!(cache.tracking.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_purge_expired() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);
        let learner = Uuid::new_v4();

        cache.set("live", b"1", LONG).await.unwrap();
        cache
            .set(&learner_schedule_key(learner), b"2", Duration::ZERO)
            .await
            .unwrap();
        cache.set("stale", b"3", Duration::ZERO).await.unwrap();

        assert_eq!(
            cache.stats().await,
            CacheStats {
                entries: 3,
                live: 1,
                expired: 2
            }
        );

        assert_eq!(cache.purge_expired().await, 2);
        assert_eq!(
            cache.stats().await,
            CacheStats {
                entries: 1,
                live: 1,
                expired: 0
            }
        );
        assert!(cache.tracking.read().await.is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "max_entries must be > 0")]
    async fn test_zero_max_entries_panics() {
        let _ = MemoryCache::new(0);
    }

    #[tokio::test]
    async fn test_purger_drops_expired_entries_until_stopped() {
        let cache = MemoryCache::new(TEST_MAX_ENTRIES);
        let purger = cache.spawn_purger(Duration::from_millis(10));

        cache.set("stale", b"1", Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.stats().await.entries, 0);

        drop(purger);
        tokio::task::yield_now().await;
        cache.set("stale", b"1", Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.stats().await.expired, 1);
    }
}
