//! In-memory cache with absolute per-entry expiry.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

/// Default time-to-live for cache entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache entry with its absolute expiry.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now.checked_add(ttl).unwrap_or(now + DEFAULT_TTL * 24 * 365),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Key-value cache where every entry expires a fixed time after insertion.
///
/// Data is stored in a `RwLock`-protected `HashMap` and values are cloned on
/// read, so callers never share the cached value mutably. There is no size
/// bound; [`cleanup_expired`](Self::cleanup_expired) is the only bulk
/// reclamation path.
pub struct ExpiringCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<K, V> fmt::Debug for ExpiringCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl<K, V> Default for ExpiringCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<K, V> ExpiringCache<K, V> {
    /// Create an empty cache whose `set` uses `default_ttl`.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Returns the TTL applied by [`set`](Self::set).
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Returns the value for `key` if present and not expired.
    ///
    /// An expired entry is evicted on the way out.
    #[instrument(skip_all)]
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => {
                    trace!("Cache miss");
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    trace!("Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a concurrent `set` may have refreshed it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            debug!("Evicted expired cache entry");
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Stores `value` under `key` with the default TTL.
    pub async fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    ///
    /// Overwrites any existing entry.
    #[instrument(skip(self, key, value))]
    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry::new(value, ttl));
        trace!(entries = entries.len(), "Cached value");
    }

    /// Removes `key`. No-op if absent.
    pub async fn delete(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Removes every entry.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        debug!("Cleared all cache entries");
    }

    /// Evicts every expired entry and returns how many were removed.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("Removed {} expired cache entries", removed);
        }
        removed
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quotes_core::{PriceBar, Symbol, TimeSeries};
    use std::sync::Arc;
    use tokio::time::advance;

    fn series() -> TimeSeries {
        let bar = PriceBar::from_close(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(), 37.5);
        TimeSeries::new(Symbol::new("PETR4"), vec![bar]).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl_and_after_expiry() {
        let cache = ExpiringCache::new(Duration::from_secs(3600));
        cache.set("k", series()).await;

        assert_eq!(cache.get(&"k").await, Some(series()));

        advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get(&"k").await, Some(series()));

        advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"k").await, None);
        // Lazy eviction removed the entry.
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_boundary_is_exclusive() {
        let cache = ExpiringCache::default();
        cache.set_with_ttl(1u32, "v", Duration::from_secs(10)).await;

        advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_do_not_refresh_ttl() {
        let cache = ExpiringCache::new(Duration::from_secs(10));
        cache.set("k", 1).await;

        for _ in 0..9 {
            advance(Duration::from_secs(1)).await;
            assert_eq!(cache.get(&"k").await, Some(1));
        }
        advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_restarts_ttl() {
        let cache = ExpiringCache::new(Duration::from_secs(10));
        cache.set("k", 1).await;
        advance(Duration::from_secs(8)).await;
        cache.set("k", 2).await;
        advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&"k").await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_only_expired() {
        let cache = ExpiringCache::new(Duration::from_secs(100));
        cache.set_with_ttl("short-1", 1, Duration::from_secs(5)).await;
        cache.set_with_ttl("short-2", 2, Duration::from_secs(5)).await;
        cache.set("long", 3).await;

        advance(Duration::from_secs(6)).await;
        assert_eq!(cache.cleanup_expired().await, 2);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&"long").await, Some(3));

        assert_eq!(cache.cleanup_expired().await, 0);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = ExpiringCache::default();
        cache.set("a", 1).await;
        cache.set("b", 2).await;

        cache.delete(&"a").await;
        cache.delete(&"missing").await;
        assert_eq!(cache.get(&"a").await, None);
        assert_eq!(cache.get(&"b").await, Some(2));

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_immediately_expired() {
        let cache = ExpiringCache::default();
        cache.set_with_ttl("k", 1, Duration::ZERO).await;
        assert_eq!(cache.get(&"k").await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let cache = Arc::new(ExpiringCache::new(Duration::from_secs(60)));

        let handles: Vec<_> = (0..64u32)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.set(i, i * 2).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 64);
        for i in 0..64u32 {
            assert_eq!(cache.get(&i).await, Some(i * 2));
        }
    }
}
