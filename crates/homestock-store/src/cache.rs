//! Hot read-through cache using [`moka`].
//!
//! [`HotCache`] sits in front of the SQLite backend so repeated turns of the
//! same conversation do not round-trip through the blocking pool.  Entries
//! carry a global time-to-live and are capacity-bounded.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate in `[0.0, 1.0]`; 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} rate={:.2}%",
            self.hits(),
            self.misses(),
            self.hit_rate() * 100.0,
        )
    }
}

// ── hot cache ────────────────────────────────────────────────────────

/// A named, async-aware cache of cloneable values.
pub struct HotCache<T> {
    name: &'static str,
    inner: Cache<String, T>,
    stats: Arc<CacheStats>,
}

impl<T> Clone for HotCache<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: self.inner.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> HotCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        debug!(name, max_capacity, ?ttl, "hot cache created");

        Self {
            name,
            inner,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let value = self.inner.get(key).await;
        if value.is_some() {
            self.stats.record_hit();
            debug!(cache = self.name, key, "cache hit");
        } else {
            self.stats.record_miss();
            debug!(cache = self.name, key, "cache miss");
        }
        value
    }

    pub async fn insert(&self, key: &str, value: T) {
        self.inner.insert(key.to_string(), value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
        debug!(cache = self.name, key, "cache invalidate");
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cache() -> HotCache<String> {
        HotCache::new("test", 100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn insert_get_invalidate() {
        let cache = make_cache();
        cache.insert("c1", "ctx".to_string()).await;
        assert_eq!(cache.get("c1").await.as_deref(), Some("ctx"));

        cache.invalidate("c1").await;
        assert!(cache.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn stats_tracking() {
        let cache = make_cache();
        cache.insert("a", "1".into()).await;

        let _ = cache.get("a").await;
        let _ = cache.get("missing").await;

        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_display() {
        let stats = CacheStats::default();
        stats.hits.store(3, Ordering::Relaxed);
        stats.misses.store(1, Ordering::Relaxed);
        let display = format!("{stats}");
        assert!(display.contains("hits=3"));
        assert!(display.contains("75.00%"));
    }
}
