//! Time-bound memo of resolver results, shared by every tenant.
//!
//! Entries expire after a fixed TTL. Expiry is enforced on lookup, so the
//! periodic sweep started by [`spawn_sweeper`] is housekeeping only.
//! Timestamps come from [`tokio::time::Instant`], which lets tests drive
//! expiry with a paused clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default entry lifetime (one hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    /// Entries past their TTL that haven't been evicted yet
    pub expired: usize,
    pub ttl_secs: u64,
}

/// Resolution cache keyed by locator (or any string key).
pub struct ResolutionCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ResolutionCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a key. Expired entries are evicted and reported as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = entries.get(key)?.inserted_at.elapsed() > self.ttl;
        if expired {
            entries.remove(key);
            tracing::debug!(target: "cache", key, "Evicted expired entry");
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace a value, stamping the current time.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.entries.lock().insert(
            key.into(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove one entry. Returns true if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let expired = entries
            .values()
            .filter(|entry| entry.inserted_at.elapsed() > self.ttl)
            .count();
        CacheStats {
            entries: entries.len(),
            expired,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

/// Run [`ResolutionCache::cleanup_expired`] every `interval` until aborted.
pub fn spawn_sweeper<V>(cache: Arc<ResolutionCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.cleanup_expired();
            if removed > 0 {
                tracing::info!(target: "cache", removed, "Swept expired resolution entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        cache.set("k", 42);
        assert_eq!(cache.get("k"), Some(42));
        assert_eq!(cache.get("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_evicts_after_ttl() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        cache.set("k", "v".to_string());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_timestamp() {
        let cache = ResolutionCache::new(Duration::from_secs(10));
        cache.set("k", 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", 2);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_and_stats() {
        let cache = ResolutionCache::new(Duration::from_secs(10));
        cache.set("old", 1);
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.set("new", 2);

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.ttl_secs, 10);

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new"), Some(2));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = ResolutionCache::new(DEFAULT_TTL);
        cache.set("a", 1);
        cache.set("b", 2);
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired() {
        let cache = Arc::new(ResolutionCache::new(Duration::from_secs(5)));
        cache.set("k", 1);
        let sweeper = spawn_sweeper(cache.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(cache.len(), 0);
        sweeper.abort();
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ResolutionCache::new(DEFAULT_TTL));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.set(format!("{t}-{i}"), i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
    }
}
