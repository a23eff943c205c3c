//! In-memory cache of decrypted data keys.

use secrecy::SecretVec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Time-to-live of every data key installed by normal resolution.
pub const DATA_KEY_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// A decrypted data key, shared between the cache and its callers.
pub type DataKey = Arc<SecretVec<u8>>;

struct CacheEntry {
    plaintext: DataKey,
    // `None` never expires.
    expiry: Option<Instant>,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        self.expiry.map_or(true, |expiry| now < expiry)
    }
}

/// Maps data key names to their decrypted bytes for a bounded time.
///
/// Expired entries are evicted lazily by the lookup that finds them. Every
/// operation takes the lock once, so an entry is either fully installed or
/// absent.
#[derive(Default)]
pub struct DataKeyCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DataKeyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached data key if present and not expired.
    pub fn get(&self, name: &str) -> Option<DataKey> {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get(name) {
            Some(entry) if entry.is_valid(now) => Some(Arc::clone(&entry.plaintext)),
            Some(_) => {
                entries.remove(name);
                None
            }
            None => None,
        }
    }

    /// Installs a data key that expires after `ttl`.
    ///
    /// A `ttl` too large to represent never expires. Concurrent puts for the
    /// same name keep the last one.
    pub fn put(&self, name: impl Into<String>, plaintext: DataKey, ttl: Duration) {
        let expiry = Instant::now().checked_add(ttl);
        self.lock().insert(name.into(), CacheEntry { plaintext, expiry });
    }

    /// Number of entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every entry, forcing the next resolutions back to the store.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // Entries are replaced whole, a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn key(byte: u8) -> DataKey {
        Arc::new(SecretVec::new(vec![byte; 16]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_and_miss() {
        let cache = DataKeyCache::new();
        assert!(cache.get("root").is_none());

        cache.put("root", key(1), DATA_KEY_CACHE_TTL);
        let hit = cache.get("root").expect("cache hit");
        assert_eq!(hit.expose_secret(), &vec![1; 16]);
        assert!(cache.get("other").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry_evicts_lazily() {
        let cache = DataKeyCache::new();
        cache.put("root", key(2), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("root").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        // Still stored until a lookup notices it expired.
        assert_eq!(cache.len(), 1);
        assert!(cache.get("root").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = DataKeyCache::new();
        cache.put("root", key(3), Duration::MAX);

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert!(cache.get("root").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_replaces_entry() {
        let cache = DataKeyCache::new();
        cache.put("root", key(4), DATA_KEY_CACHE_TTL);
        cache.put("root", key(5), DATA_KEY_CACHE_TTL);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("root").unwrap().expose_secret(), &vec![5; 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let cache = DataKeyCache::new();
        cache.put("a", key(6), DATA_KEY_CACHE_TTL);
        cache.put("b", key(7), DATA_KEY_CACHE_TTL);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_and_gets() {
        let cache = Arc::new(DataKeyCache::new());

        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let name = format!("key-{}", i % 4);
                    cache.put(name.clone(), key(i % 4), DATA_KEY_CACHE_TTL);
                    cache.get(&name).map(|k| k.expose_secret()[0])
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let seen = handle.await.unwrap();
            #[allow(clippy::cast_possible_truncation)]
            let expected = (i % 4) as u8;
            assert_eq!(seen, Some(expected));
        }
        assert_eq!(cache.len(), 4);
    }
}
