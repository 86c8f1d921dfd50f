//! Generic TTL + LRU cache with hit/miss metrics (spec §4.2).

pub mod registry;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_access_seq: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    metrics: CacheMetrics,
    access_clock: u64,
}

/// A single named cache, parameterized by `{ttl, maxSize}`. Concurrency-safe
/// for concurrent reads and serialized writes via an `RwLock`, per spec §5's
/// shared-resource policy for caches.
pub struct Cache<K, V> {
    default_ttl: Duration,
    max_size: usize,
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            default_ttl,
            max_size,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                metrics: CacheMetrics::default(),
                access_clock: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.access_clock += 1;
        let seq = inner.access_clock;
        let now = Instant::now();
        let hit = match inner.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access_seq = seq;
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };
        if hit.is_some() {
            inner.metrics.hits += 1;
        } else {
            inner.metrics.misses += 1;
        }
        hit
    }

    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.access_clock += 1;
        let seq = inner.access_clock;
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access_seq)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru_key);
                inner.metrics.evictions += 1;
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                last_access_seq: seq,
            },
        );
        inner.metrics.sets += 1;
    }

    pub fn delete(&self, key: &K) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.entries.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.entries.clear();
    }

    /// Removes entries whose `expiresAt` has passed. Driven by a periodic
    /// tick per spec §5's suspension-point list.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.expires_at > now);
        before - inner.entries.len()
    }

    pub fn stats(&self) -> CacheMetrics {
        self.inner.read().expect("cache lock poisoned").metrics
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_is_a_hit() {
        let cache = Cache::new(Duration::from_secs(60), 10);
        cache.set("a", 1, None);
        assert_eq!(cache.get(&"a"), Some(1));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.sets, 1);
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_removed() {
        let cache = Cache::new(Duration::from_millis(1), 10);
        cache.set("a", 1, None);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn eviction_preserves_max_size() {
        let cache = Cache::new(Duration::from_secs(60), 2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.get(&"a");
        cache.set("c", 3, None);
        assert!(cache.len() <= 2);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn hits_plus_misses_equals_get_calls() {
        let cache: Cache<&str, i32> = Cache::new(Duration::from_secs(60), 10);
        cache.get(&"missing");
        cache.set("a", 1, None);
        cache.get(&"a");
        cache.get(&"missing");
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 3);
    }
}
