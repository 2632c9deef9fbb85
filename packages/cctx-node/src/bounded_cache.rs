//! Bounded cache with TTL and max-size eviction.
//!
//! Backs the per-chain block cache used by the inclusion verifier. Blocks are
//! keyed by height; a stale block is removed explicitly when the verifier
//! detects a mismatch.
//!
//! ## Recommended RAM
//!
//! - A cached block holds its full transaction list; a 200-tx block with
//!   small calldata is on the order of 60 KB.
//! - The default 1000-block cache is ≈ 60 MB per chain; lower
//!   `BLOCK_CACHE_SIZE` on memory-constrained hosts.

use std::collections::HashMap;
use std::env;
use std::hash::Hash;
use std::time::{Duration, Instant};

const DEFAULT_BLOCK_CACHE_SIZE: usize = 1000;
const DEFAULT_BLOCK_CACHE_TTL_SECS: u64 = 3600;

/// Read cache configuration from environment variables with defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub block_cache_size: usize,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            block_cache_size: env::var("BLOCK_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BLOCK_CACHE_SIZE),
            ttl_secs: env::var("BLOCK_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BLOCK_CACHE_TTL_SECS),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_cache_size: DEFAULT_BLOCK_CACHE_SIZE,
            ttl_secs: DEFAULT_BLOCK_CACHE_TTL_SECS,
        }
    }
}

/// Map of `K → V` with max-size and TTL eviction.
///
/// - **Max capacity:** when full, the oldest entry is evicted on insert.
/// - **TTL:** expired entries are invisible to `get` and dropped on insert.
pub struct BoundedCache<K, V> {
    map: HashMap<K, (V, Instant)>,
    max_size: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Copy, V> BoundedCache<K, V> {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            map: HashMap::new(),
            max_size: max_size.max(1),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map
            .get(key)
            .filter(|(_, t)| t.elapsed() < self.ttl)
            .map(|(v, _)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = Instant::now();
        self.map
            .retain(|_, (_, t)| now.duration_since(*t) < self.ttl);
        while self.map.len() >= self.max_size && !self.map.contains_key(&key) {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, (_, t))| *t)
                .map(|(k, _)| *k);
            if let Some(k) = oldest {
                self.map.remove(&k);
            } else {
                break;
            }
        }
        self.map.insert(key, (value, now));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(v, _)| v)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = BoundedCache::new(10, 3600);
        cache.insert(1u64, "block-1");
        assert_eq!(cache.get(&1), Some(&"block-1"));
        assert!(cache.contains_key(&1));
        assert!(!cache.contains_key(&2));
    }

    #[test]
    fn test_evicts_oldest() {
        let mut cache = BoundedCache::new(3, 3600);
        cache.insert(1u64, 'a');
        cache.insert(2u64, 'b');
        cache.insert(3u64, 'c');
        cache.insert(4u64, 'd');
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.get(&4), Some(&'d'));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_reinsert_existing_key_does_not_evict() {
        let mut cache = BoundedCache::new(2, 3600);
        cache.insert(1u64, 'a');
        cache.insert(2u64, 'b');
        cache.insert(2u64, 'B');
        assert_eq!(cache.get(&1), Some(&'a'));
        assert_eq!(cache.get(&2), Some(&'B'));
    }

    #[test]
    fn test_remove() {
        let mut cache = BoundedCache::new(10, 3600);
        cache.insert(7u64, 42);
        assert_eq!(cache.remove(&7), Some(42));
        assert!(cache.get(&7).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_hides_entries() {
        let mut cache = BoundedCache::new(10, 0);
        cache.insert(1u64, 'x');
        assert!(cache.get(&1).is_none());
    }
}
