//! In-flight deduplication sets
//!
//! Used for the "being signed" (keyed by nonce) and "being reported" (keyed
//! by tx hash) guards. Holding an [`InFlightGuard`] marks the key as taken;
//! dropping it releases the key, including when the owning task panics or is
//! aborted.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// Concurrent set of keys currently owned by some task
#[derive(Debug)]
pub struct InFlightSet<K: Eq + Hash + Clone> {
    inner: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> Clone for InFlightSet<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash + Clone> Default for InFlightSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> InFlightSet<K> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim `key`. Returns `None` if another task already holds it.
    pub fn try_acquire(&self, key: K) -> Option<InFlightGuard<K>> {
        let mut set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            key,
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its key from the owning [`InFlightSet`] on drop
#[derive(Debug)]
pub struct InFlightGuard<K: Eq + Hash + Clone> {
    key: K,
    inner: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> InFlightGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + Clone> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(100u64);
        assert!(guard.is_some());
        assert!(set.try_acquire(100u64).is_none());
        assert!(set.contains(&100));
        assert!(set.try_acquire(101u64).is_some());
    }

    #[test]
    fn test_release_on_drop() {
        let set = InFlightSet::new();
        {
            let _guard = set.try_acquire("0xabc".to_string()).unwrap();
            assert_eq!(set.len(), 1);
        }
        assert!(set.is_empty());
        assert!(set.try_acquire("0xabc".to_string()).is_some());
    }

    #[tokio::test]
    async fn test_release_when_task_aborted() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(7u64).unwrap();
        let handle = tokio::spawn(async move {
            let _g = guard;
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let _ = handle.await;
        assert!(!set.contains(&7));
    }
}
