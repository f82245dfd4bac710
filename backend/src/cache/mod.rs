//! Content-addressed caches.
//!
//! Entries are keyed by a SHA-256 digest of everything that influences the
//! cached result, so identical inputs hit and any byte change misses. Caches
//! are plain values owned by whoever needs them (server state, environment
//! config); nothing here is global.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Hex SHA-256 digest identifying a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn builder() -> ContentKeyBuilder {
        ContentKeyBuilder {
            hasher: Sha256::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental key construction.
///
/// Each part is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub struct ContentKeyBuilder {
    hasher: Sha256,
}

impl ContentKeyBuilder {
    pub fn part(mut self, bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Hash the canonical JSON form of a serializable value.
    pub fn json(self, value: &impl serde::Serialize) -> Self {
        let encoded = serde_json::to_vec(value).unwrap_or_default();
        self.part(encoded)
    }

    pub fn finish(self) -> ContentKey {
        ContentKey(hex::encode(self.hasher.finalize()))
    }
}

/// Bounded, thread-safe LRU cache keyed by content digest.
pub struct ContentCache<V> {
    entries: Mutex<LruCache<ContentKey, V>>,
}

impl<V: Clone> ContentCache<V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Shared handle, convenient for closures registered in templates.
    pub fn shared(capacity: NonZeroUsize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    pub fn get(&self, key: &ContentKey) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn put(&self, key: ContentKey, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, value);
    }

    /// Return the cached value or compute, store and return it.
    pub fn get_or_insert_with<E>(
        &self,
        key: ContentKey,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = compute()?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_key_is_stable_and_part_sensitive() {
        let a = ContentKey::builder().part("ab").part("c").finish();
        let b = ContentKey::builder().part("ab").part("c").finish();
        let c = ContentKey::builder().part("a").part("bc").finish();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ContentCache::new(capacity(2));
        let k1 = ContentKey::builder().part("1").finish();
        let k2 = ContentKey::builder().part("2").finish();
        let k3 = ContentKey::builder().part("3").finish();

        cache.put(k1.clone(), 1);
        cache.put(k2.clone(), 2);
        assert_eq!(cache.get(&k1), Some(1));
        cache.put(k3.clone(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&k2), None);
        assert_eq!(cache.get(&k3), Some(3));
    }

    #[test]
    fn test_get_or_insert_computes_once() {
        let cache = ContentCache::new(capacity(4));
        let key = ContentKey::builder().json(&serde_json::json!({"a": 1})).finish();
        let mut calls = 0;

        for _ in 0..3 {
            let value: Result<i32, ()> = cache.get_or_insert_with(key.clone(), || {
                calls += 1;
                Ok(42)
            });
            assert_eq!(value, Ok(42));
        }
        assert_eq!(calls, 1);
    }
}
