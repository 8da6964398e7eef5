//! Generic LRU+TTL cache (spec §4.1).
//!
//! Generalizes the teacher's `reducers::VerdictCache` — a hash-keyed cache
//! storing `(value, timestamp)` pairs behind a single mutex, evicting the
//! oldest entry on overflow — into a reusable type shared by the session
//! store, the geo cache and the fingerprint cache. Capacity comes from the
//! `lru` crate's intrusive doubly-linked-list + hashmap so `get`/`set` stay
//! O(1) amortized; TTL is layered on top since `lru::LruCache` alone has no
//! notion of expiry.

use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// Thread-safe LRU cache with a per-entry TTL.
pub struct Cache<K, V> {
    inner: Mutex<LruCache<K, Entry<V>>>,
}

impl<K: Hash + Eq + Clone, V: Clone> Cache<K, V> {
    pub fn new(max_size: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(max_size.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Returns the value if present and not expired. An expired entry is
    /// removed as a side effect, matching the spec's "evicted on access"
    /// contract.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap();
        let expired = matches!(guard.peek(key), Some(e) if e.is_expired(now));
        if expired {
            guard.pop(key);
            return None;
        }
        guard.get(key).map(|e| e.value.clone())
    }

    /// Insert or update a key. Updating an existing key refreshes its value
    /// and TTL and moves it to most-recently-used without changing size.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            inserted_at: Instant::now(),
            ttl,
        };
        self.inner.lock().unwrap().put(key, entry);
    }

    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().unwrap().pop(key).is_some()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Keys ordered most-recently-used to least-recently-used.
    pub fn keys(&self) -> Vec<K> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Evict every entry whose TTL has elapsed. Returns the count evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap();
        let expired: Vec<K> = guard
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            guard.pop(&key);
        }
        count
    }

    /// Read-modify-write under a single lock acquisition, so concurrent
    /// callers for the same key never lose an update (spec §4.2 invariant).
    pub fn update_or_insert_with<F>(&self, key: K, ttl: Duration, f: F)
    where
        F: FnOnce(Option<V>) -> V,
    {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap();
        let current = guard
            .get(&key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone());
        let updated = f(current);
        guard.put(
            key,
            Entry {
                value: updated,
                inserted_at: now,
                ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_roundtrip() {
        let cache: Cache<&str, i32> = Cache::new(10);
        cache.set("a", 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a"), Some(1));
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache: Cache<&str, i32> = Cache::new(10);
        cache.set("a", 1, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn capacity_is_strictly_bounded() {
        let cache: Cache<i32, i32> = Cache::new(2);
        cache.set(1, 1, Duration::from_secs(60));
        cache.set(2, 2, Duration::from_secs(60));
        cache.set(3, 3, Duration::from_secs(60));
        assert_eq!(cache.size(), 2);
        // 1 was LRU and should have been evicted.
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn updating_existing_key_does_not_grow_size() {
        let cache: Cache<i32, i32> = Cache::new(5);
        cache.set(1, 1, Duration::from_secs(60));
        cache.set(1, 2, Duration::from_secs(60));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(&1), Some(2));
    }

    #[test]
    fn keys_are_ordered_mru_first() {
        let cache: Cache<i32, i32> = Cache::new(5);
        cache.set(1, 1, Duration::from_secs(60));
        cache.set(2, 2, Duration::from_secs(60));
        cache.get(&1); // touch 1, making it MRU
        assert_eq!(cache.keys(), vec![1, 2]);
    }
}
