//! Fixed-capacity concurrent cache with insert-if-absent semantics.
//!
//! The mempool content-fetch workers share one cache of recently fetched
//! transaction payloads. Several workers may race to fetch and submit the
//! same transaction from different nodes, so insertion is
//! "first writer wins": [`BoundedCache::insert_if_absent`] reports whether
//! the calling worker was the one that actually stored the value.
//!
//! # Eviction
//!
//! When full, the cache evicts using "least-recent-out-of-2-random-choices":
//! pick two random entries and drop whichever was accessed less recently.
//! This is O(1) per eviction, approximates LRU quality, and degrades more
//! gracefully under pathological access patterns than strict LRU, with
//! far less bookkeeping.
//!
//! # Thread safety
//!
//! All state lives behind a single `Mutex`; every operation takes the lock
//! once, so concurrent readers, writers and evictions cannot observe a
//! partially updated cache.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// A cached value with recency metadata.
struct Slot<V> {
    value: V,
    /// Value of the global access counter at last touch.
    last_access: u64,
    /// Index into `Inner::keys` for O(1) swap-remove during eviction.
    vec_index: usize,
}

/// Cache state protected by the mutex.
struct Inner<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// Keys stored redundantly for O(1) random access during eviction.
    /// Indices are kept in sync with `Slot::vec_index`.
    keys: Vec<K>,
    /// Global access counter for recency tracking.
    access_counter: u64,
    /// xorshift64 state for eviction sampling.
    rng_state: u64,
}

impl<K, V> Inner<K, V> {
    /// Returns a pseudo-random index in `[0, len)`.
    fn rand_index(&mut self, len: usize) -> usize {
        // xorshift64
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x as usize) % len
    }
}

/// A concurrency-safe cache holding at most `capacity` entries.
pub struct BoundedCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A zero capacity is treated as 1 so that insertion always succeeds.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity.min(1024)),
                keys: Vec::with_capacity(capacity.min(1024)),
                access_counter: 0,
                rng_state: 0x5EED_CAFE_BABE_D00D, // arbitrary non-zero seed
            }),
            capacity,
        }
    }

    /// Whether a value is cached for `key`. Does not count as an access.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Returns a clone of the cached value, bumping its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.access_counter += 1;
        let current = inner.access_counter;
        inner.entries.get_mut(key).map(|slot| {
            slot.last_access = current;
            slot.value.clone()
        })
    }

    /// Inserts `value` only if `key` is absent, evicting one entry first
    /// when the cache is full.
    ///
    /// Returns `true` if this call inserted the value, `false` if another
    /// writer got there first. The losing caller's value is dropped.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            return false;
        }

        if inner.keys.len() >= self.capacity {
            Self::evict_one(&mut inner);
        }

        inner.access_counter += 1;
        let last_access = inner.access_counter;
        let vec_index = inner.keys.len();
        inner.keys.push(key.clone());
        inner.entries.insert(
            key,
            Slot {
                value,
                last_access,
                vec_index,
            },
        );
        true
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Evicts the less recently used of two randomly sampled entries.
    fn evict_one(inner: &mut Inner<K, V>) {
        let len = inner.keys.len();
        if len == 0 {
            return;
        }

        let a = inner.rand_index(len);
        let b = inner.rand_index(len);
        let recency = |inner: &Inner<K, V>, idx: usize| {
            inner
                .entries
                .get(&inner.keys[idx])
                .map(|slot| slot.last_access)
                .unwrap_or(0)
        };
        let victim_idx = if recency(inner, a) <= recency(inner, b) {
            a
        } else {
            b
        };

        let victim_key = inner.keys.swap_remove(victim_idx);
        inner.entries.remove(&victim_key);
        // Fix up the slot whose key was moved into the vacated position.
        if victim_idx < inner.keys.len() {
            let moved_key = inner.keys[victim_idx].clone();
            if let Some(slot) = inner.entries.get_mut(&moved_key) {
                slot.vec_index = victim_idx;
            }
        }
    }
}
