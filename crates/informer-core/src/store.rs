//! Bounded, concurrently accessed key/value tables
//!
//! `KeyedStateStore` is the building block for every correlation table. It
//! behaves like a kernel hash map: a fixed number of slots, whole-value
//! upsert/remove, and an explicit policy for what happens when it is full.
//!
//! Storage is split into lock shards chosen by key hash, so unrelated keys
//! never contend on one lock. Occupancy is tracked table-wide: a slot is
//! reserved before a new key goes into its shard and released when the key
//! leaves, so the table is full only when all `capacity` slots are taken,
//! however unevenly the keys hash.

use crate::error::StoreError;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Default number of lock shards
pub const DEFAULT_SHARDS: usize = 16;

/// What `upsert` does with a new key when the table is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail with `StoreError::CapacityExceeded` (BPF_MAP_TYPE_HASH)
    Reject,
    /// Drop a least recently used entry (BPF_MAP_TYPE_LRU_HASH). Recency is
    /// tracked per shard, so the victim is the oldest entry of the key's own
    /// shard, or of the next non-empty shard when that one is empty.
    EvictLeastRecent,
}

/// Fixed-capacity sharded table
pub struct KeyedStateStore<K, V> {
    shards: Box<[Mutex<LruCache<K, V>>]>,
    hasher: RandomState,
    capacity: usize,
    occupied: AtomicUsize,
    policy: OverflowPolicy,
    evicted: AtomicU64,
}

impl<K, V> KeyedStateStore<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create a table holding at most `capacity` keys.
    ///
    /// The shard count is capped at `capacity`. Shards are unbounded on their
    /// own; the table-wide slot count is what enforces `capacity`.
    pub fn new(capacity: usize, shards: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        let count = shards.clamp(1, capacity);

        let shards = (0..count).map(|_| Mutex::new(LruCache::unbounded())).collect();

        Self {
            shards,
            hasher: RandomState::new(),
            capacity,
            occupied: AtomicUsize::new(0),
            policy,
            evicted: AtomicU64::new(0),
        }
    }

    fn shard_index(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) % self.shards.len() as u64) as usize
    }

    /// Take one table-wide slot, unless all of them are in use
    fn reserve(&self) -> bool {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.occupied.fetch_sub(1, Ordering::AcqRel);
    }

    /// Insert or replace the value for `key`, returning the previous value.
    pub fn upsert(&self, key: K, value: V) -> Result<Option<V>, StoreError> {
        let idx = self.shard_index(&key);

        loop {
            let mut shard = self.shards[idx].lock();

            if let Some(slot) = shard.get_mut(&key) {
                return Ok(Some(std::mem::replace(slot, value)));
            }

            if self.reserve() {
                shard.put(key, value);
                return Ok(None);
            }

            match self.policy {
                OverflowPolicy::Reject => {
                    return Err(StoreError::CapacityExceeded {
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::EvictLeastRecent => {
                    // The victim's slot passes straight to the new key
                    if shard.pop_lru().is_some() {
                        self.evicted.fetch_add(1, Ordering::Relaxed);
                        shard.put(key, value);
                        return Ok(None);
                    }
                }
            }

            // Nothing to evict here; free a slot elsewhere without holding
            // two shard locks, then retry
            drop(shard);
            self.evict_outside(idx);
        }
    }

    fn evict_outside(&self, idx: usize) {
        let count = self.shards.len();
        for offset in 1..count {
            let mut shard = self.shards[(idx + offset) % count].lock();
            if shard.pop_lru().is_some() {
                self.release();
                self.evicted.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    pub fn lookup(&self, key: &K) -> Option<V> {
        self.shards[self.shard_index(key)].lock().get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let value = self.shards[self.shard_index(key)].lock().pop(key)?;
        self.release();
        Some(value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.shards[self.shard_index(key)].lock().contains(key)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.occupied.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Entries dropped by `EvictLeastRecent` since creation
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            self.occupied.fetch_sub(shard.len(), Ordering::AcqRel);
            shard.clear();
        }
    }
}

impl<K, V> KeyedStateStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Copy out every entry. Diagnostic use only: allocates.
    pub fn entries(&self) -> Vec<(K, V)> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            let shard = shard.lock();
            out.extend(shard.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

impl<K, V> std::fmt::Debug for KeyedStateStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedStateStore")
            .field("capacity", &self.capacity)
            .field("occupied", &self.occupied.load(Ordering::Relaxed))
            .field("shards", &self.shards.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_returns_previous() {
        let store = KeyedStateStore::new(8, 4, OverflowPolicy::Reject);
        assert_eq!(store.upsert(1u32, "a"), Ok(None));
        assert_eq!(store.upsert(1u32, "b"), Ok(Some("a")));
        assert_eq!(store.lookup(&1), Some("b"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_none() {
        let store: KeyedStateStore<u32, u32> = KeyedStateStore::new(4, 1, OverflowPolicy::Reject);
        assert_eq!(store.remove(&99), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_shards_never_exceed_capacity() {
        let store: KeyedStateStore<u32, u32> =
            KeyedStateStore::new(3, DEFAULT_SHARDS, OverflowPolicy::Reject);
        assert_eq!(store.shard_count(), 3);
        assert_eq!(store.capacity(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store: KeyedStateStore<u32, u32> = KeyedStateStore::new(0, 0, OverflowPolicy::Reject);
        assert_eq!(store.capacity(), 1);
        assert_eq!(store.shard_count(), 1);
    }

    #[test]
    fn test_reject_when_full() {
        let store = KeyedStateStore::new(1, 1, OverflowPolicy::Reject);
        store.upsert(1u32, 10u32).unwrap();
        assert_eq!(
            store.upsert(2, 20),
            Err(StoreError::CapacityExceeded { capacity: 1 })
        );
        // Existing keys can still be replaced
        assert_eq!(store.upsert(1, 11), Ok(Some(10)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_evict_least_recent() {
        let store = KeyedStateStore::new(2, 1, OverflowPolicy::EvictLeastRecent);
        store.upsert(1u32, 1u32).unwrap();
        store.upsert(2, 2).unwrap();
        // Touch 1 so 2 becomes the eviction candidate
        assert_eq!(store.lookup(&1), Some(1));
        store.upsert(3, 3).unwrap();

        assert_eq!(store.lookup(&2), None);
        assert_eq!(store.lookup(&1), Some(1));
        assert_eq!(store.lookup(&3), Some(3));
        assert_eq!(store.evicted(), 1);
    }

    #[test]
    fn test_capacity_law_both_policies() {
        for policy in [OverflowPolicy::Reject, OverflowPolicy::EvictLeastRecent] {
            let store = KeyedStateStore::new(10, 4, policy);
            for key in 0..1000u32 {
                let _ = store.upsert(key, key);
                assert!(store.len() <= 10);
            }
        }
    }

    #[test]
    fn test_full_only_at_table_capacity() {
        let store = KeyedStateStore::new(10_000, DEFAULT_SHARDS, OverflowPolicy::Reject);
        for key in 0..10_000u32 {
            assert_eq!(store.upsert(key, key), Ok(None), "key {} rejected early", key);
        }
        assert_eq!(store.len(), 10_000);
        assert_eq!(
            store.upsert(10_000, 0),
            Err(StoreError::CapacityExceeded { capacity: 10_000 })
        );

        // A removal frees a slot for any key, whichever shard it hashes to
        store.remove(&0);
        assert_eq!(store.upsert(20_000, 0), Ok(None));
        assert_eq!(store.len(), 10_000);
    }

    #[test]
    fn test_no_eviction_below_capacity() {
        let store = KeyedStateStore::new(64, DEFAULT_SHARDS, OverflowPolicy::EvictLeastRecent);
        for key in 0..64u32 {
            store.upsert(key, key).unwrap();
        }
        assert_eq!(store.evicted(), 0);
        assert_eq!(store.len(), 64);

        store.upsert(64, 64).unwrap();
        assert_eq!(store.evicted(), 1);
        assert_eq!(store.len(), 64);
        assert_eq!(store.entries().len(), 64);
    }

    #[test]
    fn test_evicts_from_other_shard_when_own_is_empty() {
        let store = KeyedStateStore::new(2, 2, OverflowPolicy::EvictLeastRecent);
        // Fill the table with keys from a single shard
        let first = (0..100u32).find(|k| store.shard_index(k) == 0).unwrap();
        let second = (first + 1..200u32).find(|k| store.shard_index(k) == 0).unwrap();
        let other = (0..100u32).find(|k| store.shard_index(k) == 1).unwrap();

        store.upsert(first, 1).unwrap();
        store.upsert(second, 2).unwrap();
        store.upsert(other, 3).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.evicted(), 1);
        assert_eq!(store.lookup(&first), None);
        assert_eq!(store.lookup(&other), Some(3));
    }

    #[test]
    fn test_clear_releases_slots() {
        let store = KeyedStateStore::new(4, 2, OverflowPolicy::Reject);
        for key in 0..4u32 {
            store.upsert(key, ()).unwrap();
        }
        store.clear();
        assert!(store.is_empty());
        for key in 10..14u32 {
            store.upsert(key, ()).unwrap();
        }
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_single_slot_store_keeps_one_key() {
        let store = KeyedStateStore::new(1, DEFAULT_SHARDS, OverflowPolicy::EvictLeastRecent);
        // 2 * capacity + 1 distinct keys
        for key in 0..3u32 {
            store.upsert(key, ()).unwrap();
        }
        assert_eq!(store.len(), 1);
        assert!(store.contains(&2));
    }

    #[test]
    fn test_concurrent_upserts_respect_capacity() {
        let store = KeyedStateStore::new(64, 8, OverflowPolicy::EvictLeastRecent);
        std::thread::scope(|s| {
            for t in 0..8u32 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..1000u32 {
                        store.upsert(t * 10_000 + i, i).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.len(), 64);
        assert_eq!(store.entries().len(), 64);
    }

    #[test]
    fn test_entries_and_clear() {
        let store = KeyedStateStore::new(4, 2, OverflowPolicy::Reject);
        store.upsert("a", 1).unwrap();
        store.upsert("b", 2).unwrap();
        let mut entries = store.entries();
        entries.sort();
        assert_eq!(entries, vec![("a", 1), ("b", 2)]);
        store.clear();
        assert!(store.is_empty());
    }
}
