//! Sharded, strict-LRU cache.
//!
//! Both hot-path caches — open tables keyed by file number, and decoded
//! data blocks keyed by `(cache_id, block_offset)` — are instances of
//! [`ShardedCache`]. Entries carry a *charge* (bytes, or 1 for
//! unit-counted caches) and the cache evicts in strict
//! least-recently-used order once the total charge exceeds capacity.
//!
//! Values are handed out as `Arc` handles: eviction only drops the
//! cache's reference, so an entry pinned by an in-flight reader stays
//! alive until the last handle is released.
//!
//! The key space is split across 16 shards by hash; each shard has its
//! own mutex, keeping contention low under concurrent reads.

#[cfg(test)]
mod tests;

pub mod table_cache;

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

const SHARD_BITS: u32 = 4;
const NUM_SHARDS: usize = 1 << SHARD_BITS;

struct Entry<V> {
    value: Arc<V>,
    charge: usize,
    /// Recency stamp; larger means more recently used.
    tick: u64,
}

struct Shard<K, V> {
    capacity: usize,
    usage: usize,
    next_tick: u64,
    map: HashMap<K, Entry<V>>,
    /// Recency order: tick → key. The smallest tick is the LRU victim.
    lru: BTreeMap<u64, K>,
}

impl<K: Hash + Eq + Clone, V> Shard<K, V> {
    fn new(capacity: usize) -> Self {
        Shard {
            capacity,
            usage: 0,
            next_tick: 0,
            map: HashMap::new(),
            lru: BTreeMap::new(),
        }
    }

    fn touch(&mut self, key: &K) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(entry) = self.map.get_mut(key) {
            self.lru.remove(&entry.tick);
            entry.tick = tick;
            self.lru.insert(tick, key.clone());
        }
    }

    fn lookup(&mut self, key: &K) -> Option<Arc<V>> {
        if !self.map.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.map.get(key).map(|e| Arc::clone(&e.value))
    }

    fn insert(&mut self, key: K, value: Arc<V>, charge: usize) -> Arc<V> {
        self.erase(&key);
        let tick = self.next_tick;
        self.next_tick += 1;
        self.usage += charge;
        self.lru.insert(tick, key.clone());
        self.map.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                charge,
                tick,
            },
        );
        self.evict();
        value
    }

    fn erase(&mut self, key: &K) {
        if let Some(entry) = self.map.remove(key) {
            self.lru.remove(&entry.tick);
            self.usage -= entry.charge;
        }
    }

    fn evict(&mut self) {
        while self.usage > self.capacity && self.map.len() > 1 {
            let Some((&tick, _)) = self.lru.iter().next() else { break };
            let Some(key) = self.lru.remove(&tick) else { break };
            if let Some(entry) = self.map.remove(&key) {
                self.usage -= entry.charge;
            }
        }
    }
}

/// Thread-safe LRU cache split into hash shards.
pub struct ShardedCache<K, V> {
    shards: Vec<Mutex<Shard<K, V>>>,
    next_id: AtomicU64,
}

impl<K: Hash + Eq + Clone, V> ShardedCache<K, V> {
    /// Create a cache bounded by `capacity` charge units in total.
    pub fn new(capacity: usize) -> Self {
        let per_shard = (capacity + NUM_SHARDS - 1) / NUM_SHARDS;
        ShardedCache {
            shards: (0..NUM_SHARDS)
                .map(|_| Mutex::new(Shard::new(per_shard.max(1))))
                .collect(),
            next_id: AtomicU64::new(1),
        }
    }

    fn shard(&self, key: &K) -> &Mutex<Shard<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() >> (64 - SHARD_BITS)) as usize;
        &self.shards[idx]
    }

    /// Fetch a handle for `key`, refreshing its recency.
    pub fn lookup(&self, key: &K) -> Option<Arc<V>> {
        self.shard(key).lock().lookup(key)
    }

    /// Insert (or replace) an entry and return a handle to it.
    pub fn insert(&self, key: K, value: Arc<V>, charge: usize) -> Arc<V> {
        self.shard(&key).lock().insert(key, value, charge)
    }

    /// Drop an entry if present. Outstanding handles stay alive.
    pub fn erase(&self, key: &K) {
        self.shard(key).lock().erase(key)
    }

    /// Allocate a fresh 64-bit id, used to namespace block-cache keys
    /// per table so entries never collide across files.
    pub fn new_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sum of charges currently held (for diagnostics).
    pub fn total_charge(&self) -> usize {
        self.shards.iter().map(|s| s.lock().usage).sum()
    }
}
