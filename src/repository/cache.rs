//! Reference-counted request cache
//!
//! Keeps recently fetched payloads alive between cycles. Values are handed
//! out as `Arc` clones; an entry that still has clones outside the cache is
//! attached to the visible scene and must not be evicted, so cleanup only
//! considers entries whose only owner is the cache itself.

use std::hash::Hash;
use std::sync::Arc;

use rustc_hash::FxHashMap;

#[derive(Debug)]
struct CacheEntry<T> {
    value: Arc<T>,
    last_use: u64,
}

#[derive(Debug)]
pub struct MemoryRequestCache<K, T> {
    entries: FxHashMap<K, CacheEntry<T>>,
    capacity: usize,
    clock: u64,
}

impl<K: Eq + Hash + Clone, T> MemoryRequestCache<K, T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<Arc<T>> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|entry| {
            entry.last_use = clock;
            Arc::clone(&entry.value)
        })
    }

    /// Inserts unconditionally, then shrinks back to capacity if possible.
    /// The fresh entry is never a cleanup candidate, it would otherwise be
    /// the only unreferenced one when everything else is held by the scene.
    pub fn insert(&mut self, key: K, value: Arc<T>) {
        self.clock += 1;
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                last_use: self.clock,
            },
        );
        self.cleanup(Some(&key));
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.cleanup(None);
    }

    /// Evicts least-recently-used entries until back under capacity, skipping
    /// every entry that is still referenced outside the cache and the
    /// `protected` key.
    fn cleanup(&mut self, protected: Option<&K>) {
        if self.entries.len() <= self.capacity {
            return;
        }
        let mut evictable: Vec<(K, u64)> = self
            .entries
            .iter()
            .filter(|(key, entry)| {
                Arc::strong_count(&entry.value) == 1 && Some(*key) != protected
            })
            .map(|(key, entry)| (key.clone(), entry.last_use))
            .collect();
        evictable.sort_by_key(|(_, last_use)| *last_use);

        let excess = self.entries.len() - self.capacity;
        for (key, _) in evictable.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        if self.entries.len() > self.capacity {
            log::debug!(
                "[repository::cache] over capacity ({} > {}) but remaining entries are referenced",
                self.entries.len(),
                self.capacity
            );
        }
    }
}
