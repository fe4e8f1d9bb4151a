//! Capacity-bounded least-recently-used cache.
//!
//! Entries are evicted once the cache holds `capacity` keys, so memory stays
//! bounded no matter how many distinct keys callers use.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A least-recently-used cache holding at most `capacity` entries.
///
/// Recency is tracked in a queue that is compacted lazily; lookups and
/// inserts are amortised `O(1)` for the small capacities used here.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: VecDeque<(K, u64)>,
    tick: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries. A capacity of zero
    /// stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: HashMap::new(), order: VecDeque::new(), tick: 0 }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value, marking it as most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let (value, stamp) = self.entries.get_mut(key)?;
        *stamp = tick;
        let value = value.clone();
        self.order.push_back((key.clone(), tick));
        self.compact();
        Some(value)
    }

    /// Insert or replace a value, evicting the least recently used entry
    /// when full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let tick = self.next_tick();
        if self.entries.insert(key.clone(), (value, tick)).is_none() {
            while self.entries.len() > self.capacity {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        self.order.push_back((key, tick));
        self.compact();
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((key, stamp)) = self.order.pop_front() {
            // Stale queue entries refer to keys touched again later.
            if self.entries.get(&key).is_some_and(|(_, current)| *current == stamp) {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact(&mut self) {
        if self.order.len() <= self.capacity.saturating_mul(4).max(16) {
            return;
        }
        let entries = &self.entries;
        self.order.retain(|(key, stamp)| entries.get(key).is_some_and(|(_, current)| current == stamp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = BoundedCache::new(0);
        cache.insert("a", 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn stays_bounded_under_many_distinct_keys() {
        let mut cache = BoundedCache::new(8);
        for i in 0..10_000 {
            cache.insert(i, i * 2);
            let _ = cache.get(&(i / 2));
        }
        assert_eq!(cache.len(), 8);
        assert!(cache.order.len() <= 32);
        assert_eq!(cache.get(&9_999), Some(19_998));
    }
}
