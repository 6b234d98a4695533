//! In-process FIFO cache for LLM analyses (capacity 100). Evicts the oldest
//! insertion regardless of access pattern — not LRU — per the spec's
//! "cached in-process only (capacity 100, FIFO)".

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;

struct Inner<K, V> {
    order: VecDeque<K>,
    values: HashMap<K, V>,
}

pub struct AnalysisCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> AnalysisCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                order: VecDeque::with_capacity(capacity),
                values: HashMap::with_capacity(capacity),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().values.get(key).cloned()
    }

    /// Insert, evicting the oldest entry if at capacity. Re-inserting an
    /// existing key updates its value but does not move it in FIFO order.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        if inner.values.contains_key(&key) {
            inner.values.insert(key, value);
            return;
        }

        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.values.remove(&oldest);
            }
        }
        inner.order.push_back(key.clone());
        inner.values.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_insertion_past_capacity() {
        let cache: AnalysisCache<i32, &str> = AnalysisCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");

        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("b"));
        assert_eq!(cache.get(&3), Some("c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn updating_existing_key_does_not_change_eviction_order() {
        let cache: AnalysisCache<i32, &str> = AnalysisCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(1, "a-updated");
        cache.insert(3, "c");

        // 1 was the oldest insertion still, so it's evicted despite the update.
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("b"));
        assert_eq!(cache.get(&3), Some("c"));
    }

    #[test]
    fn capacity_one_hundred_matches_spec() {
        let cache: AnalysisCache<i32, i32> = AnalysisCache::new(100);
        for i in 0..150 {
            cache.insert(i, i);
        }
        assert_eq!(cache.len(), 100);
        assert_eq!(cache.get(&0), None);
        assert_eq!(cache.get(&149), Some(149));
    }
}
