use parking_lot::Mutex;
use std::collections::VecDeque;

/// Small thread-safe LRU. Entries are kept least- to most-recently used;
/// inserting past capacity evicts the front.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: Mutex<VecDeque<(K, V)>>,
}

impl<K: PartialEq + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Look up and mark as most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|(k, _)| k == key)?;
        let entry = entries.remove(pos)?;
        let value = entry.1.clone();
        entries.push_back(entry);
        Some(value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().iter().any(|(k, _)| k == key)
    }

    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|(k, _)| *k == key) {
            entries.remove(pos);
        } else if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back((key, value));
    }

    /// Cached value, or compute it without holding the lock and store it.
    /// Concurrent misses on the same key may both compute; the last insert wins.
    pub fn get_or_insert_with<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
