//! Bounded table of per-key mutexes
//!
//! Keys are dynamic (one per source/destination pair), so the table evicts
//! least recently used entries once it exceeds its capacity. Only entries
//! nobody currently holds a handle to are evicted; a busy table may
//! temporarily exceed the capacity.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

pub struct BoundedLockTable<K> {
    capacity: usize,
    inner: Mutex<TableInner<K>>,
}

struct TableInner<K> {
    locks: HashMap<K, Arc<Mutex<()>>>,
    /// Front = least recently used
    recency: VecDeque<K>,
}

impl<K> BoundedLockTable<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(TableInner {
                locks: HashMap::new(),
                recency: VecDeque::new(),
            }),
        }
    }

    /// Mutex for `key`, created on first use
    ///
    /// Callers lock the returned mutex themselves; the table lock is only
    /// held while looking up.
    pub fn get(&self, key: &K) -> Arc<Mutex<()>> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = inner.locks.get(key).cloned() {
            if let Some(pos) = inner.recency.iter().position(|k| k == key) {
                inner.recency.remove(pos);
            }
            inner.recency.push_back(key.clone());
            return lock;
        }

        let lock = Arc::new(Mutex::new(()));
        inner.locks.insert(key.clone(), Arc::clone(&lock));
        inner.recency.push_back(key.clone());
        inner.evict(self.capacity);
        lock
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .locks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K> TableInner<K>
where
    K: Eq + Hash + Clone,
{
    fn evict(&mut self, capacity: usize) {
        let mut index = 0;
        while self.locks.len() > capacity && index < self.recency.len() {
            let idle = self
                .locks
                .get(&self.recency[index])
                .map(|lock| Arc::strong_count(lock) == 1)
                .unwrap_or(true);
            if idle {
                if let Some(key) = self.recency.remove(index) {
                    self.locks.remove(&key);
                }
            } else {
                index += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_shares_mutex() {
        let table = BoundedLockTable::new(4);
        let a = table.get(&"a");
        let b = table.get(&"a");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_idle_entries_evicted_lru_first() {
        let table = BoundedLockTable::new(2);
        drop(table.get(&1));
        drop(table.get(&2));
        drop(table.get(&1)); // 2 is now least recently used
        drop(table.get(&3));

        assert_eq!(table.len(), 2);
        let inner = table.inner.lock().unwrap();
        assert!(inner.locks.contains_key(&1));
        assert!(inner.locks.contains_key(&3));
        assert!(!inner.locks.contains_key(&2));
    }

    #[test]
    fn test_held_entries_are_not_evicted() {
        let table = BoundedLockTable::new(1);
        let held = table.get(&"busy");
        let _guard = held.lock().unwrap();
        let other = table.get(&"other");

        // Over capacity while "busy" is referenced
        assert_eq!(table.len(), 2);
        assert!(Arc::ptr_eq(&held, &table.get(&"busy")));
        drop(other);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let table: BoundedLockTable<u8> = BoundedLockTable::new(0);
        assert_eq!(table.capacity(), 1);
    }
}
