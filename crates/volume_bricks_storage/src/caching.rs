use crate::SmallKeyBuildHasher;

use core::hash::{BuildHasher, Hash};
use std::collections::HashMap;

/// A cache of decoded bricks that holds at most `capacity` values and evicts the Least Recently Used one to make room.
///
/// Both `get` and `insert` mark the key as most recently used. A capacity of 0 disables caching.
#[derive(Clone, Debug)]
pub struct LruCache<K, V, H> {
    store: HashMap<K, (V, usize), H>,
    order: RecencyList<K>,
    capacity: usize,
}

/// An `LruCache` using the small key hasher.
pub type BrickCache<K, V> = LruCache<K, V, SmallKeyBuildHasher>;

impl<K, V, H> LruCache<K, V, H>
where
    K: Hash + Eq,
    H: Default,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: HashMap::with_hasher(Default::default()),
            order: RecencyList::new(),
            capacity,
        }
    }
}

impl<K, V, H> LruCache<K, V, H>
where
    K: Hash + Eq + Clone,
    H: BuildHasher,
{
    /// Borrows the value for `key` and marks it as most recently used.
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Self { store, order, .. } = self;
        let (val, i) = store.get(key)?;
        order.touch(*i);

        Some(val)
    }

    /// Borrows the value for `key` without changing the LRU order.
    #[inline]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.store.get(key).map(|(val, _)| val)
    }

    /// Inserts `new_val` for `key` as the most recently used value. Returns the entry evicted to make room, if any.
    #[inline]
    pub fn insert(&mut self, key: K, new_val: V) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }
        if let Some((old_val, i)) = self.store.get_mut(&key) {
            *old_val = new_val;
            self.order.touch(*i);

            return None;
        }

        let evicted = if self.store.len() >= self.capacity {
            self.remove_lru()
        } else {
            None
        };
        let i = self.order.push_front(key.clone());
        self.store.insert(key, (new_val, i));

        evicted
    }

    /// Removes any trace of `key`.
    #[inline]
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (val, i) = self.store.remove(key)?;
        self.order.remove(i);

        Some(val)
    }

    /// Removes the least recently used value.
    #[inline]
    pub fn remove_lru(&mut self) -> Option<(K, V)> {
        let key = self.order.pop_back()?;
        let (val, _) = self.store.remove(&key)?;

        Some((key, val))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.store.clear();
        self.order.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Keys from most to least recently used, as a doubly linked list over a `Vec` of slots. Slot indices stay valid until the
/// key is removed, so the map can store them.
#[derive(Clone, Debug)]
struct RecencyList<T> {
    slots: Vec<Slot<T>>,
}

#[derive(Clone, Debug)]
struct Slot<T> {
    key: Option<T>,
    newer: usize,
    older: usize,
}

// Slot 0 anchors the ring of unused slots and slot 1 the ring of used ones. `newer` of the used anchor is the least
// recently used key, `older` the most recently used one.
const UNUSED: usize = 0;
const USED: usize = 1;

impl<T> RecencyList<T> {
    fn new() -> Self {
        let mut list = Self { slots: Vec::new() };
        list.clear();

        list
    }

    fn detach(&mut self, i: usize) {
        let Slot { newer, older, .. } = self.slots[i];
        self.slots[newer].older = older;
        self.slots[older].newer = newer;
    }

    /// Links `i` right after `anchor`, which makes it the most recent entry of that ring.
    fn attach_front(&mut self, i: usize, anchor: usize) {
        let first = self.slots[anchor].older;
        self.slots[i].newer = anchor;
        self.slots[i].older = first;
        self.slots[anchor].older = i;
        self.slots[first].newer = i;
    }

    fn touch(&mut self, i: usize) {
        self.detach(i);
        self.attach_front(i, USED);
    }

    fn push_front(&mut self, key: T) -> usize {
        let i = if self.slots[UNUSED].older == UNUSED {
            self.slots.push(Slot {
                key: None,
                newer: UNUSED,
                older: UNUSED,
            });
            self.slots.len() - 1
        } else {
            let i = self.slots[UNUSED].older;
            self.detach(i);
            i
        };
        self.slots[i].key = Some(key);
        self.attach_front(i, USED);

        i
    }

    fn remove(&mut self, i: usize) -> Option<T> {
        self.detach(i);
        self.attach_front(i, UNUSED);

        self.slots[i].key.take()
    }

    fn pop_back(&mut self) -> Option<T> {
        match self.slots[USED].newer {
            USED => None,
            oldest => self.remove(oldest),
        }
    }

    fn clear(&mut self) {
        self.slots.clear();
        for anchor in [UNUSED, USED].iter() {
            self.slots.push(Slot {
                key: None,
                newer: *anchor,
                older: *anchor,
            });
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache: BrickCache<i32, i32> = BrickCache::with_capacity(3);

        assert_eq!(cache.insert(1, 2), None);
        assert_eq!(cache.insert(2, 3), None);
        assert_eq!(cache.insert(3, 4), None);
        cache.get(&1);

        assert_eq!(cache.insert(4, 5), Some((2, 3)));
        assert_eq!(cache.insert(5, 6), Some((3, 4)));
        assert_eq!(cache.peek(&1), Some(&2));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn peek_does_not_affect_lru_order() {
        let mut cache: BrickCache<i32, i32> = BrickCache::with_capacity(2);

        cache.insert(1, 2);
        cache.insert(2, 3);
        cache.peek(&1);

        assert_eq!(cache.remove_lru(), Some((1, 2)));
        assert_eq!(cache.remove_lru(), Some((2, 3)));
        assert_eq!(cache.remove_lru(), None);
    }

    #[test]
    fn reinserting_replaces_value() {
        let mut cache: BrickCache<i32, i32> = BrickCache::with_capacity(2);

        cache.insert(1, 2);
        cache.insert(2, 3);
        assert_eq!(cache.insert(1, 7), None);

        assert_eq!(cache.remove_lru(), Some((2, 3)));
        assert_eq!(cache.get(&1), Some(&7));
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut cache: BrickCache<i32, i32> = BrickCache::with_capacity(2);

        cache.insert(1, 2);
        assert_eq!(cache.remove(&1), Some(2));
        assert!(cache.is_empty());
        cache.insert(3, 4);

        assert_eq!(cache.order.slots.len(), 3);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let mut cache: BrickCache<i32, i32> = BrickCache::with_capacity(0);

        assert_eq!(cache.insert(1, 2), None);
        assert_eq!(cache.get(&1), None);
    }
}
