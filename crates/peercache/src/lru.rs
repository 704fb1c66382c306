// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Weight-bounded least-recently-used store.
//!
//! Entries live in a dense vector threaded into a doubly-linked recency list by index. The map only
//! stores slot indices, so moving an entry to the front never touches the map. Removal swaps the
//! last slot into the hole and patches the moved entry's neighbors and map slot.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

use hashbrown::HashMap;

const NIL: usize = usize::MAX;

/// Computes how much of the budget an entry consumes.
pub trait Weigher<K, V> {
    /// Returns the weight of the entry.
    fn weigh(&self, key: &K, value: &V) -> usize;
}

/// Every entry weighs one, turning the budget into an entry count.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unit;

impl<K, V> Weigher<K, V> for Unit {
    fn weigh(&self, _key: &K, _value: &V) -> usize {
        1
    }
}

/// An entry weighs the byte length of its key plus the byte length of its value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteWeigher;

impl<K: AsRef<[u8]>, V: AsRef<[u8]>> Weigher<K, V> for ByteWeigher {
    fn weigh(&self, key: &K, value: &V) -> usize {
        key.as_ref().len() + value.as_ref().len()
    }
}

impl<K, V, F> Weigher<K, V> for F
where
    F: Fn(&K, &V) -> usize,
{
    fn weigh(&self, key: &K, value: &V) -> usize {
        self(key, value)
    }
}

type OnEvict<K, V> = Box<dyn FnMut(K, V) + Send>;

struct Node<K, V> {
    key: K,
    value: V,
    weight: usize,
    prev: usize,
    next: usize,
}

/// A least-recently-used store bounded by total entry weight.
///
/// After every operation returns, the summed weight of all entries is at most
/// [`capacity`](Self::capacity), unless the capacity is zero, which means unbounded. When an insert
/// pushes the total over the budget, entries are evicted oldest first until it fits again. An
/// entry heavier than the entire budget is therefore evicted right after it was inserted.
///
/// The store is not synchronized: every operation that can change recency, [`get`](Self::get)
/// included, takes `&mut self`. Wrap it in a lock to share it, see [`SharedCache`](crate::SharedCache).
///
/// # Examples
///
/// ```
/// use peercache::LruCache;
///
/// let mut cache = LruCache::new(2);
/// cache.add("a", 1);
/// cache.add("b", 2);
/// assert_eq!(cache.get("a"), Some(&1));
///
/// // "b" is now the least recently used entry.
/// cache.add("c", 3);
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.len(), 2);
/// ```
pub struct LruCache<K, V, W = Unit> {
    map: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    weight: usize,
    capacity: usize,
    weigher: W,
    on_evict: Option<OnEvict<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates a store holding at most `capacity` entries. Zero means unbounded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_weigher(capacity, Unit)
    }
}

impl<K, V, W> LruCache<K, V, W>
where
    K: Hash + Eq + Clone,
    W: Weigher<K, V>,
{
    /// Creates a store whose entries are weighed by `weigher` against a budget of `capacity`.
    ///
    /// Zero means unbounded.
    #[must_use]
    pub fn with_weigher(capacity: usize, weigher: W) -> Self {
        Self {
            map: HashMap::new(),
            nodes: Vec::new(),
            head: NIL,
            tail: NIL,
            weight: 0,
            capacity,
            weigher,
            on_evict: None,
        }
    }

    /// Installs an observer that receives every entry leaving the store through eviction,
    /// [`remove`](Self::remove), [`remove_oldest`](Self::remove_oldest) or [`clear`](Self::clear).
    ///
    /// Replacing the value of an existing key does not notify the observer.
    #[must_use]
    pub fn on_evict(mut self, observer: impl FnMut(K, V) + Send + 'static) -> Self {
        self.on_evict = Some(Box::new(observer));
        self
    }

    /// Inserts or replaces the value for `key` and marks it most recently used.
    ///
    /// Evicts the least recently used entries while the budget is exceeded.
    pub fn add(&mut self, key: K, value: V) {
        let weight = self.weigher.weigh(&key, &value);

        if let Some(&idx) = self.map.get(&key) {
            let node = &mut self.nodes[idx];
            self.weight = self.weight - node.weight + weight;
            node.value = value;
            node.weight = weight;
            self.detach(idx);
            self.push_front(idx);
        } else {
            let idx = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                weight,
                prev: NIL,
                next: NIL,
            });
            self.map.insert(key, idx);
            self.push_front(idx);
            self.weight += weight;
        }

        while self.capacity > 0 && self.weight > self.capacity {
            if !self.remove_oldest() {
                break;
            }
        }
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        if self.head != idx {
            self.detach(idx);
            self.push_front(idx);
        }
        Some(&self.nodes[idx].value)
    }

    /// Returns the value for `key` without changing its recency.
    #[must_use]
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|&idx| &self.nodes[idx].value)
    }

    /// Returns `true` if `key` is present, without changing its recency.
    #[must_use]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Removes `key`, notifying the eviction observer. Returns `true` if the key was present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.map.get(key) {
            Some(&idx) => {
                self.evict(idx);
                true
            }
            None => false,
        }
    }

    /// Evicts the least recently used entry. Returns `false` if the store was empty.
    pub fn remove_oldest(&mut self) -> bool {
        if self.tail == NIL {
            return false;
        }
        self.evict(self.tail);
        true
    }

    /// Evicts every entry, notifying the observer for each, oldest first.
    pub fn clear(&mut self) {
        while self.remove_oldest() {}
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the summed weight of all entries.
    #[must_use]
    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Returns the weight budget. Zero means unbounded.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over the keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        let mut idx = self.head;
        std::iter::from_fn(move || {
            let node = self.nodes.get(idx)?;
            idx = node.next;
            Some(&node.key)
        })
    }

    fn evict(&mut self, idx: usize) {
        let (key, value) = self.take(idx);
        if let Some(observer) = self.on_evict.as_mut() {
            observer(key, value);
        }
    }

    fn take(&mut self, idx: usize) -> (K, V) {
        self.detach(idx);
        let node = self.nodes.swap_remove(idx);
        self.map.remove(&node.key);
        self.weight -= node.weight;

        // The former last slot now lives at `idx`.
        if let Some(moved) = self.nodes.get(idx) {
            let (prev, next) = (moved.prev, moved.next);
            if let Some(slot) = self.map.get_mut(&moved.key) {
                *slot = idx;
            }
            self.link(prev, idx, next);
        }

        (node.key, node.value)
    }

    /// Points the neighbors of `idx` back at it after it changed slots.
    fn link(&mut self, prev: usize, idx: usize, next: usize) {
        if prev == NIL {
            self.head = idx;
        } else {
            self.nodes[prev].next = idx;
        }
        if next == NIL {
            self.tail = idx;
        } else {
            self.nodes[next].prev = idx;
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = self.head;
        if self.head == NIL {
            self.tail = idx;
        } else {
            self.nodes[self.head].prev = idx;
        }
        self.head = idx;
    }
}

impl<K, V, W> fmt::Debug for LruCache<K, V, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.nodes.len())
            .field("weight", &self.weight)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder<K: Send + 'static, V: Send + 'static>() -> (Arc<Mutex<Vec<(K, V)>>>, impl FnMut(K, V) + Send + 'static) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        (evicted, move |k, v| sink.lock().unwrap().push((k, v)))
    }

    #[test]
    fn get_after_add_returns_latest_value() {
        let mut cache = LruCache::new(0);
        cache.add("k", 1);
        cache.add("k", 2);
        assert_eq!(cache.get("k"), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn miss_returns_none() {
        let mut cache: LruCache<String, u32> = LruCache::new(4);
        assert_eq!(cache.get("absent"), None);
        assert!(!cache.remove("absent"));
    }

    #[test]
    fn get_refreshes_recency() {
        let (evicted, observer) = recorder();
        let mut cache = LruCache::new(2).on_evict(observer);
        cache.add("a", 1);
        cache.add("b", 2);
        assert_eq!(cache.get("a"), Some(&1));
        cache.add("c", 3);

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(&1));
        assert_eq!(cache.get("c"), Some(&3));
        assert_eq!(*evicted.lock().unwrap(), vec![("b", 2)]);
    }

    #[test]
    fn peek_does_not_refresh_recency() {
        let mut cache = LruCache::new(2);
        cache.add("a", 1);
        cache.add("b", 2);
        assert_eq!(cache.peek("a"), Some(&1));
        cache.add("c", 3);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
    }

    #[test]
    fn eviction_follows_exact_lru_order() {
        let (evicted, observer) = recorder();
        let mut cache = LruCache::new(3).on_evict(observer);
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            cache.add(key, i);
        }
        cache.get("a");
        cache.add("b", 10);
        cache.add("d", 3);
        cache.add("e", 4);

        assert_eq!(*evicted.lock().unwrap(), vec![("c", 2), ("a", 0)]);
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec!["e", "d", "b"]);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut cache = LruCache::new(5);
        for i in 0..100 {
            cache.add(i, i * 2);
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec![99, 98, 97, 96, 95]);
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let mut cache = LruCache::new(0);
        for i in 0..1_000 {
            cache.add(i, ());
        }
        assert_eq!(cache.len(), 1_000);
    }

    #[test]
    fn byte_weigher_counts_key_and_value() {
        let mut cache = LruCache::with_weigher(10, ByteWeigher);
        cache.add("ab", b"cde".to_vec());
        assert_eq!(cache.weight(), 5);
        cache.add("fg", b"hij".to_vec());
        assert_eq!(cache.weight(), 10);

        cache.add("k", b"l".to_vec());
        assert_eq!(cache.weight(), 7);
        assert!(!cache.contains("ab"));
    }

    #[test]
    fn replacing_a_value_reweighs_the_entry() {
        let mut cache = LruCache::with_weigher(10, ByteWeigher);
        cache.add("a", b"1".to_vec());
        cache.add("b", b"2".to_vec());
        cache.add("a", b"12345678".to_vec());

        // "a" now weighs 9 and is the most recent entry, so "b" has to go.
        assert_eq!(cache.weight(), 9);
        assert!(!cache.contains("b"));
        assert_eq!(cache.peek("a").map(Vec::len), Some(8));
    }

    #[test]
    fn oversized_entry_evicts_itself() {
        let (evicted, observer) = recorder();
        let mut cache = LruCache::with_weigher(4, ByteWeigher).on_evict(observer);
        cache.add("big".to_string(), b"value".to_vec());

        assert!(cache.is_empty());
        assert_eq!(cache.weight(), 0);
        assert_eq!(*evicted.lock().unwrap(), vec![("big".to_string(), b"value".to_vec())]);
    }

    #[test]
    fn closure_weigher() {
        let mut cache = LruCache::with_weigher(10, |_: &&str, v: &usize| *v);
        cache.add("a", 6);
        cache.add("b", 5);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.weight(), 5);
    }

    #[test]
    fn remove_notifies_observer() {
        let (evicted, observer) = recorder();
        let mut cache = LruCache::new(0).on_evict(observer);
        cache.add("a", 1);
        cache.add("b", 2);
        cache.add("c", 3);

        assert!(cache.remove("b"));
        assert!(!cache.remove("b"));
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec!["c", "a"]);
        assert_eq!(*evicted.lock().unwrap(), vec![("b", 2)]);
    }

    #[test]
    fn remove_oldest_on_empty_store_is_noop() {
        let mut cache: LruCache<&str, u8> = LruCache::new(1);
        assert!(!cache.remove_oldest());
        cache.add("a", 1);
        assert!(cache.remove_oldest());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_notifies_observer_for_every_entry() {
        let (evicted, observer) = recorder();
        let mut cache = LruCache::new(0).on_evict(observer);
        cache.add("a", 1);
        cache.add("b", 2);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.weight(), 0);
        assert_eq!(*evicted.lock().unwrap(), vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn index_stays_consistent_under_churn() {
        let mut cache = LruCache::new(16);
        for i in 0_u32..2_000 {
            cache.add(i % 37, i);
            if i % 5 == 0 {
                cache.remove(&(i % 11));
            }
            if i % 7 == 0 {
                cache.get(&(i % 13));
            }

            let keys: Vec<_> = cache.keys().copied().collect();
            assert_eq!(keys.len(), cache.len());
            for key in keys {
                assert!(cache.contains(&key));
            }
        }
    }

    #[test]
    fn debug_reports_occupancy() {
        let mut cache = LruCache::new(3);
        cache.add(1, 1);
        let debug_str = format!("{cache:?}");
        assert!(debug_str.contains("len: 1"));
        assert!(debug_str.contains("capacity: 3"));
    }
}
