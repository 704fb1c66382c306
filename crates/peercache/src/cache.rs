// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::ByteView;
use crate::lru::{ByteWeigher, LruCache};

type Store = LruCache<String, ByteView, ByteWeigher>;

/// A point-in-time snapshot of a [`SharedCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CacheStats {
    /// Bytes held, counting key and value lengths.
    pub bytes: usize,
    /// Entries held.
    pub items: usize,
    /// Lookups served, hits and misses alike.
    pub gets: u64,
    /// Lookups that found a value.
    pub hits: u64,
    /// Entries dropped to stay within the byte budget.
    pub evictions: u64,
}

/// A byte-budgeted LRU store of [`ByteView`]s that many threads can use at once.
///
/// The underlying [`LruCache`] is only allocated by the first [`add`](Self::add). Every
/// operation holds the lock for the duration of the wrapped store operation and nothing else.
pub struct SharedCache {
    capacity: usize,
    store: Mutex<Option<Store>>,
    gets: AtomicU64,
    hits: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl SharedCache {
    /// Creates a cache holding at most `capacity` bytes of keys and values. Zero means unbounded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            store: Mutex::new(None),
            gets: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stores `value` under `key`, evicting older entries if the budget is exceeded.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut store = self.store.lock();
        store
            .get_or_insert_with(|| {
                let evictions = Arc::clone(&self.evictions);
                LruCache::with_weigher(self.capacity, ByteWeigher).on_evict(move |_, _| {
                    evictions.fetch_add(1, Ordering::Relaxed);
                })
            })
            .add(key.to_string(), value);
    }

    /// Returns the view stored under `key`, marking it most recently used.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let value = self.store.lock().as_mut().and_then(|store| store.get(key).cloned());
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Returns the byte budget. Zero means unbounded.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes a snapshot of the cache's occupancy and counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (bytes, items) = self
            .store
            .lock()
            .as_ref()
            .map_or((0, 0), |store| (store.weight(), store.len()));

        CacheStats {
            bytes,
            items,
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
