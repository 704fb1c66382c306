// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use flightgroup::FlightGroup;

use crate::{ByteView, CacheStats, Error, Getter, PeerGetter, PeerPicker, PeerRequest, Result, SharedCache};

/// Counters describing the traffic a [`Group`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct GroupStats {
    /// Calls to [`Group::get`] with a non-empty key.
    pub gets: u64,
    /// Lookups answered by the local cache, including re-checks inside a load.
    pub cache_hits: u64,
    /// Values successfully fetched from a peer.
    pub peer_loads: u64,
    /// Failed peer fetches, each followed by a local load.
    pub peer_errors: u64,
    /// Cache misses that entered a load, deduplicated or not.
    pub loads: u64,
    /// Loads that actually ran after duplicate suppression.
    pub loads_deduped: u64,
    /// Values successfully produced by the origin.
    pub local_loads: u64,
    /// Failed origin loads.
    pub local_load_errs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    fn snapshot(&self) -> GroupStats {
        GroupStats {
            gets: self.gets.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            loads_deduped: self.loads_deduped.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errs: self.local_load_errs.load(Ordering::Relaxed),
        }
    }
}

/// A named, read-through cache namespace.
///
/// A group answers [`get`](Self::get) from its local cache when it can. On a miss it loads the
/// value exactly once no matter how many threads ask concurrently: from the peer owning the key
/// if a [`PeerPicker`] is registered and names one, from the origin [`Getter`] otherwise. Values
/// loaded from the origin are cached locally. Values loaded from a peer are not, since the peer
/// that owns them caches them.
///
/// A peer that fails is logged and the key is loaded from the origin instead, so peer outages
/// degrade to local loads rather than errors.
///
/// Groups are usually created and looked up through a [`Registry`](crate::Registry).
///
/// # Examples
///
/// ```
/// use peercache::{Group, getter_fn};
///
/// let group = Group::builder("users")
///     .cache_bytes(1 << 20)
///     .getter(getter_fn(|key| Ok(format!("profile of {key}").into_bytes())))
///     .build();
///
/// let value = group.get("alice")?;
/// assert_eq!(value, "profile of alice");
/// # Ok::<(), peercache::Error>(())
/// ```
pub struct Group {
    name: String,
    getter: Box<dyn Getter>,
    picker: OnceLock<Arc<dyn PeerPicker>>,
    cache: SharedCache,
    flights: FlightGroup<String, Result<ByteView>>,
    counters: Counters,
}

impl Group {
    /// Starts building a group named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder::new(name)
    }

    /// Returns the name of the group.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyKey`] if `key` is empty.
    /// - [`Error::Origin`] if the value had to be loaded locally and the origin failed.
    /// - [`Error::Aborted`] if the load panicked.
    ///
    /// Every caller that waited on the same load receives the same error.
    pub fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        bump(&self.counters.gets);

        if let Some(value) = self.cache.get(key) {
            bump(&self.counters.cache_hits);
            tracing::event!(name: "peercache.hit", tracing::Level::DEBUG, group.name = %self.name, key, "cache hit");
            return Ok(value);
        }

        self.load(key)
    }

    /// Attaches the strategy locating the peer that owns a key.
    ///
    /// # Panics
    ///
    /// Panics if a picker is already attached.
    #[expect(clippy::panic, reason = "attaching a second picker is a wiring bug")]
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) {
        if self.picker.set(picker).is_err() {
            panic!("peers of group {:?} registered more than once", self.name);
        }
    }

    /// Returns the traffic counters.
    #[must_use]
    pub fn stats(&self) -> GroupStats {
        self.counters.snapshot()
    }

    /// Returns the occupancy and counters of the local cache.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn load(&self, key: &str) -> Result<ByteView> {
        bump(&self.counters.loads);

        self.flights
            .work(key.to_string(), || {
                // The flight before this one may have filled the cache in the meantime.
                if let Some(value) = self.cache.get(key) {
                    bump(&self.counters.cache_hits);
                    return Ok(value);
                }
                bump(&self.counters.loads_deduped);

                if let Some(peer) = self.picker.get().and_then(|picker| picker.pick_peer(key)) {
                    match self.get_from_peer(peer.as_ref(), key) {
                        Ok(value) => {
                            bump(&self.counters.peer_loads);
                            return Ok(value);
                        }
                        Err(error) => {
                            bump(&self.counters.peer_errors);
                            tracing::event!(
                                name: "peercache.peer_error",
                                tracing::Level::WARN,
                                group.name = %self.name,
                                key,
                                error = &error as &dyn std::error::Error,
                                "peer failed, loading locally",
                            );
                        }
                    }
                }

                self.get_locally(key)
            })
            .into_outcome()
            .unwrap_or_else(|panicked| Err(Error::aborted(key, &panicked)))
    }

    fn get_locally(&self, key: &str) -> Result<ByteView> {
        match self.getter.get(key) {
            Ok(bytes) => {
                bump(&self.counters.local_loads);
                let value = ByteView::from(bytes);
                self.populate_cache(key, value.clone());
                Ok(value)
            }
            Err(source) => {
                bump(&self.counters.local_load_errs);
                Err(Error::origin(key, source))
            }
        }
    }

    fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let request = PeerRequest {
            group: self.name.clone(),
            key: key.to_string(),
        };
        let response = peer.get(&request).map_err(|source| Error::peer(key, source))?;
        Ok(ByteView::from(response.value))
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.cache.add(key, value);
        tracing::event!(name: "peercache.populate", tracing::Level::DEBUG, group.name = %self.name, key, "cached origin value");
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .field("has_peers", &self.picker.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Group`].
///
/// The origin [`Getter`] is mandatory. The byte budget defaults to zero, which means unbounded.
pub struct GroupBuilder {
    name: String,
    cache_bytes: usize,
    getter: Option<Box<dyn Getter>>,
    picker: Option<Arc<dyn PeerPicker>>,
}

impl GroupBuilder {
    /// Starts building a group named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache_bytes: 0,
            getter: None,
            picker: None,
        }
    }

    /// Sets the byte budget of the local cache, counting key and value lengths.
    #[must_use]
    pub fn cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }

    /// Sets the origin the group loads missing values from.
    #[must_use]
    pub fn getter(mut self, getter: impl Getter + 'static) -> Self {
        self.getter = Some(Box::new(getter));
        self
    }

    /// Attaches a peer picker right away, instead of calling [`Group::register_peers`] later.
    #[must_use]
    pub fn peer_picker(mut self, picker: Arc<dyn PeerPicker>) -> Self {
        self.picker = Some(picker);
        self
    }

    /// Builds the group.
    ///
    /// # Panics
    ///
    /// Panics if no origin getter was set.
    #[must_use]
    #[expect(clippy::panic, reason = "a group without an origin is a wiring bug")]
    pub fn build(self) -> Group {
        let Some(getter) = self.getter else {
            panic!("group {:?} has no origin getter", self.name);
        };

        let picker = OnceLock::new();
        if let Some(peers) = self.picker {
            let _ = picker.set(peers);
        }

        Group {
            name: self.name,
            getter,
            picker,
            cache: SharedCache::new(self.cache_bytes),
            flights: FlightGroup::new(),
            counters: Counters::default(),
        }
    }
}

impl fmt::Debug for GroupBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupBuilder")
            .field("name", &self.name)
            .field("cache_bytes", &self.cache_bytes)
            .field("has_getter", &self.getter.is_some())
            .field("has_peers", &self.picker.is_some())
            .finish()
    }
}
