// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A read-through cache distributed over a cluster of peer nodes.
//!
//! Every node runs the same set of named [`Group`]s. A group owns a local, byte-budgeted LRU
//! cache and an origin [`Getter`] that knows how to produce a value when no cache has it. Keys are
//! spread over the nodes with a consistent-hash ring: each key has exactly one owning node, and
//! a node that misses on a key it does not own asks the owner instead of the origin.
//!
//! # Read Path
//!
//! [`Group::get`] answers from the local cache when it can. On a miss, concurrent callers for the
//! same key are collapsed into a single load by a [`flightgroup::FlightGroup`], so a request storm
//! on a cold key reaches the origin once. The load then:
//!
//! 1. asks the registered [`PeerPicker`] which node owns the key,
//! 2. fetches the value from that node through its [`PeerGetter`] if it is a remote node,
//! 3. falls back to the local [`Getter`] if the key is local, no picker is registered, or the
//!    peer fails, and caches what the origin returned.
//!
//! Values are handed out as [`ByteView`]s, cheap to clone and immutable.
//!
//! # Example
//!
//! ```
//! use peercache::{Registry, getter_fn};
//!
//! let registry = Registry::new();
//! registry.new_group("squares", 64 << 20, getter_fn(|key| {
//!     let n: u64 = key.parse()?;
//!     Ok((n * n).to_string().into_bytes())
//! }));
//!
//! let group = registry.group("squares").unwrap();
//! assert_eq!(group.get("12")?, "144");
//! assert!(group.get("twelve").is_err());
//! # Ok::<(), peercache::Error>(())
//! ```
//!
//! # Building Blocks
//!
//! The pieces the groups are made of are usable on their own:
//!
//! - [`HashRing`]: consistent hashing of keys onto nodes with virtual nodes.
//! - [`LruCache`]: a single-threaded LRU store bounded by entry weight.
//! - [`SharedCache`]: a lazily allocated, thread-safe, byte-budgeted [`LruCache`] of views.
//! - [`RingPicker`]: a [`PeerPicker`] backed by a [`HashRing`].
//! - [`BloomFilter`]: a lock-free membership filter sized from a target false-positive rate.
//!
//! # Logging
//!
//! Notable events are emitted through [`tracing`]: `peercache.hit` and `peercache.populate` at
//! `DEBUG`, `peercache.peer_error` and `peercache.group_replaced` at `WARN`. All carry a
//! `group.name` field.

mod cache;
mod error;
mod filter;
mod getter;
mod group;
mod lru;
mod peers;
mod registry;
mod ring;
mod view;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, SharedCache};
pub use error::{BoxError, Error, Result, SharedError};
pub use filter::BloomFilter;
pub use getter::{Getter, GetterFn, getter_fn};
pub use group::{Group, GroupBuilder, GroupStats};
pub use lru::{ByteWeigher, LruCache, Unit, Weigher};
pub use peers::{DEFAULT_REPLICAS, PeerGetter, PeerPicker, PeerRequest, PeerResponse, RingPicker};
pub use registry::{Registry, get_group, new_group};
pub use ring::{HashFn, HashRing, crc32};
pub use view::ByteView;
