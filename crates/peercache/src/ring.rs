// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Consistent hashing of keys onto nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Hashes bytes onto a position of the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// The default ring hash: CRC-32 (IEEE).
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// A consistent-hash ring mapping string keys to node identifiers.
///
/// Every node occupies `replicas` positions ("virtual nodes") on a ring spanning the full `u32`
/// range. A key belongs to the node owning the first position at or after the key's hash,
/// wrapping around to the lowest position past the end of the ring. Virtual nodes keep the
/// per-node share of keys close to even, both for skewed key sets and when nodes are added.
///
/// The ring only grows: nodes are added, never removed. To change the topology, build a new ring.
/// It has no interior locking; callers that mutate it while others look up keys must provide
/// their own synchronization.
///
/// # Examples
///
/// ```
/// use peercache::HashRing;
///
/// let mut ring = HashRing::new(50);
/// ring.add(["10.0.0.1:8000", "10.0.0.2:8000", "10.0.0.3:8000"]);
///
/// let owner = ring.get("user:42").unwrap();
/// assert_eq!(ring.get("user:42"), Some(owner));
/// ```
#[derive(Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    positions: BTreeMap<u32, Arc<str>>,
}

impl HashRing {
    /// Creates an empty ring placing `replicas` virtual nodes per node, hashed with [`crc32`].
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32)
    }

    /// Creates an empty ring using a custom hash function.
    #[must_use]
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            positions: BTreeMap::new(),
        }
    }

    /// Adds nodes to the ring.
    ///
    /// Virtual node `i` of node `n` sits at `hash("{i}{n}")`. When two virtual nodes land on the
    /// same position, the one added last owns it.
    pub fn add<I>(&mut self, nodes: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for node in nodes {
            let node: Arc<str> = Arc::from(node.as_ref());
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{i}{node}").as_bytes());
                self.positions.insert(position, Arc::clone(&node));
            }
        }
    }

    /// Returns the node that owns `key`, or `None` if the ring is empty.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let hash = (self.hash)(key.as_bytes());
        self.positions
            .range(hash..)
            .next()
            .or_else(|| self.positions.iter().next())
            .map(|(_, node)| node.as_ref())
    }

    /// Returns `true` if no node has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the number of occupied positions on the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of virtual nodes placed per node.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("positions", &self.positions.len())
            .finish_non_exhaustive()
    }
}
