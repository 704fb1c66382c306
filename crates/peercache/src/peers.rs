// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The boundary between a [`Group`](crate::Group) and the other nodes of the cluster.
//!
//! A group asks its [`PeerPicker`] which node owns a key. If another node does, the picker hands
//! back a [`PeerGetter`] through which the group fetches the value from that node. How requests
//! travel between nodes is up to the [`PeerGetter`] implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::{BoxError, HashRing};

/// Virtual nodes per node used by [`RingPicker::new`].
pub const DEFAULT_REPLICAS: usize = 50;

/// A request for one key of one group, sent to the node that owns the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerRequest {
    /// Name of the group on the owning node.
    pub group: String,
    /// The requested key.
    pub key: String,
}

/// The owning node's answer to a [`PeerRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerResponse {
    /// The value bytes.
    pub value: Bytes,
}

/// Fetches values from one remote node.
pub trait PeerGetter: Send + Sync {
    /// Asks the remote node for the value of `request.key` in group `request.group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be reached or fails to produce the value.
    fn get(&self, request: &PeerRequest) -> Result<PeerResponse, BoxError>;
}

/// Locates the node that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the getter of the node that owns `key`, or `None` if this node owns it.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

struct Topology {
    ring: HashRing,
    getters: HashMap<Arc<str>, Arc<dyn PeerGetter>>,
}

/// A [`PeerPicker`] that distributes keys over nodes with a [`HashRing`].
///
/// The local node always takes part in the ring. Keys that land on it are reported as local.
/// The topology is replaced as a whole by [`set_peers`](Self::set_peers); lookups running
/// concurrently see either the old or the new topology.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use peercache::{BoxError, PeerGetter, PeerPicker, PeerRequest, PeerResponse, RingPicker};
///
/// struct Remote;
///
/// impl PeerGetter for Remote {
///     fn get(&self, request: &PeerRequest) -> Result<PeerResponse, BoxError> {
///         Ok(PeerResponse { value: request.key.clone().into() })
///     }
/// }
///
/// let picker = RingPicker::new("10.0.0.1:8000");
/// assert!(picker.pick_peer("anything").is_none());
///
/// let remote: Arc<dyn PeerGetter> = Arc::new(Remote);
/// picker.set_peers([("10.0.0.2:8000", remote)]);
/// assert_eq!(picker.len(), 2);
/// ```
pub struct RingPicker {
    self_id: Arc<str>,
    replicas: usize,
    topology: RwLock<Topology>,
}

impl RingPicker {
    /// Creates a picker for the node `self_id` with [`DEFAULT_REPLICAS`] virtual nodes per node.
    #[must_use]
    pub fn new(self_id: impl AsRef<str>) -> Self {
        Self::with_replicas(self_id, DEFAULT_REPLICAS)
    }

    /// Creates a picker for the node `self_id` placing `replicas` virtual nodes per node.
    ///
    /// No node is known until [`set_peers`](Self::set_peers) is called, so until then every key is
    /// reported as local.
    #[must_use]
    pub fn with_replicas(self_id: impl AsRef<str>, replicas: usize) -> Self {
        Self {
            self_id: Arc::from(self_id.as_ref()),
            replicas,
            topology: RwLock::new(Topology {
                ring: HashRing::new(replicas),
                getters: HashMap::new(),
            }),
        }
    }

    /// Replaces the set of remote nodes.
    ///
    /// The ring is rebuilt from scratch from the local node and `peers`. An entry naming the
    /// local node is ignored.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn PeerGetter>)>,
        S: AsRef<str>,
    {
        let getters: HashMap<Arc<str>, Arc<dyn PeerGetter>> = peers
            .into_iter()
            .map(|(id, getter)| (Arc::from(id.as_ref()), getter))
            .filter(|(id, _)| *id != self.self_id)
            .collect();

        // Every node must place colliding positions the same way, so add in a stable order.
        let mut nodes: Vec<&Arc<str>> = std::iter::once(&self.self_id).chain(getters.keys()).collect();
        nodes.sort();

        let mut ring = HashRing::new(self.replicas);
        ring.add(nodes);

        *self.topology.write() = Topology { ring, getters };
    }

    /// Returns the identifier of the local node.
    #[must_use]
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Returns the number of nodes in the ring, the local node included once peers are set.
    #[must_use]
    pub fn len(&self) -> usize {
        let topology = self.topology.read();
        if topology.ring.is_empty() { 0 } else { topology.getters.len() + 1 }
    }

    /// Returns `true` if no topology has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topology.read().ring.is_empty()
    }
}

impl PeerPicker for RingPicker {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let topology = self.topology.read();
        let owner = topology.ring.get(key)?;
        if owner == &*self.self_id {
            return None;
        }
        topology.getters.get(owner).cloned()
    }
}

impl fmt::Debug for RingPicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingPicker")
            .field("self_id", &self.self_id)
            .field("replicas", &self.replicas)
            .field("nodes", &self.len())
            .finish()
    }
}
