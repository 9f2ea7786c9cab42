//! Scope tree.
//!
//! Single-plane topology of pools and nodes. Every mutation publishes a
//! full, sorted snapshot on a watch channel, so a new subscriber always
//! starts from the current tree and a slow subscriber only ever skips
//! intermediate states, never sees a stale final one.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use drover_core::feed::{NodeDescriptor, PoolDescriptor, TreeSnapshot};
use drover_core::protocol::Liveness;
use drover_core::{NodeId, PoolId};

#[derive(Debug, Default)]
struct TreeState {
    pools: BTreeMap<PoolId, PoolEntry>,
    nodes: BTreeMap<NodeId, NodeEntry>,
}

#[derive(Debug)]
struct PoolEntry {
    name: String,
    nodes: BTreeSet<NodeId>,
}

#[derive(Debug)]
struct NodeEntry {
    name: String,
    liveness: Liveness,
}

/// The plane's pool/node topology.
#[derive(Debug)]
pub struct ScopeTree {
    plane_id: String,
    state: RwLock<TreeState>,
    tx: watch::Sender<TreeSnapshot>,
}

impl ScopeTree {
    /// Empty tree for the given plane.
    #[must_use]
    pub fn new(plane_id: impl Into<String>) -> Self {
        let plane_id = plane_id.into();
        let (tx, _) = watch::channel(TreeSnapshot {
            plane_id: plane_id.clone(),
            pools: Vec::new(),
        });
        Self {
            plane_id,
            state: RwLock::new(TreeState::default()),
            tx,
        }
    }

    /// Plane identifier this tree describes.
    #[must_use]
    pub fn plane_id(&self) -> &str {
        &self.plane_id
    }

    /// Create or rename a pool.
    pub fn upsert_pool(&self, pool_id: PoolId, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.write();
        match state.pools.entry(pool_id) {
            Entry::Occupied(mut entry) => entry.get_mut().name = name,
            Entry::Vacant(entry) => {
                debug!(pool_id = %entry.key(), "pool added");
                entry.insert(PoolEntry {
                    name,
                    nodes: BTreeSet::new(),
                });
            }
        }
        self.publish(&state);
    }

    /// Place a node under a pool, creating the pool if needed. A node
    /// already present elsewhere is moved.
    pub fn upsert_node(&self, pool_id: PoolId, node_id: NodeId, name: impl Into<String>) {
        let mut state = self.state.write();
        for entry in state.pools.values_mut() {
            let _ = entry.nodes.remove(&node_id);
        }
        let _ = state
            .pools
            .entry(pool_id)
            .or_insert_with(|| PoolEntry {
                name: String::new(),
                nodes: BTreeSet::new(),
            })
            .nodes
            .insert(node_id.clone());
        let name = name.into();
        let _ = state
            .nodes
            .entry(node_id)
            .and_modify(|entry| entry.name.clone_from(&name))
            .or_insert(NodeEntry {
                name,
                liveness: Liveness::Connected,
            });
        self.publish(&state);
    }

    /// Update a node's liveness marker. Disconnected nodes stay in the
    /// tree; operators see them rather than watching them vanish.
    pub fn set_liveness(&self, node_id: &NodeId, liveness: Liveness) {
        let mut state = self.state.write();
        let Some(entry) = state.nodes.get_mut(node_id) else {
            return;
        };
        if entry.liveness == liveness {
            return;
        }
        entry.liveness = liveness;
        self.publish(&state);
    }

    /// Remove a node from the tree entirely (administrative removal; a
    /// disconnect only flips liveness).
    pub fn remove_node(&self, node_id: &NodeId) {
        let mut state = self.state.write();
        if state.nodes.remove(node_id).is_none() {
            return;
        }
        for entry in state.pools.values_mut() {
            let _ = entry.nodes.remove(node_id);
        }
        debug!(node_id = %node_id, "node removed from tree");
        self.publish(&state);
    }

    /// Current snapshot, pools and nodes in stable (sorted) order.
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        self.tx.borrow().clone()
    }

    /// Watch the tree. The receiver starts marked changed with the current
    /// snapshot; conflated, so only the latest state is ever observed.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TreeSnapshot> {
        self.tx.subscribe()
    }

    fn publish(&self, state: &TreeState) {
        let pools = state
            .pools
            .iter()
            .map(|(pool_id, pool)| PoolDescriptor {
                id: pool_id.clone(),
                name: pool.name.clone(),
                nodes: pool
                    .nodes
                    .iter()
                    .map(|node_id| {
                        let node = &state.nodes[node_id];
                        NodeDescriptor {
                            id: node_id.clone(),
                            name: node.name.clone(),
                            liveness: node.liveness,
                        }
                    })
                    .collect(),
            })
            .collect();
        // send_replace: the value must advance even with zero receivers,
        // since snapshot() reads it and a first subscriber starts from it.
        let _ = self.tx.send_replace(TreeSnapshot {
            plane_id: self.plane_id.clone(),
            pools,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
