//! Observer feed payloads: topology snapshots and presence events.

use serde::{Deserialize, Serialize};

use crate::ids::{NodeId, PoolId, UserId};
use crate::protocol::Liveness;
use crate::scope::ScopeId;

/// One node as shown in a topology snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Node ID.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// Current liveness. Stale nodes remain listed as disconnected.
    pub liveness: Liveness,
}

/// One pool as shown in a topology snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDescriptor {
    /// Pool ID.
    pub id: PoolId,
    /// Display name.
    pub name: String,
    /// Member nodes, sorted by ID for deterministic snapshots.
    pub nodes: Vec<NodeDescriptor>,
}

/// Full topology snapshot, pushed in full on every structural or liveness
/// change (no incremental diffing).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    /// The owning control plane.
    pub plane_id: String,
    /// Pools, sorted by ID.
    pub pools: Vec<PoolDescriptor>,
}

/// Where one observer user currently is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// Observer user (verified upstream).
    pub user_id: UserId,
    /// Scope the user is observing. At most one per user globally.
    pub scope: ScopeId,
    /// Last activity timestamp in milliseconds.
    pub last_seen_ms: u64,
}

/// What changed in the presence set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceUpdateKind {
    /// User appeared.
    Joined,
    /// User atomically moved to another scope (never a transient leave).
    Moved,
    /// User left.
    Left,
}

/// Event delivered to a presence subscriber: first a full snapshot, then
/// incremental updates in the order the operations were applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PresenceEvent {
    /// Full current presence set.
    Snapshot {
        /// All current entries.
        users: Vec<PresenceEntry>,
    },
    /// One incremental change.
    Update {
        /// Change kind.
        kind: PresenceUpdateKind,
        /// The affected entry (for `Left`, the entry as it was removed).
        entry: PresenceEntry,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
