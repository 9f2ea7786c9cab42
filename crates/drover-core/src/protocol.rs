//! Agent-facing session protocol records.
//!
//! The hub consumes and produces already-decoded structured messages;
//! transport framing and encoding live outside this workspace. Per agent
//! there is one long-lived duplex channel: the agent sends a [`Status`]
//! stream up and receives a [`Command`] stream down.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Where a command is delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTarget {
    /// A single node by ID.
    Node(NodeId),
    /// Every session live at the moment of dispatch. Sessions that connect
    /// afterwards do not receive the command.
    Broadcast,
}

/// A command pushed down to one or all agents. Immutable once issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Delivery target.
    pub target: CommandTarget,
    /// Action name understood by the agent.
    pub action: String,
    /// Opaque action payload.
    pub payload: Bytes,
}

impl Command {
    /// Command addressed to a single node.
    #[must_use]
    pub fn to_node(node_id: impl Into<NodeId>, action: impl Into<String>, payload: Bytes) -> Self {
        Self {
            target: CommandTarget::Node(node_id.into()),
            action: action.into(),
            payload,
        }
    }

    /// Command addressed to all currently connected nodes.
    #[must_use]
    pub fn broadcast(action: impl Into<String>, payload: Bytes) -> Self {
        Self {
            target: CommandTarget::Broadcast,
            action: action.into(),
            payload,
        }
    }
}

/// Enabled/disabled state of one rule in a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatus {
    /// Rule namespace.
    pub namespace: String,
    /// Rule name within the namespace.
    pub name: String,
    /// Whether the rule is currently enabled.
    pub enabled: bool,
}

/// Enabled/disabled state of one variable in a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VarStatus {
    /// Variable name.
    pub name: String,
    /// Whether the variable is currently set.
    pub enabled: bool,
}

/// Decoded rule/variable payload carried by a status message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Rule states for the reporting scope.
    pub rules: Vec<RuleStatus>,
    /// Variable states for the reporting scope.
    pub vars: Vec<VarStatus>,
}

/// A status message sent up by an agent.
///
/// `ts_ms` is assumed monotonic per node but not enforced; out-of-order
/// arrival is tolerated (the registry keeps the highest timestamp seen).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Reporting node.
    pub node_id: NodeId,
    /// Whether the agent considers itself healthy.
    pub ok: bool,
    /// Free-form status text.
    pub info: String,
    /// Agent-side timestamp in milliseconds.
    pub ts_ms: u64,
    /// Optional decoded rule/variable report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<StatusReport>,
}

/// Connected/disconnected state of a node session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// The session link is live and the node is reporting.
    Connected,
    /// The link closed or the node went stale. A stale node stays visible
    /// in the topology as disconnected.
    Disconnected,
}

/// Why delivery to one session failed during dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// No live session for the target at dispatch time.
    NotConnected,
    /// The session's bounded outbound queue was full.
    QueueFull,
    /// The send did not complete within the dispatch timeout.
    Timeout,
    /// The link closed while the send was in flight.
    LinkClosed,
}

/// Outcome of a dispatch, reporting per-session delivery independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    /// Sessions the command was handed to.
    pub delivered: Vec<NodeId>,
    /// Sessions where delivery was abandoned, with the reason.
    pub failed: Vec<(NodeId, DeliveryFailure)>,
}

impl DeliveryReport {
    /// Whether every targeted session accepted the command.
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
