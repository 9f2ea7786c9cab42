//! Hierarchical scope addressing.
//!
//! Every feed the hub serves is addressed by a [`ScopeId`]: a point in the
//! Plane → Pool → Node containment hierarchy. A plane contains pools, a pool
//! contains nodes; a scope's kind never changes once created.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The level of a scope in the containment hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// The control plane itself (one per hub).
    Plane,
    /// A pool of nodes.
    Pool,
    /// A single agent node.
    Node,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Plane => "plane",
            Self::Pool => "pool",
            Self::Node => "node",
        };
        f.write_str(s)
    }
}

/// An addressable point in the Plane → Pool → Node hierarchy.
///
/// Used to route status reads, transcript sessions, and presence. The kind
/// is part of the identity: `pool:x` and `node:x` are distinct scopes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId {
    /// Hierarchy level.
    pub kind: ScopeKind,
    /// Identifier within that level.
    pub id: String,
}

impl ScopeId {
    /// A plane-level scope.
    #[must_use]
    pub fn plane(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Plane,
            id: id.into(),
        }
    }

    /// A pool-level scope.
    #[must_use]
    pub fn pool(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Pool,
            id: id.into(),
        }
    }

    /// A node-level scope.
    #[must_use]
    pub fn node(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Node,
            id: id.into(),
        }
    }

    /// Whether this scope addresses a single node.
    #[must_use]
    pub fn is_node(&self) -> bool {
        self.kind == ScopeKind::Node
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind() {
        assert_eq!(ScopeId::plane("cp-1").kind, ScopeKind::Plane);
        assert_eq!(ScopeId::pool("default").kind, ScopeKind::Pool);
        assert_eq!(ScopeId::node("n1").kind, ScopeKind::Node);
    }

    #[test]
    fn display_is_kind_colon_id() {
        assert_eq!(ScopeId::node("n1").to_string(), "node:n1");
        assert_eq!(ScopeId::pool("p").to_string(), "pool:p");
    }

    #[test]
    fn kind_is_part_of_identity() {
        let pool = ScopeId::pool("x");
        let node = ScopeId::node("x");
        assert_ne!(pool, node);
    }

    #[test]
    fn usable_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        let _ = map.insert(ScopeId::node("n1"), 1);
        let _ = map.insert(ScopeId::node("n1"), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&ScopeId::node("n1")], 2);
    }

    #[test]
    fn serde_lowercase_kind() {
        let json = serde_json::to_string(&ScopeId::pool("default")).unwrap();
        assert_eq!(json, r#"{"kind":"pool","id":"default"}"#);
        let back: ScopeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ScopeId::pool("default"));
    }

    #[test]
    fn is_node() {
        assert!(ScopeId::node("n1").is_node());
        assert!(!ScopeId::pool("p1").is_node());
        assert!(!ScopeId::plane("cp").is_node());
    }
}
