//! Branded ID newtypes for type safety.
//!
//! Every entity in the hub has a distinct ID type implemented as a newtype
//! wrapper around `String`. This prevents accidentally passing a user ID
//! where a node ID is expected.
//!
//! Generated IDs are UUID v7 (time-ordered) via [`uuid::Uuid::now_v7`];
//! agent-supplied IDs (hostnames, pool names) come in through `From`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for an agent node.
    NodeId
}

branded_id! {
    /// Unique identifier for a node pool.
    PoolId
}

branded_id! {
    /// Unique identifier for an observer user (already verified upstream).
    UserId
}

branded_id! {
    /// Unique identifier for a transcript submission.
    SubmissionId
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_id_new_is_uuid_v7() {
        let id = SubmissionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        let a = SubmissionId::new();
        let b = SubmissionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_string() {
        let id = NodeId::from_string("node-7".to_owned());
        assert_eq!(id.as_str(), "node-7");
    }

    #[test]
    fn from_str_ref() {
        let id = UserId::from("alice");
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn deref_to_str() {
        let id = NodeId::from("n1");
        let s: &str = &id;
        assert_eq!(s, "n1");
    }

    #[test]
    fn display() {
        let id = PoolId::from("default");
        assert_eq!(format!("{id}"), "default");
    }

    #[test]
    fn into_string() {
        let id = NodeId::from("n2");
        let s: String = id.into();
        assert_eq!(s, "n2");
    }

    #[test]
    fn serde_roundtrip() {
        let id = UserId::from("bob");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"bob\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = NodeId::from("same");
        let _ = set.insert(id.clone());
        let _ = set.insert(NodeId::from("same"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn ordering_follows_string() {
        let a = NodeId::from("a");
        let b = NodeId::from("b");
        assert!(a < b);
    }
}
