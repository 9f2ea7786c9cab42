//! Error taxonomy for the hub.
//!
//! All agent- and observer-local failures are contained to the affected
//! session or subscription; no variant here is fatal to the hub process or
//! to another scope's transcript.

use thiserror::Error;

use crate::ids::NodeId;
use crate::scope::ScopeId;

/// Top-level hub error.
#[derive(Debug, Error)]
pub enum HubError {
    /// Dispatch target has no live session. Non-fatal, reported to the
    /// caller.
    #[error("node {0} is not connected")]
    NotConnected(NodeId),

    /// The external evaluator did not complete within the configured bound.
    /// Surfaced as a `Notice` entry; the scope remains usable.
    #[error("evaluation for {scope} timed out after {elapsed_ms}ms")]
    EvaluationTimeout {
        /// Scope whose submission timed out.
        scope: ScopeId,
        /// How long the hub waited.
        elapsed_ms: u64,
    },

    /// The external evaluator returned an error. Surfaced as a `Notice`
    /// entry; the scope remains usable.
    #[error("evaluation for {scope} failed: {message}")]
    EvaluationFailed {
        /// Scope whose submission failed.
        scope: ScopeId,
        /// Evaluator error text.
        message: String,
    },

    /// A submission was rejected because the scope's queue is full.
    #[error("submission for {0} rejected, queue full")]
    Rejected(ScopeId),

    /// The hub is shutting down and no longer accepts work.
    #[error("hub is shutting down")]
    ShuttingDown,
}

/// Convenience alias used throughout the hub crates.
pub type Result<T> = std::result::Result<T, HubError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
