//! # drover-core
//!
//! Foundation types for the Drover control-plane session hub.
//!
//! This crate provides the shared vocabulary the hub and its clients depend
//! on:
//!
//! - **Branded IDs**: `NodeId`, `PoolId`, `UserId`, `SubmissionId` as
//!   newtypes for type safety
//! - **Scopes**: the Plane → Pool → Node addressing hierarchy
//! - **Protocol records**: `Command`, `Status`, liveness and delivery types
//!   for the agent session protocol
//! - **Transcript types**: append-only log entries and subscriber events
//! - **Feed payloads**: topology snapshots and presence events
//! - **Errors**: the `HubError` taxonomy via `thiserror`
//! - **Retry math**: backoff parameters shared by every subscription kind

#![deny(unsafe_code)]

pub mod errors;
pub mod feed;
pub mod ids;
pub mod protocol;
pub mod retry;
pub mod scope;
pub mod transcript;

pub use errors::{HubError, Result};
pub use feed::{
    NodeDescriptor, PoolDescriptor, PresenceEntry, PresenceEvent, PresenceUpdateKind, TreeSnapshot,
};
pub use ids::{NodeId, PoolId, SubmissionId, UserId};
pub use protocol::{
    Command, CommandTarget, DeliveryFailure, DeliveryReport, Liveness, RuleStatus, Status,
    StatusReport, VarStatus,
};
pub use retry::RetryConfig;
pub use scope::{ScopeId, ScopeKind};
pub use transcript::{EntryKind, TranscriptEntry, TranscriptEvent};

/// Current UTC time in milliseconds since the epoch.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
