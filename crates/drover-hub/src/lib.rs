//! # drover-hub
//!
//! The control-plane session hub: node session registry, scope tree,
//! status cache, presence tracker, and per-scope transcript logs with
//! replay-then-live subscriptions.
//!
//! - One live session per node; a newer connection supersedes the old
//! - Bounded per-session command queues; broadcast with send-time fan-out
//! - Liveness sweeping via a background task + `CancellationToken`
//! - Topology published as conflated snapshots over `tokio::sync::watch`
//! - Presence and transcripts fanned out over `tokio::sync::broadcast`
//! - Graceful shutdown draining all background tasks

#![deny(unsafe_code)]

pub mod config;
pub mod evaluator;
pub mod hub;
pub mod link;
pub mod liveness;
pub mod presence;
pub mod registry;
pub mod shutdown;
pub mod status;
pub mod topology;
pub mod transcript;

pub use config::{HubConfig, load_config, load_config_from_path};
pub use evaluator::{EvalError, Evaluator};
pub use hub::SessionHub;
pub use link::{LinkTransport, NodeLink};
pub use presence::{PresenceSubscription, PresenceTracker};
pub use registry::{NodeRegistry, SessionHandle};
pub use shutdown::ShutdownCoordinator;
pub use status::{StatusCache, StatusSnapshot};
pub use topology::ScopeTree;
pub use transcript::{TranscriptHub, TranscriptSubscription};
