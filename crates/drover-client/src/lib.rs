//! # drover-client
//!
//! Observer-side subscription driver for hub feeds.
//!
//! Every feed a client consumes — topology, presence, scope transcripts —
//! follows the same contract: connect, deliver in order, and on a drop
//! reconnect with exponential backoff and jitter, resuming from the last
//! delivered position when the feed supports replay.

#![deny(unsafe_code)]

pub mod reconnect;

pub use reconnect::{
    FeedConnector, FeedError, FeedStream, ResumeToken, SubscriptionNotice, SubscriptionSink,
    run_subscription,
};
