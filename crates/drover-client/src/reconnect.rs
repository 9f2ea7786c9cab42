//! Reconnect discipline shared by every observer subscription kind.
//!
//! A [`FeedConnector`] knows how to open one attempt of a feed (topology,
//! presence, or a scope transcript) and how to extract a resume token from
//! the items it yields. [`run_subscription`] drives it: connect, deliver,
//! track the newest token, and on failure back off with jitter before
//! reconnecting from that token. Cancellation wins every race, including
//! mid-backoff, and drops the stream so hub-side subscriber state goes
//! away promptly.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drover_core::RetryConfig;

/// Where to restart a feed after a drop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeToken {
    /// Replayable feed: highest sequence already delivered.
    Seq(u64),
    /// Snapshot feed, or a replay cursor known to be evicted: start over.
    Fresh,
}

/// Why a feed attempt ended.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The connection attempt itself failed.
    #[error("feed connect failed: {0}")]
    Connect(String),
    /// An established stream broke.
    #[error("feed stream failed: {0}")]
    Stream(String),
}

/// One attempt's worth of feed items.
pub type FeedStream<T> = BoxStream<'static, Result<T, FeedError>>;

/// Opens feed attempts and maps items to resume tokens.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Item the feed yields.
    type Item: Send + 'static;

    /// Open one attempt, resuming from `resume` when the feed supports it.
    /// `None` means the very first attempt.
    async fn connect(
        &self,
        resume: Option<ResumeToken>,
    ) -> Result<FeedStream<Self::Item>, FeedError>;

    /// Token to resume from if the stream drops after `item`. `None` leaves
    /// the tracked token unchanged.
    fn resume_token(item: &Self::Item) -> Option<ResumeToken>;
}

/// Consumes delivered items and retry notices.
#[async_trait]
pub trait SubscriptionSink<T>: Send {
    /// One feed item, in order.
    async fn deliver(&mut self, item: T);

    /// Out-of-band notice about the subscription itself.
    async fn notify(&mut self, notice: SubscriptionNotice);
}

/// Subscription-level notice delivered alongside feed items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionNotice {
    /// The feed dropped; the driver waits `delay_ms` before attempt
    /// `attempt`. Consumers decide their own give-up policy.
    Retrying {
        /// Consecutive failed attempts so far.
        attempt: u32,
        /// Backoff before the next connect, in ms.
        delay_ms: u64,
    },
}

/// Drive a subscription until cancelled.
///
/// The failure counter resets after any successful delivery, so a feed
/// that was healthy for a while starts its next backoff from the bottom
/// of the curve.
pub async fn run_subscription<C, S>(
    connector: &C,
    config: &RetryConfig,
    cancel: &CancellationToken,
    sink: &mut S,
) where
    C: FeedConnector,
    S: SubscriptionSink<C::Item>,
{
    let mut resume: Option<ResumeToken> = None;
    let mut attempt: u32 = 0;

    loop {
        let connected = tokio::select! {
            result = connector.connect(resume) => result,
            () = cancel.cancelled() => return,
        };

        match connected {
            Ok(mut stream) => {
                debug!(?resume, "feed connected");
                loop {
                    let next = tokio::select! {
                        item = stream.next() => item,
                        () = cancel.cancelled() => return,
                    };
                    match next {
                        Some(Ok(item)) => {
                            if let Some(token) = C::resume_token(&item) {
                                resume = Some(token);
                            }
                            sink.deliver(item).await;
                            attempt = 0;
                        }
                        Some(Err(err)) => {
                            warn!(%err, "feed stream broke");
                            break;
                        }
                        None => {
                            info!("feed ended, reconnecting");
                            break;
                        }
                    }
                }
                drop(stream);
            }
            Err(err) => {
                warn!(%err, ?resume, "feed connect failed");
            }
        }

        attempt = attempt.saturating_add(1);
        let delay_ms = config.delay_for(attempt, rand::random::<f64>());
        sink.notify(SubscriptionNotice::Retrying { attempt, delay_ms }).await;
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            () = cancel.cancelled() => return,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
