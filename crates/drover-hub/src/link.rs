//! Hub-side handle of one agent duplex link.
//!
//! Each connected agent gets exactly one [`NodeLink`] with a bounded
//! outbound command queue. Every send path is per-session and bounded, so
//! one unresponsive agent can never stall delivery to the rest. The
//! transport side drains the paired [`LinkTransport`] and observes closure
//! through its cancellation token.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use drover_core::protocol::{Command, DeliveryFailure};

/// Hub-side sender half of an agent link.
#[derive(Debug)]
pub struct NodeLink {
    tx: mpsc::Sender<Command>,
    closed: CancellationToken,
    dropped: AtomicU64,
}

/// Transport-side receiver half of an agent link.
///
/// The transport task forwards `commands` down the wire and watches
/// `closed` — the token fires when the hub supersedes or tears down the
/// session.
#[derive(Debug)]
pub struct LinkTransport {
    /// Outbound commands for this agent, in dispatch order.
    pub commands: mpsc::Receiver<Command>,
    /// Fires when the hub closes this link.
    pub closed: CancellationToken,
}

/// Create a connected link pair with the given outbound queue capacity.
#[must_use]
pub fn link(queue_capacity: usize) -> (Arc<NodeLink>, LinkTransport) {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let closed = CancellationToken::new();
    let hub_side = Arc::new(NodeLink {
        tx,
        closed: closed.clone(),
        dropped: AtomicU64::new(0),
    });
    let transport = LinkTransport {
        commands: rx,
        closed,
    };
    (hub_side, transport)
}

impl NodeLink {
    /// Enqueue a command without waiting.
    ///
    /// Returns the failure reason if the queue is full or the link closed;
    /// failed sends increment the drop counter.
    pub fn try_send(&self, command: Command) -> Result<(), DeliveryFailure> {
        if self.closed.is_cancelled() {
            return Err(DeliveryFailure::LinkClosed);
        }
        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryFailure::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryFailure::LinkClosed),
        }
    }

    /// Enqueue a command, waiting at most `timeout` for queue space.
    ///
    /// A send that cannot complete within the bound is abandoned and
    /// reported, never retried here.
    pub async fn send_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<(), DeliveryFailure> {
        if self.closed.is_cancelled() {
            return Err(DeliveryFailure::LinkClosed);
        }
        tokio::select! {
            res = tokio::time::timeout(timeout, self.tx.send(command)) => match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(DeliveryFailure::LinkClosed),
                Err(_) => {
                    let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                    Err(DeliveryFailure::Timeout)
                }
            },
            () = self.closed.cancelled() => Err(DeliveryFailure::LinkClosed),
        }
    }

    /// Close the link. The transport side's token fires; queued commands
    /// already accepted may still be drained.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the link has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the link closes.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Total sends abandoned on this link (queue full or timed out).
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
