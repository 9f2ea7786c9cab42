//! Node Session Registry.
//!
//! Owns exactly one live session per `node_id`. Registering a new link for
//! an already-connected node atomically supersedes and closes the prior
//! link (last writer wins). Dispatch fans out over independent, bounded
//! per-session send paths; status ingest updates liveness without blocking
//! on downstream subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use drover_core::protocol::{
    Command, CommandTarget, DeliveryFailure, DeliveryReport, Liveness, Status,
};
use drover_core::{HubError, NodeId};

use crate::link::NodeLink;

/// Capacity of the liveness event channel consumed by the topology bridge.
const LIVENESS_CHANNEL_CAPACITY: usize = 256;

/// A liveness transition observed by the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LivenessEvent {
    /// The node whose liveness changed.
    pub node_id: NodeId,
    /// New liveness.
    pub liveness: Liveness,
}

/// One registered agent session.
#[derive(Debug)]
pub struct NodeSession {
    /// Owning node.
    pub node_id: NodeId,
    /// Registration epoch; a superseded link closing late must not tear
    /// down its successor.
    epoch: u64,
    link: Arc<NodeLink>,
    /// When the link was registered.
    pub connected_at: Instant,
    /// Registration wall clock, for staleness before the first status.
    registered_ms: u64,
    last_status_ms: AtomicU64,
    connected: AtomicBool,
}

impl NodeSession {
    /// Current liveness of this session.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        if self.connected.load(Ordering::Relaxed) && !self.link.is_closed() {
            Liveness::Connected
        } else {
            Liveness::Disconnected
        }
    }

    /// Highest status timestamp seen from this node, in ms.
    #[must_use]
    pub fn last_status_ms(&self) -> u64 {
        self.last_status_ms.load(Ordering::Relaxed)
    }

    /// Registration epoch, for teardown matching.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Handle returned from registration; the transport layer uses it to report
/// link-level closure back to the registry.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    node_id: NodeId,
    epoch: u64,
    registry: Arc<NodeRegistry>,
}

impl SessionHandle {
    /// The node this handle belongs to.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Report the link closed (I/O error or orderly close). Destroys the
    /// session immediately unless it was already superseded.
    pub fn close(&self) {
        self.registry.mark_link_closed(&self.node_id, self.epoch);
    }
}

/// Registry of live agent sessions.
#[derive(Debug)]
pub struct NodeRegistry {
    sessions: DashMap<NodeId, Arc<NodeSession>>,
    next_epoch: AtomicU64,
    liveness_tx: broadcast::Sender<LivenessEvent>,
    send_timeout: Duration,
}

impl NodeRegistry {
    /// Create an empty registry; `send_timeout` bounds every dispatch send.
    #[must_use]
    pub fn new(send_timeout: Duration) -> Arc<Self> {
        let (liveness_tx, _) = broadcast::channel(LIVENESS_CHANNEL_CAPACITY);
        Arc::new(Self {
            sessions: DashMap::new(),
            next_epoch: AtomicU64::new(1),
            liveness_tx,
            send_timeout,
        })
    }

    /// Install a session for `node_id`, closing and discarding any prior
    /// link for the same node. Emits a Connected topology event.
    pub fn register(self: &Arc<Self>, node_id: NodeId, link: Arc<NodeLink>) -> SessionHandle {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(NodeSession {
            node_id: node_id.clone(),
            epoch,
            link,
            connected_at: Instant::now(),
            registered_ms: drover_core::now_ms(),
            last_status_ms: AtomicU64::new(0),
            connected: AtomicBool::new(true),
        });

        if let Some(prior) = self.sessions.insert(node_id.clone(), session) {
            info!(node_id = %node_id, prior_epoch = prior.epoch, "superseding existing session");
            prior.connected.store(false, Ordering::Relaxed);
            prior.link.close();
        } else {
            info!(node_id = %node_id, "node connected");
        }

        self.emit(&node_id, Liveness::Connected);
        SessionHandle {
            node_id,
            epoch,
            registry: Arc::clone(self),
        }
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<Arc<NodeSession>> {
        self.sessions.get(node_id).map(|s| Arc::clone(&s))
    }

    /// Number of registered sessions (live or stale).
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Dispatch a command to one node or to every currently live session.
    ///
    /// For a specific node, fails with [`HubError::NotConnected`] when no
    /// live session exists (including mid-teardown). For broadcast, the
    /// live set is snapshotted at dispatch time — sessions connecting
    /// afterwards are not included — and each send runs independently with
    /// a bounded timeout, so one unresponsive agent cannot delay the rest.
    pub async fn dispatch(
        &self,
        target: CommandTarget,
        action: &str,
        payload: Bytes,
    ) -> Result<DeliveryReport, HubError> {
        match target {
            CommandTarget::Node(node_id) => {
                let session = self
                    .get(&node_id)
                    .filter(|s| s.liveness() == Liveness::Connected)
                    .ok_or_else(|| HubError::NotConnected(node_id.clone()))?;

                let command = Command::to_node(node_id.clone(), action, payload);
                let mut report = DeliveryReport::default();
                match session.link.send_timeout(command, self.send_timeout).await {
                    Ok(()) => report.delivered.push(node_id),
                    Err(DeliveryFailure::LinkClosed) => {
                        return Err(HubError::NotConnected(node_id));
                    }
                    Err(failure) => {
                        warn!(node_id = %node_id, ?failure, "dispatch send abandoned");
                        report.failed.push((node_id, failure));
                    }
                }
                Ok(report)
            }
            CommandTarget::Broadcast => {
                // Send-time semantics: snapshot the live set before any send.
                let recipients: Vec<Arc<NodeSession>> = self
                    .sessions
                    .iter()
                    .filter(|entry| entry.value().liveness() == Liveness::Connected)
                    .map(|entry| Arc::clone(entry.value()))
                    .collect();

                debug!(action, recipients = recipients.len(), "broadcast dispatch");

                let command = Command::broadcast(action, payload);
                let sends = recipients.iter().map(|session| {
                    let command = command.clone();
                    async move {
                        let result = session.link.send_timeout(command, self.send_timeout).await;
                        (session.node_id.clone(), result)
                    }
                });

                let mut report = DeliveryReport::default();
                for (node_id, result) in futures::future::join_all(sends).await {
                    match result {
                        Ok(()) => report.delivered.push(node_id),
                        Err(failure) => {
                            warn!(node_id = %node_id, ?failure, "broadcast send abandoned");
                            report.failed.push((node_id, failure));
                        }
                    }
                }
                Ok(report)
            }
        }
    }

    /// Record an inbound status message: bump the liveness timestamp
    /// (keeping the highest `ts_ms` seen — out-of-order arrival is
    /// tolerated) and revive a stale-flipped session.
    ///
    /// Returns `false` when the node has no registered session.
    pub fn ingest_status(&self, status: &Status) -> bool {
        let Some(session) = self.get(&status.node_id) else {
            debug!(node_id = %status.node_id, "status from unregistered node ignored");
            return false;
        };
        let _ = session
            .last_status_ms
            .fetch_max(status.ts_ms, Ordering::Relaxed);
        if !session.connected.swap(true, Ordering::Relaxed) && !session.link.is_closed() {
            info!(node_id = %status.node_id, "stale node reporting again");
            self.emit(&status.node_id, Liveness::Connected);
        }
        true
    }

    /// Internal liveness signal consumed by the scope tree bridge.
    #[must_use]
    pub fn observe_liveness(&self) -> broadcast::Receiver<LivenessEvent> {
        self.liveness_tx.subscribe()
    }

    /// Destroy the session for `node_id` if it still belongs to `epoch`.
    ///
    /// Called on link-level I/O errors and orderly closes. A stale epoch
    /// (the session was already superseded) is a no-op.
    pub fn mark_link_closed(&self, node_id: &NodeId, epoch: u64) {
        let removed = self
            .sessions
            .remove_if(node_id, |_, session| session.epoch == epoch);
        if let Some((_, session)) = removed {
            session.connected.store(false, Ordering::Relaxed);
            session.link.close();
            info!(node_id = %node_id, "node disconnected");
            self.emit(node_id, Liveness::Disconnected);
        } else {
            debug!(node_id = %node_id, epoch, "stale link close ignored");
        }
    }

    /// Flip a quiet session to Disconnected without destroying it; the node
    /// stays visible in the topology as disconnected.
    pub fn mark_stale(&self, node_id: &NodeId) {
        if let Some(session) = self.get(node_id) {
            if session.connected.swap(false, Ordering::Relaxed) {
                warn!(node_id = %node_id, "node stale, marking disconnected");
                self.emit(node_id, Liveness::Disconnected);
            }
        }
    }

    /// Node IDs of connected sessions whose last sign of life — status
    /// report or registration itself — is older than `staleness`, judged
    /// against `now_ms` (hub-side clock).
    #[must_use]
    pub fn stale_nodes(&self, staleness: Duration, now_ms: u64) -> Vec<NodeId> {
        #[allow(clippy::cast_possible_truncation)]
        let staleness_ms = staleness.as_millis() as u64;
        self.sessions
            .iter()
            .filter(|entry| {
                let session = entry.value();
                let last_seen = session.last_status_ms().max(session.registered_ms);
                session.connected.load(Ordering::Relaxed)
                    && now_ms.saturating_sub(last_seen) > staleness_ms
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn emit(&self, node_id: &NodeId, liveness: Liveness) {
        let _ = self.liveness_tx.send(LivenessEvent {
            node_id: node_id.clone(),
            liveness,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkTransport, link};
    use assert_matches::assert_matches;

    fn registry() -> Arc<NodeRegistry> {
        NodeRegistry::new(Duration::from_millis(100))
    }

    fn connect(reg: &Arc<NodeRegistry>, id: &str) -> (SessionHandle, LinkTransport) {
        let (hub_side, transport) = link(8);
        let handle = reg.register(NodeId::from(id), hub_side);
        (handle, transport)
    }

    fn status(id: &str, ts_ms: u64) -> Status {
        Status {
            node_id: NodeId::from(id),
            ok: true,
            info: String::new(),
            ts_ms,
            report: None,
        }
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let reg = registry();
        let (_handle, _transport) = connect(&reg, "n1");
        let session = reg.get(&NodeId::from("n1")).unwrap();
        assert_eq!(session.liveness(), Liveness::Connected);
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn register_supersedes_prior_link() {
        let reg = registry();
        let (_h1, t1) = connect(&reg, "n1");
        let (_h2, t2) = connect(&reg, "n1");

        // first link is closed, second is live
        assert!(t1.closed.is_cancelled());
        assert!(!t2.closed.is_cancelled());
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn superseded_close_does_not_destroy_successor() {
        let reg = registry();
        let (h1, _t1) = connect(&reg, "n1");
        let (_h2, _t2) = connect(&reg, "n1");

        // stale handle closing late must be ignored
        h1.close();
        let session = reg.get(&NodeId::from("n1")).unwrap();
        assert_eq!(session.liveness(), Liveness::Connected);
    }

    #[tokio::test]
    async fn dispatch_to_connected_node() {
        let reg = registry();
        let (_h, mut t) = connect(&reg, "n1");

        let report = reg
            .dispatch(
                CommandTarget::Node(NodeId::from("n1")),
                "apply_rules",
                Bytes::new(),
            )
            .await
            .unwrap();
        assert!(report.all_delivered());
        let cmd = t.commands.recv().await.unwrap();
        assert_eq!(cmd.action, "apply_rules");
    }

    #[tokio::test]
    async fn dispatch_to_unknown_node_is_not_connected() {
        let reg = registry();
        let err = reg
            .dispatch(CommandTarget::Node(NodeId::from("ghost")), "x", Bytes::new())
            .await
            .unwrap_err();
        assert_matches!(err, HubError::NotConnected(_));
    }

    #[tokio::test]
    async fn dispatch_after_close_is_not_connected() {
        let reg = registry();
        let (h, _t) = connect(&reg, "n1");
        h.close();
        let err = reg
            .dispatch(CommandTarget::Node(NodeId::from("n1")), "x", Bytes::new())
            .await
            .unwrap_err();
        assert_matches!(err, HubError::NotConnected(_));
    }

    #[tokio::test]
    async fn broadcast_reaches_only_sessions_live_at_dispatch() {
        let reg = registry();
        let (_ha, mut ta) = connect(&reg, "a");
        let (_hb, mut tb) = connect(&reg, "b");

        let report = reg
            .dispatch(CommandTarget::Broadcast, "ping", Bytes::new())
            .await
            .unwrap();
        assert_eq!(report.delivered.len(), 2);

        // c connects after dispatch and must receive nothing
        let (_hc, mut tc) = connect(&reg, "c");
        assert!(ta.commands.recv().await.is_some());
        assert!(tb.commands.recv().await.is_some());
        assert_matches!(tc.commands.try_recv(), Err(_));
    }

    #[tokio::test]
    async fn broadcast_slow_session_does_not_block_others() {
        let reg = registry();
        // slow: queue capacity 1, pre-filled so the broadcast send times out
        let (slow_link, _slow_t) = link(1);
        slow_link.try_send(Command::broadcast("fill", Bytes::new())).unwrap();
        let _h_slow = reg.register(NodeId::from("slow"), slow_link);
        let (_h_fast, mut fast_t) = connect(&reg, "fast");

        let report = reg
            .dispatch(CommandTarget::Broadcast, "ping", Bytes::new())
            .await
            .unwrap();
        assert_eq!(report.delivered, vec![NodeId::from("fast")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1, DeliveryFailure::Timeout);
        assert!(fast_t.commands.recv().await.is_some());
    }

    #[tokio::test]
    async fn ingest_status_keeps_highest_ts() {
        let reg = registry();
        let (_h, _t) = connect(&reg, "n1");

        assert!(reg.ingest_status(&status("n1", 2000)));
        assert!(reg.ingest_status(&status("n1", 1000))); // out of order, tolerated
        let session = reg.get(&NodeId::from("n1")).unwrap();
        assert_eq!(session.last_status_ms(), 2000);
    }

    #[tokio::test]
    async fn ingest_status_unknown_node_returns_false() {
        let reg = registry();
        assert!(!reg.ingest_status(&status("ghost", 1)));
    }

    #[tokio::test]
    async fn stale_flip_keeps_entry_and_status_revives() {
        let reg = registry();
        let (_h, _t) = connect(&reg, "n1");
        let node = NodeId::from("n1");

        reg.mark_stale(&node);
        let session = reg.get(&node).unwrap();
        assert_eq!(session.liveness(), Liveness::Disconnected);
        assert_eq!(reg.len(), 1); // entry remains

        assert!(reg.ingest_status(&status("n1", 5000)));
        assert_eq!(session.liveness(), Liveness::Connected);
    }

    #[tokio::test]
    async fn liveness_events_in_order() {
        let reg = registry();
        let mut rx = reg.observe_liveness();
        let (h, _t) = connect(&reg, "n1");
        h.close();

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.liveness, Liveness::Connected);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.liveness, Liveness::Disconnected);
        assert_eq!(ev.node_id, NodeId::from("n1"));
    }

    #[tokio::test]
    async fn stale_nodes_judged_by_timestamp() {
        let reg = registry();
        let (_h1, _t1) = connect(&reg, "fresh");
        let (_h2, _t2) = connect(&reg, "quiet");
        let base = drover_core::now_ms();
        assert!(reg.ingest_status(&status("fresh", base + 5000)));

        // both registered around `base`; only fresh has reported since
        let stale = reg.stale_nodes(Duration::from_millis(1000), base + 2000);
        assert_eq!(stale, vec![NodeId::from("quiet")]);

        // within the staleness window nothing is flipped
        assert!(reg.stale_nodes(Duration::from_millis(1000), base).is_empty());
    }
}
