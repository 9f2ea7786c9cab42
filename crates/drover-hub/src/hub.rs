//! Session hub composition.
//!
//! [`SessionHub`] wires the registry, scope tree, status cache, presence
//! tracker, and transcript hub together, owns the background tasks that
//! keep them consistent, and is the single surface the transport and
//! observer layers talk to.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use drover_core::feed::{PresenceEvent, TreeSnapshot};
use drover_core::protocol::{CommandTarget, DeliveryReport, Status};
use drover_core::{HubError, NodeId, PoolId, ScopeId, SubmissionId, UserId, now_ms};

use crate::config::HubConfig;
use crate::evaluator::Evaluator;
use crate::link::{LinkTransport, link};
use crate::liveness::run_liveness_sweep;
use crate::presence::PresenceTracker;
use crate::registry::{NodeRegistry, SessionHandle};
use crate::shutdown::ShutdownCoordinator;
use crate::status::{StatusCache, StatusSnapshot};
use crate::topology::ScopeTree;
use crate::transcript::{TranscriptHub, TranscriptSubscription};

/// The control-plane session hub.
pub struct SessionHub {
    config: HubConfig,
    registry: Arc<NodeRegistry>,
    topology: Arc<ScopeTree>,
    status: StatusCache,
    presence: PresenceTracker,
    transcripts: Arc<TranscriptHub>,
    shutdown: ShutdownCoordinator,
}

impl SessionHub {
    /// Build a hub from configuration and an evaluation backend, starting
    /// the liveness sweeper and the topology bridge.
    #[must_use]
    pub fn new(config: HubConfig, evaluator: Arc<dyn Evaluator>) -> Arc<Self> {
        let shutdown = ShutdownCoordinator::new();
        let registry = NodeRegistry::new(Duration::from_millis(config.link.send_timeout_ms));
        let topology = Arc::new(ScopeTree::new(config.plane_id.clone()));
        let transcripts =
            TranscriptHub::new(evaluator, config.transcript.clone(), shutdown.token());
        let presence = PresenceTracker::new(config.presence.broadcast_capacity);

        shutdown.track(tokio::spawn(run_liveness_sweep(
            Arc::clone(&registry),
            Duration::from_millis(config.liveness.sweep_interval_ms),
            Duration::from_millis(config.liveness.staleness_ms),
            shutdown.token(),
        )));
        shutdown.track(tokio::spawn(bridge_liveness(
            registry.observe_liveness(),
            Arc::clone(&topology),
            shutdown.token(),
        )));

        info!(plane_id = %config.plane_id, "session hub started");
        Arc::new(Self {
            config,
            registry,
            topology,
            status: StatusCache::new(),
            presence,
            transcripts,
            shutdown,
        })
    }

    /// Hub configuration in effect.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // ── agent side ───────────────────────────────────────────────────────

    /// Register an agent connection for `node_id` under `pool_id`.
    ///
    /// Places the node in the scope tree before the session becomes
    /// dispatchable, closes any session the node already had, and returns
    /// the transport end the connection task drains.
    pub fn register_node(
        &self,
        pool_id: PoolId,
        node_id: NodeId,
        name: impl Into<String>,
    ) -> Result<(SessionHandle, LinkTransport), HubError> {
        if self.shutdown.is_shutting_down() {
            return Err(HubError::ShuttingDown);
        }
        self.topology.upsert_node(pool_id, node_id.clone(), name);
        let (hub_side, transport) = link(self.config.link.queue_capacity);
        let handle = self.registry.register(node_id, hub_side);
        Ok((handle, transport))
    }

    /// Name a pool before (or after) its nodes connect.
    pub fn upsert_pool(&self, pool_id: PoolId, name: impl Into<String>) {
        self.topology.upsert_pool(pool_id, name);
    }

    /// Feed one inbound status message through liveness and the status
    /// cache. Unknown nodes are ignored.
    pub fn ingest_status(&self, status: Status) {
        if !self.registry.ingest_status(&status) {
            return;
        }
        if let Some(report) = status.report {
            self.status.put(StatusSnapshot {
                scope: ScopeId::node(status.node_id),
                rules: report.rules,
                vars: report.vars,
                ts_ms: now_ms(),
            });
        }
    }

    // ── operator side ────────────────────────────────────────────────────

    /// Send a command to one node or to all currently connected nodes.
    pub async fn dispatch(
        &self,
        target: CommandTarget,
        action: &str,
        payload: Bytes,
    ) -> Result<DeliveryReport, HubError> {
        if self.shutdown.is_shutting_down() {
            return Err(HubError::ShuttingDown);
        }
        self.registry.dispatch(target, action, payload).await
    }

    /// Latest cached status report for a scope.
    #[must_use]
    pub fn get_status(&self, scope: &ScopeId) -> Option<Arc<StatusSnapshot>> {
        self.status.get(scope)
    }

    /// Current topology snapshot.
    #[must_use]
    pub fn topology_snapshot(&self) -> TreeSnapshot {
        self.topology.snapshot()
    }

    /// Watch the topology; the receiver begins at the current snapshot.
    #[must_use]
    pub fn subscribe_topology(&self) -> watch::Receiver<TreeSnapshot> {
        self.topology.subscribe()
    }

    // ── presence ─────────────────────────────────────────────────────────

    /// Record a user arriving at a scope.
    pub fn presence_join(&self, user_id: UserId, scope: ScopeId) {
        self.presence.join(user_id, scope);
    }

    /// Record a user navigating to another scope.
    pub fn presence_move(&self, user_id: UserId, scope: ScopeId) {
        self.presence.move_to(user_id, scope);
    }

    /// Record a user departing.
    pub fn presence_leave(&self, user_id: &UserId) {
        self.presence.leave(user_id);
    }

    /// Presence snapshot event plus the delta stream continuing it.
    #[must_use]
    pub fn subscribe_presence(&self) -> (PresenceEvent, broadcast::Receiver<PresenceEvent>) {
        let sub = self.presence.subscribe();
        (PresenceEvent::Snapshot { users: sub.snapshot }, sub.updates)
    }

    // ── transcripts ──────────────────────────────────────────────────────

    /// Join a scope's transcript: replay from `since_seq`, then live.
    /// Naming a `user` appends "joined"/"left" notices for them.
    #[must_use]
    pub fn join_transcript(
        &self,
        scope: &ScopeId,
        user: Option<UserId>,
        since_seq: Option<u64>,
    ) -> TranscriptSubscription {
        self.transcripts.join(scope, user, since_seq)
    }

    /// Queue a text submission for evaluation in `scope`.
    pub fn submit(
        &self,
        scope: &ScopeId,
        author: UserId,
        text: impl Into<String>,
    ) -> Result<SubmissionId, HubError> {
        self.transcripts.submit(scope, author, text)
    }

    /// Append an engine-initiated notice to a scope's transcript.
    pub fn notice(&self, scope: &ScopeId, text: impl Into<String>) -> u64 {
        self.transcripts.notice(scope, text)
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    /// Stop accepting work, stop background tasks, and wait for them.
    pub async fn shutdown(&self, timeout: Option<Duration>) {
        info!(plane_id = %self.config.plane_id, "session hub stopping");
        self.shutdown.drain(timeout).await;
    }
}

/// Forward registry liveness transitions into the scope tree so topology
/// subscribers see connect/disconnect without polling.
async fn bridge_liveness(
    mut events: broadcast::Receiver<crate::registry::LivenessEvent>,
    topology: Arc<ScopeTree>,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => topology.set_liveness(&event.node_id, event.liveness),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // conflated downstream by the watch channel; safe to skip
                    debug!(missed, "liveness bridge lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            () = cancel.cancelled() => return,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::EchoEvaluator;
    use assert_matches::assert_matches;
    use drover_core::protocol::Liveness;

    fn hub() -> Arc<SessionHub> {
        SessionHub::new(HubConfig::default(), Arc::new(EchoEvaluator))
    }

    fn status_with_report(node: &str) -> Status {
        use drover_core::protocol::{RuleStatus, StatusReport};
        Status {
            node_id: NodeId::from(node),
            ok: true,
            info: String::new(),
            ts_ms: now_ms(),
            report: Some(StatusReport {
                rules: vec![RuleStatus {
                    namespace: "core".into(),
                    name: "audit".into(),
                    enabled: true,
                }],
                vars: Vec::new(),
            }),
        }
    }

    #[tokio::test]
    async fn register_places_node_in_tree_before_dispatch() {
        let hub = hub();
        let (_handle, mut transport) = hub
            .register_node(PoolId::from("p1"), NodeId::from("n1"), "worker-1")
            .unwrap();

        let snap = hub.topology_snapshot();
        assert_eq!(snap.pools.len(), 1);
        assert_eq!(snap.pools[0].nodes[0].liveness, Liveness::Connected);

        let report = hub
            .dispatch(CommandTarget::Node(NodeId::from("n1")), "ping", Bytes::new())
            .await
            .unwrap();
        assert!(report.all_delivered());
        assert!(transport.commands.recv().await.is_some());
    }

    #[tokio::test]
    async fn disconnect_reaches_topology_subscribers() {
        let hub = hub();
        let (handle, _transport) = hub
            .register_node(PoolId::from("p1"), NodeId::from("n1"), "worker-1")
            .unwrap();
        let mut rx = hub.subscribe_topology();
        let _ = rx.borrow_and_update();

        handle.close();
        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.pools[0].nodes[0].liveness, Liveness::Disconnected);
    }

    #[tokio::test]
    async fn status_report_lands_in_cache() {
        let hub = hub();
        let (_handle, _transport) = hub
            .register_node(PoolId::from("p1"), NodeId::from("n1"), "worker-1")
            .unwrap();

        hub.ingest_status(status_with_report("n1"));
        let snap = hub.get_status(&ScopeId::node(NodeId::from("n1"))).unwrap();
        assert_eq!(snap.rules[0].name, "audit");
    }

    #[tokio::test]
    async fn status_from_unknown_node_is_dropped() {
        let hub = hub();
        hub.ingest_status(status_with_report("ghost"));
        assert!(hub.get_status(&ScopeId::node(NodeId::from("ghost"))).is_none());
    }

    #[tokio::test]
    async fn presence_snapshot_event_precedes_updates() {
        let hub = hub();
        hub.presence_join(UserId::from("u1"), ScopeId::plane("plane-1"));

        let (snapshot, mut updates) = hub.subscribe_presence();
        assert_matches!(snapshot, PresenceEvent::Snapshot { users } if users.len() == 1);

        hub.presence_move(UserId::from("u1"), ScopeId::node(NodeId::from("n1")));
        assert_matches!(
            updates.recv().await.unwrap(),
            PresenceEvent::Update { .. }
        );
    }

    #[tokio::test]
    async fn transcript_submission_flows_end_to_end() {
        let hub = hub();
        let scope = ScopeId::node(NodeId::from("n1"));
        let sub = hub.join_transcript(&scope, None, None);
        let mut rx = sub.live;

        hub.submit(&scope, UserId::from("alice"), "status please").unwrap();
        let first = rx.recv().await.unwrap();
        assert_matches!(first, drover_core::transcript::TranscriptEvent::Entry(_));
    }

    #[tokio::test]
    async fn shutdown_refuses_new_work() {
        let hub = hub();
        hub.shutdown(Some(Duration::from_millis(200))).await;

        assert_matches!(
            hub.register_node(PoolId::from("p1"), NodeId::from("n1"), "w"),
            Err(HubError::ShuttingDown)
        );
        assert_matches!(
            hub.dispatch(CommandTarget::Broadcast, "ping", Bytes::new()).await,
            Err(HubError::ShuttingDown)
        );
        assert_matches!(
            hub.submit(&ScopeId::plane("plane-1"), UserId::from("u"), "x"),
            Err(HubError::ShuttingDown)
        );
    }
}
