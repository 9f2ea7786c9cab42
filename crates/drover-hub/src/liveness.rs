//! Liveness sweep loop.
//!
//! Periodically compares each connected session's last status timestamp
//! against the hub clock and flips quiet sessions to Disconnected. The
//! session entry itself survives the flip so operators still see the node,
//! and a later status report revives it without re-registration.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use drover_core::now_ms;

use crate::registry::NodeRegistry;

/// Run the sweep until `cancel` fires. The first tick is consumed
/// immediately so a freshly started hub never flips nodes that have not
/// had a full staleness window to report.
pub async fn run_liveness_sweep(
    registry: Arc<NodeRegistry>,
    interval: Duration,
    staleness: Duration,
    cancel: CancellationToken,
) {
    info!(interval_ms = interval.as_millis() as u64, staleness_ms = staleness.as_millis() as u64, "liveness sweep started");
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stale = registry.stale_nodes(staleness, now_ms());
                if !stale.is_empty() {
                    debug!(count = stale.len(), "sweep found quiet nodes");
                }
                for node_id in stale {
                    registry.mark_stale(&node_id);
                }
            }
            () = cancel.cancelled() => {
                info!("liveness sweep stopped");
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::link;
    use drover_core::NodeId;
    use drover_core::protocol::{Liveness, Status};

    fn fresh_status(id: &str) -> Status {
        Status {
            node_id: NodeId::from(id),
            ok: true,
            info: String::new(),
            ts_ms: now_ms(),
            report: None,
        }
    }

    #[tokio::test]
    async fn sweep_flips_quiet_node_and_spares_reporting_one() {
        let registry = NodeRegistry::new(Duration::from_millis(100));
        let (quiet_link, _qt) = link(8);
        let _qh = registry.register(NodeId::from("quiet"), quiet_link);
        let (fresh_link, _ft) = link(8);
        let _fh = registry.register(NodeId::from("fresh"), fresh_link);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_liveness_sweep(
            Arc::clone(&registry),
            Duration::from_millis(10),
            Duration::from_millis(50),
            cancel.clone(),
        ));
        let refresher = {
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while !cancel.is_cancelled() {
                    registry.ingest_status(&fresh_status("fresh"));
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
        };

        // quiet never reports, so within a few sweeps it must flip
        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        task.await.unwrap();
        refresher.await.unwrap();

        let quiet = registry.get(&NodeId::from("quiet")).unwrap();
        assert_eq!(quiet.liveness(), Liveness::Disconnected);
        let fresh = registry.get(&NodeId::from("fresh")).unwrap();
        assert_eq!(fresh.liveness(), Liveness::Connected);
    }

    #[tokio::test]
    async fn sweep_stops_on_cancel() {
        let registry = NodeRegistry::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_liveness_sweep(
            registry,
            Duration::from_millis(10),
            Duration::from_millis(50),
            cancel.clone(),
        ));
        cancel.cancel();
        task.await.unwrap();
    }
}
