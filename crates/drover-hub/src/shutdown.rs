//! Orderly shutdown across hub background tasks.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for tracked tasks before giving up on them.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the hub's cancellation token and the background tasks bound to it.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    /// Fresh coordinator, nothing cancelled, nothing tracked.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Child token for a task that must stop when the hub stops.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Track a spawned task so drain waits for it.
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Signal shutdown without waiting.
    pub fn begin(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait up to `timeout` for tracked tasks; tasks
    /// still running after the deadline are left to the runtime.
    pub async fn drain(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.begin();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        info!(tasks = handles.len(), timeout_ms = timeout.as_millis() as u64, "draining hub tasks");

        let all = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!("drain deadline passed with tasks still running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clean() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn begin_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let a = coord.token();
        let b = coord.token();
        coord.begin();
        coord.begin(); // idempotent
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_tracked_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        coord.track(tokio::spawn(async move {
            token.cancelled().await;
        }));

        coord.drain(None).await;
        assert!(coord.is_shutting_down());
        assert!(coord.tasks.lock().is_empty());
    }

    #[tokio::test]
    async fn drain_gives_up_on_stubborn_tasks() {
        let coord = ShutdownCoordinator::new();
        coord.track(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));

        coord.drain(Some(Duration::from_millis(50))).await;
        assert!(coord.is_shutting_down());
    }
}
