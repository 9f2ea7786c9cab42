//! Presence tracker.
//!
//! One scope per user at any time. All mutations and subscriptions go
//! through a single lock, so a subscriber's snapshot plus its delta stream
//! is gap-free: every user is accounted for exactly once at snapshot time,
//! and every later change arrives as exactly one update.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use drover_core::feed::{PresenceEntry, PresenceEvent, PresenceUpdateKind};
use drover_core::{ScopeId, UserId, now_ms};

/// Snapshot plus live updates for one subscriber.
#[derive(Debug)]
pub struct PresenceSubscription {
    /// Users present at subscription time.
    pub snapshot: Vec<PresenceEntry>,
    /// Updates after the snapshot, in order.
    pub updates: broadcast::Receiver<PresenceEvent>,
}

/// Tracks which scope each user is looking at.
#[derive(Debug)]
pub struct PresenceTracker {
    users: Mutex<HashMap<UserId, PresenceEntry>>,
    tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceTracker {
    /// Empty tracker with the given update fan-out capacity.
    #[must_use]
    pub fn new(broadcast_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(broadcast_capacity);
        Self {
            users: Mutex::new(HashMap::new()),
            tx,
        }
    }

    /// Record a user arriving at `scope`.
    ///
    /// An unknown user produces Joined; a user already elsewhere produces a
    /// single Moved (never a Left/Joined pair); a user already at `scope`
    /// refreshes the timestamp without emitting anything.
    pub fn join(&self, user_id: UserId, scope: ScopeId) {
        let mut users = self.users.lock();
        let entry = PresenceEntry {
            user_id: user_id.clone(),
            scope: scope.clone(),
            last_seen_ms: now_ms(),
        };
        match users.insert(user_id.clone(), entry.clone()) {
            None => {
                debug!(user_id = %user_id, scope = %scope, "user joined");
                self.emit(PresenceUpdateKind::Joined, entry);
            }
            Some(prior) if prior.scope != scope => {
                debug!(user_id = %user_id, from = %prior.scope, to = %scope, "user moved");
                self.emit(PresenceUpdateKind::Moved, entry);
            }
            Some(_) => {} // same scope, timestamp refresh only
        }
    }

    /// Record a user navigating to `scope`. Same transition rules as
    /// [`join`](Self::join); kept separate so call sites read naturally.
    pub fn move_to(&self, user_id: UserId, scope: ScopeId) {
        self.join(user_id, scope);
    }

    /// Record a user departing. Unknown users are ignored.
    pub fn leave(&self, user_id: &UserId) {
        let mut users = self.users.lock();
        if let Some(entry) = users.remove(user_id) {
            debug!(user_id = %user_id, "user left");
            self.emit(PresenceUpdateKind::Left, entry);
        }
    }

    /// Everyone currently present.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        let users = self.users.lock();
        let mut entries: Vec<PresenceEntry> = users.values().cloned().collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        entries
    }

    /// Subscribe: snapshot and receiver are taken under the same lock, so
    /// the delta stream begins exactly where the snapshot ends.
    #[must_use]
    pub fn subscribe(&self) -> PresenceSubscription {
        let users = self.users.lock();
        let mut snapshot: Vec<PresenceEntry> = users.values().cloned().collect();
        snapshot.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let updates = self.tx.subscribe();
        drop(users);
        PresenceSubscription { snapshot, updates }
    }

    // callers hold the users lock, keeping snapshot/update ordering exact
    fn emit(&self, kind: PresenceUpdateKind, entry: PresenceEntry) {
        let _ = self.tx.send(PresenceEvent::Update { kind, entry });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
