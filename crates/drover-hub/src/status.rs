//! Status cache.
//!
//! Last-write-wins cache of the most recent status report per scope.
//! Readers get a cheap `Arc` clone of the whole snapshot; writers replace
//! it wholesale, never merge field by field.

use std::sync::Arc;

use dashmap::DashMap;

use drover_core::ScopeId;
use drover_core::protocol::{RuleStatus, VarStatus};

/// One cached report, timestamped with hub receipt time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Scope the report describes.
    pub scope: ScopeId,
    /// Rule states the agent reported.
    pub rules: Vec<RuleStatus>,
    /// Variable states the agent reported.
    pub vars: Vec<VarStatus>,
    /// Hub receipt time, ms.
    pub ts_ms: u64,
}

/// Per-scope snapshot store.
#[derive(Debug, Default)]
pub struct StatusCache {
    snapshots: DashMap<ScopeId, Arc<StatusSnapshot>>,
}

impl StatusCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot for a scope, if any report has arrived.
    #[must_use]
    pub fn get(&self, scope: &ScopeId) -> Option<Arc<StatusSnapshot>> {
        self.snapshots.get(scope).map(|entry| Arc::clone(&entry))
    }

    /// Replace the scope's snapshot.
    pub fn put(&self, snapshot: StatusSnapshot) {
        self.snapshots
            .insert(snapshot.scope.clone(), Arc::new(snapshot));
    }

    /// Number of scopes with a cached report.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether no reports have been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
