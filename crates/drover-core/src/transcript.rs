//! Transcript log entries and subscriber events.
//!
//! Each scope owns an append-only, strictly ordered log of
//! [`TranscriptEntry`] values; `seq` is the replay cursor. Entries are never
//! mutated or deleted within the retention window; once the window is
//! exceeded the oldest entries are dropped first.

use serde::{Deserialize, Serialize};

use crate::ids::{SubmissionId, UserId};
use crate::scope::ScopeId;

/// What a transcript entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Replayed history marker (only used inside history chunks).
    History,
    /// Evaluator output for a submission.
    Output,
    /// Engine-initiated or failure-reporting message.
    Notice,
    /// Acceptance of a submission for execution.
    Ack,
}

/// One entry in a scope's transcript log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    /// Owning scope.
    pub scope: ScopeId,
    /// Monotonically increasing sequence number within the scope.
    pub seq: u64,
    /// Entry kind.
    pub kind: EntryKind,
    /// Author, when the entry originates from a user's submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserId>,
    /// Submission this entry belongs to (`Ack` and `Output` entries).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionId>,
    /// Entry text.
    pub text: String,
    /// Hub-side timestamp in milliseconds.
    pub ts_ms: u64,
}

/// Event delivered to a transcript subscriber.
///
/// A subscriber first receives one [`TranscriptEvent::History`] chunk (the
/// gap-free replay suffix starting after its `since_seq`), then live
/// [`TranscriptEvent::Entry`] values in log order. Replay is a pure suffix
/// of the same log a live subscriber would have observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TranscriptEvent {
    /// Replay chunk.
    History {
        /// Entries with `seq` greater than the requested cursor.
        entries: Vec<TranscriptEntry>,
        /// True when the requested cursor was already evicted and the chunk
        /// starts at the log's current earliest entry instead.
        gap: bool,
    },
    /// A live appended entry.
    Entry(TranscriptEntry),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
