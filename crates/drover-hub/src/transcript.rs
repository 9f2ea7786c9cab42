//! Session transcript hub.
//!
//! One append-only log per scope, with replay-then-live subscriptions.
//! Submissions are queued to a per-scope worker which appends the Ack and
//! the eventual Output (or a failure Notice) itself, so the two entries of
//! one submission are never interleaved with another submission's pair.
//! Every live event a subscriber sees originates from a log append made
//! under the log lock, which is what makes replay a pure suffix.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drover_core::transcript::{EntryKind, TranscriptEntry, TranscriptEvent};
use drover_core::{HubError, ScopeId, SubmissionId, UserId, now_ms};

use crate::config::TranscriptConfig;
use crate::evaluator::Evaluator;

/// A queued submission awaiting evaluation.
#[derive(Debug)]
struct Job {
    submission: SubmissionId,
    author: UserId,
    text: String,
}

#[derive(Debug)]
struct LogState {
    entries: VecDeque<TranscriptEntry>,
    /// Sequence the next append receives.
    next_seq: u64,
    /// Sequence of the oldest retained entry.
    first_seq: u64,
}

/// One scope's transcript log plus its submission queue.
struct ScopeLog {
    scope: ScopeId,
    state: Mutex<LogState>,
    tx: broadcast::Sender<TranscriptEvent>,
    work_tx: mpsc::Sender<Job>,
    retention: usize,
}

impl ScopeLog {
    /// Append an entry: assign the next sequence, evict past the retention
    /// window, and broadcast while still holding the lock so subscribers
    /// observe appends in log order.
    fn append(
        &self,
        kind: EntryKind,
        author: Option<UserId>,
        submission: Option<SubmissionId>,
        text: String,
    ) -> u64 {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let entry = TranscriptEntry {
            scope: self.scope.clone(),
            seq,
            kind,
            author,
            submission,
            text,
            ts_ms: now_ms(),
        };
        state.entries.push_back(entry.clone());
        while state.entries.len() > self.retention {
            state.entries.pop_front();
            state.first_seq += 1;
        }
        let _ = self.tx.send(TranscriptEvent::Entry(entry));
        seq
    }

    /// Replay suffix and live receiver, taken under one lock acquisition.
    fn join(&self, since_seq: Option<u64>) -> TranscriptSubscription {
        let state = self.state.lock();
        let requested_next = since_seq.map_or(1, |seq| seq.saturating_add(1));
        // only a real cursor can reference evicted entries; a fresh join
        // asks for whatever is retained and is never a gap
        let gap = since_seq.is_some() && requested_next < state.first_seq;
        let history: Vec<TranscriptEntry> = state
            .entries
            .iter()
            .filter(|entry| entry.seq >= requested_next)
            .cloned()
            .collect();
        let live = self.tx.subscribe();
        drop(state);
        TranscriptSubscription {
            history,
            gap,
            live,
            leave: None,
        }
    }
}

/// Appends the "left" notice when a named subscriber's subscription is
/// dropped.
struct LeaveNotice {
    log: Arc<ScopeLog>,
    user: UserId,
}

impl Drop for LeaveNotice {
    fn drop(&mut self) {
        let _ = self.log.append(
            EntryKind::Notice,
            Some(self.user.clone()),
            None,
            format!("{} left", self.user),
        );
    }
}

/// Replay chunk plus the live stream that continues it.
pub struct TranscriptSubscription {
    /// Retained entries after the requested cursor, in order.
    pub history: Vec<TranscriptEntry>,
    /// True when the cursor predates retention and entries were lost.
    pub gap: bool,
    /// Entries appended after the history chunk was cut.
    pub live: broadcast::Receiver<TranscriptEvent>,
    /// Set for named subscribers; appends the "left" notice on drop.
    leave: Option<LeaveNotice>,
}

impl TranscriptSubscription {
    /// The replay chunk as the event a subscriber is sent first.
    #[must_use]
    pub fn history_event(&self) -> TranscriptEvent {
        TranscriptEvent::History {
            entries: self.history.clone(),
            gap: self.gap,
        }
    }
}

/// Hub of per-scope transcript logs.
pub struct TranscriptHub {
    scopes: DashMap<ScopeId, Arc<ScopeLog>>,
    evaluator: Arc<dyn Evaluator>,
    config: TranscriptConfig,
    cancel: CancellationToken,
}

impl TranscriptHub {
    /// New hub; `cancel` stops every scope worker.
    #[must_use]
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        config: TranscriptConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            scopes: DashMap::new(),
            evaluator,
            config,
            cancel,
        })
    }

    /// Subscribe to a scope's transcript. `since_seq` is the highest
    /// sequence the subscriber already holds; `None` asks for everything
    /// retained. A named subscriber gets "joined"/"left" notices appended
    /// on its behalf; pass `None` for an anonymous observer.
    #[must_use]
    pub fn join(
        &self,
        scope: &ScopeId,
        user: Option<UserId>,
        since_seq: Option<u64>,
    ) -> TranscriptSubscription {
        let log = self.log_for(scope);
        let mut sub = log.join(since_seq);
        if sub.gap {
            debug!(scope = %scope, ?since_seq, "replay cursor predates retention");
        }
        if let Some(user) = user {
            // appended after the history cut, so the joiner sees their own
            // join as the first live entry
            let _ = log.append(
                EntryKind::Notice,
                Some(user.clone()),
                None,
                format!("{user} joined"),
            );
            sub.leave = Some(LeaveNotice { log, user });
        }
        sub
    }

    /// Queue a submission for evaluation.
    ///
    /// Acceptance here means queue admission only; the Ack entry is
    /// appended by the scope worker when it picks the job up. Returns
    /// [`HubError::Rejected`] when the scope's queue is full and
    /// [`HubError::ShuttingDown`] once shutdown has begun.
    pub fn submit(
        &self,
        scope: &ScopeId,
        author: UserId,
        text: impl Into<String>,
    ) -> Result<SubmissionId, HubError> {
        if self.cancel.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        let log = self.log_for(scope);
        let submission = SubmissionId::new();
        let job = Job {
            submission: submission.clone(),
            author,
            text: text.into(),
        };
        match log.work_tx.try_send(job) {
            Ok(()) => Ok(submission),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(scope = %scope, "submission queue full");
                Err(HubError::Rejected(scope.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HubError::ShuttingDown),
        }
    }

    /// Append an engine-initiated Notice to a scope's transcript.
    pub fn notice(&self, scope: &ScopeId, text: impl Into<String>) -> u64 {
        self.log_for(scope).append(EntryKind::Notice, None, None, text.into())
    }

    /// Number of scopes with a transcript log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether no scope has a transcript yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Get or create the scope's log, spawning its worker on creation.
    fn log_for(&self, scope: &ScopeId) -> Arc<ScopeLog> {
        if let Some(log) = self.scopes.get(scope) {
            return Arc::clone(&log);
        }
        let entry = self.scopes.entry(scope.clone()).or_insert_with(|| {
            info!(scope = %scope, "transcript opened");
            let (work_tx, work_rx) = mpsc::channel(self.config.queue_capacity);
            let (tx, _) = broadcast::channel(self.config.broadcast_capacity);
            let log = Arc::new(ScopeLog {
                scope: scope.clone(),
                state: Mutex::new(LogState {
                    entries: VecDeque::new(),
                    next_seq: 1,
                    first_seq: 1,
                }),
                tx,
                work_tx,
                retention: self.config.retention,
            });
            tokio::spawn(run_scope_worker(
                Arc::clone(&log),
                work_rx,
                Arc::clone(&self.evaluator),
                Duration::from_millis(self.config.eval_timeout_ms),
                self.cancel.clone(),
            ));
            log
        });
        Arc::clone(&entry)
    }
}

/// Drain one scope's submission queue in order: Ack, evaluate, Output or
/// Notice, then the next job. Serial by construction, so submission pairs
/// never interleave.
async fn run_scope_worker(
    log: Arc<ScopeLog>,
    mut work_rx: mpsc::Receiver<Job>,
    evaluator: Arc<dyn Evaluator>,
    eval_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            job = work_rx.recv() => match job {
                Some(job) => job,
                None => return,
            },
            () = cancel.cancelled() => {
                let dropped = work_rx.len();
                if dropped > 0 {
                    warn!(scope = %log.scope, dropped, "dropping queued submissions on shutdown");
                }
                debug!(scope = %log.scope, "transcript worker stopped");
                return;
            }
        };

        let _ = log.append(
            EntryKind::Ack,
            Some(job.author.clone()),
            Some(job.submission.clone()),
            job.text.clone(),
        );

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(
            eval_timeout,
            evaluator.evaluate(&log.scope, &job.text),
        )
        .await;
        match outcome {
            Ok(Ok(output)) => {
                let _ = log.append(EntryKind::Output, None, Some(job.submission), output);
            }
            Ok(Err(err)) => {
                let failure = HubError::EvaluationFailed {
                    scope: log.scope.clone(),
                    message: err.to_string(),
                };
                warn!(scope = %log.scope, %failure, "evaluation failed");
                let _ = log.append(EntryKind::Notice, None, Some(job.submission), failure.to_string());
            }
            Err(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let failure = HubError::EvaluationTimeout {
                    scope: log.scope.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                warn!(scope = %log.scope, %failure, "evaluation timed out");
                let _ = log.append(EntryKind::Notice, None, Some(job.submission), failure.to_string());
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
