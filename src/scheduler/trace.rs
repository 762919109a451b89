//! Schedule traces and the bounded execution log.
//!
//! A [`Trace`] is the complete, ordered record of every decision taken in an
//! iteration: which operation ran at each scheduling point, and every
//! boolean or integer choice. Replaying the trace reproduces the iteration.
//!
//! The [`EventLog`] is forensic only. It keeps the most recent runtime events
//! in a fixed-capacity ring; when full, the oldest entries are evicted first.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::runtime::operation::OperationId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionKind {
    /// `value` is the id of the operation that was scheduled.
    Schedule,
    /// `value` is 0 or 1.
    Boolean,
    /// `value` is in `[0, max)`.
    Integer { max: u64 },
    /// The iteration was pruned at this scheduling point. Always last.
    Prune,
}

/// One recorded decision.
///
/// For schedule decisions `operation` is the operation that was running
/// when the scheduling point was reached; for choices it is the chooser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decision {
    pub operation: OperationId,
    #[serde(flatten)]
    pub kind: DecisionKind,
    pub value: u64,
}

impl Decision {
    pub fn schedule(current: OperationId, chosen: OperationId) -> Self {
        Self {
            operation: current,
            kind: DecisionKind::Schedule,
            value: chosen.as_u64(),
        }
    }

    pub fn boolean(chooser: OperationId, value: bool) -> Self {
        Self {
            operation: chooser,
            kind: DecisionKind::Boolean,
            value: u64::from(value),
        }
    }

    pub fn integer(chooser: OperationId, max: u64, value: u64) -> Self {
        Self {
            operation: chooser,
            kind: DecisionKind::Integer { max },
            value,
        }
    }

    /// Marker for an iteration cut short at a revisited state.
    pub fn prune(current: OperationId) -> Self {
        Self {
            operation: current,
            kind: DecisionKind::Prune,
            value: 0,
        }
    }

    /// Whether this is the terminal prune marker.
    pub fn is_prune(&self) -> bool {
        self.kind == DecisionKind::Prune
    }

    /// The scheduled operation, for schedule decisions.
    pub fn scheduled(&self) -> Option<OperationId> {
        matches!(self.kind, DecisionKind::Schedule).then(|| OperationId::from_u64(self.value))
    }
}

/// Ordered decisions of one iteration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    decisions: Vec<Decision>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_decisions(decisions: Vec<Decision>) -> Self {
        Self { decisions }
    }

    #[inline(always)]
    pub fn push(&mut self, decision: Decision) {
        self.decisions.push(decision);
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Decision> {
        self.decisions.get(idx)
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn truncate(&mut self, len: usize) {
        self.decisions.truncate(len);
    }

    /// Number of schedule decisions (the iteration's step count).
    pub fn schedule_steps(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d.kind, DecisionKind::Schedule))
            .count()
    }
}

/// Compute a stable 64-bit hash of the trace decisions.
///
/// This is used to sanity-check replay determinism without comparing the
/// entire trace.
pub fn trace_hash(trace: &Trace) -> u64 {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for decision in &trace.decisions {
        hasher.update(format!("{decision:?}").as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(out)
}

/// One execution log line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step: u64,
    pub operation: OperationId,
    pub message: String,
}

/// Fixed-capacity ring of recent log entries.
#[derive(Clone, Debug)]
pub(crate) struct EventLog {
    cap: usize,
    buf: VecDeque<LogEntry>,
}

impl EventLog {
    /// Create a log with at least one slot.
    pub(crate) fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            buf: VecDeque::with_capacity(cap.min(1024)),
        }
    }

    #[inline(always)]
    pub(crate) fn push(&mut self, entry: LogEntry) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(entry);
    }

    /// Snapshot the ring contents in chronological order.
    pub(crate) fn dump(&self) -> Vec<LogEntry> {
        self.buf.iter().cloned().collect()
    }
}
