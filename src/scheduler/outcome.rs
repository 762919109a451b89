//! Bug classification and per-iteration results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::ActorId;
use crate::runtime::operation::OperationId;
use crate::scheduler::trace::{LogEntry, Trace};

/// Final classification of one iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Success,
    AssertionFailure,
    Deadlock,
    LivenessViolation,
    DepthBoundExceeded,
}

impl Verdict {
    #[inline(always)]
    pub fn is_bug(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Iteration-fatal failure classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BugKind {
    Assertion,
    UnhandledEvent,
    TimerMisuse,
    ResourceMisuse,
    ActorIdConflict,
    UnboundActorId,
    UnknownActorId,
    UnknownState,
    IllegalAction,
    Panic,
    Deadlock,
    Liveness,
    DepthBound,
}

impl BugKind {
    pub fn verdict(self) -> Verdict {
        match self {
            Self::Deadlock => Verdict::Deadlock,
            Self::Liveness => Verdict::LivenessViolation,
            Self::DepthBound => Verdict::DepthBoundExceeded,
            _ => Verdict::AssertionFailure,
        }
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Assertion => "assertion failed",
            Self::UnhandledEvent => "unhandled event",
            Self::TimerMisuse => "timer misuse",
            Self::ResourceMisuse => "resource misuse",
            Self::ActorIdConflict => "actor id conflict",
            Self::UnboundActorId => "unbound actor id",
            Self::UnknownActorId => "unknown actor id",
            Self::UnknownState => "unknown state",
            Self::IllegalAction => "illegal action",
            Self::Panic => "panic",
            Self::Deadlock => "deadlock",
            Self::Liveness => "liveness violation",
            Self::DepthBound => "depth bound exceeded",
        };
        f.write_str(name)
    }
}

/// A bug found during one iteration.
///
/// `step` and `operations` are completed by the scheduler when the bug
/// surfaces: the step it was raised at and, if the raiser did not name any,
/// the operation that was running.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Bug {
    pub kind: BugKind,
    pub message: String,
    pub step: u64,
    pub operations: Vec<OperationId>,
}

impl Bug {
    pub fn new(kind: BugKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            step: 0,
            operations: Vec::new(),
        }
    }

    pub fn with_operations(mut self, operations: Vec<OperationId>) -> Self {
        self.operations = operations;
        self
    }

    #[inline(always)]
    pub fn verdict(&self) -> Verdict {
        self.kind.verdict()
    }
}

/// An event that was never delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedEvent {
    pub target: ActorId,
    pub kind: String,
    pub sender: OperationId,
    pub step: u64,
}

/// Everything observed about one iteration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub iteration: u64,
    pub verdict: Verdict,
    pub bug: Option<Bug>,
    pub trace: Trace,
    pub steps: u64,
    /// `max_steps` was reached without a bug.
    pub bound_reached: bool,
    /// DFS state caching cut the iteration short.
    pub pruned: bool,
    pub dropped: Vec<DroppedEvent>,
    pub log: Vec<LogEntry>,
    pub clock: u64,
}

impl IterationOutcome {
    #[inline(always)]
    pub fn is_bug(&self) -> bool {
        self.verdict.is_bug()
    }

    pub fn bug_kind(&self) -> Option<BugKind> {
        self.bug.as_ref().map(|bug| bug.kind)
    }
}
