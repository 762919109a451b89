//! Controlled operation identity and status.
//!
//! Every activity the scheduler can interleave (the entry point, each actor,
//! each spawned task, each armed timer) is one operation. Ids are dense and
//! allocated in creation order so identical schedules produce identical ids.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::runtime::resource::ResourceId;

/// Stable operation identifier.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    /// The test entry point.
    pub const ENTRY: OperationId = OperationId(0);

    #[inline(always)]
    pub const fn from_u64(id: u64) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Causal group tag, propagated through sends and creations.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OperationGroup(u64);

impl OperationGroup {
    /// Group of the entry point and everything it does not re-tag.
    pub const ROOT: OperationGroup = OperationGroup(0);

    #[inline(always)]
    pub const fn from_u64(id: u64) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Entry,
    Actor,
    Task,
    Timer,
}

/// Scheduling status, recomputed at every scheduling point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Enabled,
    /// Actor with nothing to dequeue. Not counted as blocked.
    Idle,
    BlockedOnReceive,
    BlockedOnResource(ResourceId),
    BlockedOnJoin(OperationId),
    Sleeping {
        until: u64,
    },
    Completed,
}

impl OperationStatus {
    #[inline(always)]
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Blocked statuses are the ones that make an empty schedule a deadlock.
    #[inline(always)]
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            Self::BlockedOnReceive | Self::BlockedOnResource(_) | Self::BlockedOnJoin(_)
        )
    }

    #[inline(always)]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => f.write_str("enabled"),
            Self::Idle => f.write_str("idle"),
            Self::BlockedOnReceive => f.write_str("waiting to receive an event"),
            Self::BlockedOnResource(res) => write!(f, "waiting for {res}"),
            Self::BlockedOnJoin(op) => write!(f, "joining {op}"),
            Self::Sleeping { until } => write!(f, "sleeping until tick {until}"),
            Self::Completed => f.write_str("completed"),
        }
    }
}

/// Static description of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub id: OperationId,
    pub kind: OperationKind,
    pub name: String,
    pub group: OperationGroup,
}
