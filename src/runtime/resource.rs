//! Runtime-modeled resources: locks, counting semaphores, shared counters.
//!
//! Resources never block the host thread. An operation that cannot acquire
//! is parked with status `BlockedOnResource`; the scheduler re-evaluates the
//! table at the next scheduling point, so releasing a resource makes every
//! waiter enabled at once and the strategy picks which one acquires.
//!
//! Invariants:
//! - A lock has at most one owner and is not reentrant.
//! - A semaphore never has more permits out than it was created with.
//! - Only holders may release; anything else is `ResourceMisuse`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::runtime::operation::OperationId;
use crate::runtime::snapshot::StateHasher;
use crate::scheduler::outcome::{Bug, BugKind};

/// Identifier of a lock or semaphore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u32);

impl ResourceId {
    #[inline(always)]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

/// Handle to a mutual-exclusion lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LockId(ResourceId);

/// Handle to a counting semaphore.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SemaphoreId(ResourceId);

/// Handle to a shared integer cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CounterId(u32);

/// Resources an operation can wait on.
pub trait Acquirable: Copy {
    fn resource(self) -> ResourceId;
}

impl Acquirable for LockId {
    fn resource(self) -> ResourceId {
        self.0
    }
}

impl Acquirable for SemaphoreId {
    fn resource(self) -> ResourceId {
        self.0
    }
}

#[derive(Clone, Debug)]
enum Resource {
    Lock {
        owner: Option<OperationId>,
    },
    Semaphore {
        capacity: u32,
        in_use: u32,
        holders: BTreeMap<OperationId, u32>,
    },
}

/// Per-iteration resource state.
#[derive(Clone, Debug, Default)]
pub(crate) struct ResourceTable {
    resources: Vec<Resource>,
    counters: Vec<i64>,
}

impl ResourceTable {
    pub(crate) fn new_lock(&mut self) -> LockId {
        LockId(self.push(Resource::Lock { owner: None }))
    }

    pub(crate) fn new_semaphore(&mut self, capacity: u32) -> SemaphoreId {
        SemaphoreId(self.push(Resource::Semaphore {
            capacity,
            in_use: 0,
            holders: BTreeMap::new(),
        }))
    }

    fn push(&mut self, resource: Resource) -> ResourceId {
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(resource);
        id
    }

    /// Whether `op` could acquire `res` right now.
    pub(crate) fn can_acquire(&self, res: ResourceId) -> bool {
        match self.resources.get(res.index()) {
            Some(Resource::Lock { owner }) => owner.is_none(),
            Some(Resource::Semaphore {
                capacity, in_use, ..
            }) => in_use < capacity,
            None => false,
        }
    }

    /// Acquire if free. `Ok(false)` means the caller must block.
    pub(crate) fn try_acquire(&mut self, res: ResourceId, op: OperationId) -> Result<bool, Bug> {
        match self.resources.get_mut(res.index()) {
            Some(Resource::Lock { owner }) => match owner {
                Some(_) => Ok(false),
                None => {
                    *owner = Some(op);
                    Ok(true)
                }
            },
            Some(Resource::Semaphore {
                capacity,
                in_use,
                holders,
            }) => {
                if *in_use >= *capacity {
                    return Ok(false);
                }
                *in_use += 1;
                *holders.entry(op).or_insert(0) += 1;
                Ok(true)
            }
            None => Err(unknown_resource(res, op)),
        }
    }

    pub(crate) fn release(&mut self, res: ResourceId, op: OperationId) -> Result<(), Bug> {
        match self.resources.get_mut(res.index()) {
            Some(Resource::Lock { owner }) => {
                if *owner != Some(op) {
                    let held_by = owner.map_or_else(|| "nobody".to_string(), |o| o.to_string());
                    return Err(Bug::new(
                        BugKind::ResourceMisuse,
                        format!("{op} released {res}, which is held by {held_by}"),
                    )
                    .with_operations(vec![op]));
                }
                *owner = None;
                Ok(())
            }
            Some(Resource::Semaphore {
                in_use, holders, ..
            }) => {
                let Some(count) = holders.get_mut(&op).filter(|c| **c > 0) else {
                    return Err(Bug::new(
                        BugKind::ResourceMisuse,
                        format!("{op} released more permits of {res} than it acquired"),
                    )
                    .with_operations(vec![op]));
                };
                *count -= 1;
                if *count == 0 {
                    holders.remove(&op);
                }
                *in_use = in_use.saturating_sub(1);
                Ok(())
            }
            None => Err(unknown_resource(res, op)),
        }
    }

    /// Release everything `op` holds. Returns the freed resources.
    pub(crate) fn release_all(&mut self, op: OperationId) -> Vec<ResourceId> {
        let mut freed = Vec::new();
        for (idx, resource) in self.resources.iter_mut().enumerate() {
            match resource {
                Resource::Lock { owner } if *owner == Some(op) => {
                    *owner = None;
                    freed.push(ResourceId(idx as u32));
                }
                Resource::Semaphore {
                    in_use, holders, ..
                } => {
                    if let Some(count) = holders.remove(&op) {
                        *in_use = in_use.saturating_sub(count);
                        freed.push(ResourceId(idx as u32));
                    }
                }
                _ => {}
            }
        }
        freed
    }

    /// Current holders of `res`, in id order.
    pub(crate) fn holders(&self, res: ResourceId) -> Vec<OperationId> {
        match self.resources.get(res.index()) {
            Some(Resource::Lock { owner }) => owner.iter().copied().collect(),
            Some(Resource::Semaphore { holders, .. }) => holders.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn new_counter(&mut self, initial: i64) -> CounterId {
        let id = CounterId(self.counters.len() as u32);
        self.counters.push(initial);
        id
    }

    pub(crate) fn counter(&mut self, id: CounterId) -> Result<&mut i64, Bug> {
        self.counters.get_mut(id.0 as usize).ok_or_else(|| {
            Bug::new(
                BugKind::ResourceMisuse,
                format!("counter#{} does not exist in this iteration", id.0),
            )
        })
    }

    pub(crate) fn snapshot(&self, state: &mut StateHasher) {
        for resource in &self.resources {
            match resource {
                Resource::Lock { owner } => {
                    state.write_u64(0);
                    state.write(owner);
                }
                Resource::Semaphore {
                    in_use, holders, ..
                } => {
                    state.write_u64(1);
                    state.write_u64(u64::from(*in_use));
                    for (op, count) in holders {
                        state.write(op);
                        state.write_u64(u64::from(*count));
                    }
                }
            }
        }
        for value in &self.counters {
            state.write(value);
        }
    }
}

fn unknown_resource(res: ResourceId, op: OperationId) -> Bug {
    Bug::new(
        BugKind::ResourceMisuse,
        format!("{op} used {res}, which does not exist in this iteration"),
    )
    .with_operations(vec![op])
}
