//! Spawned tasks: concurrent activities outside the actor model.
//!
//! A task is an explicit state machine. Each scheduled step calls
//! [`Task::step`] once; the task yields or finishes. Blocking calls on
//! [`TaskContext`] (`acquire`, `join`, `sleep`) record a resumption condition
//! and the task is expected to yield right after. It is not scheduled again
//! until the condition holds, and then retries from its own saved state.

use tracing::debug;

use crate::error::{ExecutionError, HandlerResult};
use crate::event::Event;
use crate::runtime::kernel::{runtime_api, Kernel, OpBody};
use crate::runtime::operation::{OperationId, OperationKind, OperationStatus};
use crate::runtime::resource::{Acquirable, ResourceId};
use crate::runtime::snapshot::StateHasher;
use crate::scheduler::outcome::{Bug, BugKind};

/// Result of one task step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStep {
    /// Run again later.
    Yield,
    Done,
}

pub trait Task<E: Event>: 'static {
    fn step(&mut self, cx: &mut TaskContext<'_, E>) -> HandlerResult<TaskStep>;

    fn snapshot(&self, _state: &mut StateHasher) {}
}

/// Task driven by a closure.
pub struct FnTask<F>(F);

impl<F> FnTask<F> {
    pub fn new(step: F) -> Self {
        Self(step)
    }
}

impl<E, F> Task<E> for FnTask<F>
where
    E: Event,
    F: FnMut(&mut TaskContext<'_, E>) -> HandlerResult<TaskStep> + 'static,
{
    fn step(&mut self, cx: &mut TaskContext<'_, E>) -> HandlerResult<TaskStep> {
        (self.0)(cx)
    }
}

/// Why a yielded task cannot run yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TaskBlock {
    Resource(ResourceId),
    Join(OperationId),
    Sleep(u64),
}

pub(crate) struct TaskSlot<E: Event> {
    /// `None` only while the task is running.
    task: Option<Box<dyn Task<E>>>,
    block: Option<TaskBlock>,
    done: bool,
}

impl<E: Event> TaskSlot<E> {
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn snapshot(&self, state: &mut StateHasher) {
        state.write(&self.done);
        state.write(&self.block);
        if let Some(task) = &self.task {
            task.snapshot(state);
        }
    }
}

/// API available to task steps.
pub struct TaskContext<'a, E: Event> {
    kernel: &'a mut Kernel<E>,
    op: OperationId,
    block: Option<TaskBlock>,
}

impl<'a, E: Event> TaskContext<'a, E> {
    runtime_api!(E);

    /// Acquire `resource`, or register to be woken when it frees.
    ///
    /// On `Ok(false)` the task must yield and call `acquire` again when it
    /// is next scheduled.
    pub fn acquire(&mut self, resource: impl Acquirable) -> HandlerResult<bool> {
        let res = resource.resource();
        let result = self
            .kernel
            .resources
            .try_acquire(res, self.op)
            .map_err(ExecutionError::from);
        if self.kernel.latch(result)? {
            return Ok(true);
        }
        self.block = Some(TaskBlock::Resource(res));
        Ok(false)
    }

    /// Whether `target` has completed. If not, the task is woken once it has.
    pub fn join(&mut self, target: OperationId) -> HandlerResult<bool> {
        if target == self.op || self.kernel.info(target).is_none() {
            let bug = Bug::new(
                BugKind::IllegalAction,
                format!("{} cannot join {target}", self.op),
            );
            return self.kernel.latch(Err(bug.into()));
        }
        if self.kernel.is_finished(target) {
            return Ok(true);
        }
        self.block = Some(TaskBlock::Join(target));
        Ok(false)
    }

    /// Sleep for `ticks` of logical time. The task must yield.
    pub fn sleep(&mut self, ticks: u64) {
        let until = self.kernel.clock.deadline(ticks);
        self.block = Some(TaskBlock::Sleep(until));
    }
}

impl<E: Event> Kernel<E> {
    pub(crate) fn spawn_task(
        &mut self,
        creator: OperationId,
        name: &str,
        task: Box<dyn Task<E>>,
    ) -> OperationId {
        let group = self.group_of(creator);
        let op = self.push_op(
            OperationKind::Task,
            name.to_string(),
            group,
            OpBody::Task(TaskSlot {
                task: Some(task),
                block: None,
                done: false,
            }),
        );
        debug!(task = name, %op, %creator, "task spawned");
        self.record(creator, format!("spawned task {name} as {op}"));
        op
    }

    fn task_slot_mut(&mut self, op: OperationId) -> Option<&mut TaskSlot<E>> {
        match self.ops.get_mut(op.index()).map(|slot| &mut slot.body) {
            Some(OpBody::Task(task)) => Some(task),
            _ => None,
        }
    }

    pub(crate) fn step_task(&mut self, op: OperationId) -> HandlerResult {
        let Some(slot) = self.task_slot_mut(op) else {
            return Ok(());
        };
        if slot.done {
            return Ok(());
        }
        slot.block = None;
        let Some(mut task) = slot.task.take() else {
            return Ok(());
        };

        let mut cx = TaskContext {
            kernel: &mut *self,
            op,
            block: None,
        };
        let step = task.step(&mut cx)?;
        let block = cx.block;

        match step {
            TaskStep::Yield => {
                if let Some(slot) = self.task_slot_mut(op) {
                    slot.task = Some(task);
                    slot.block = block;
                }
            }
            TaskStep::Done => {
                if let Some(slot) = self.task_slot_mut(op) {
                    slot.done = true;
                }
                let freed = self.resources.release_all(op);
                if !freed.is_empty() {
                    debug!(%op, released = freed.len(), "finished task released resources");
                }
                debug!(%op, "task done");
                self.record(op, "task done".to_string());
            }
        }
        Ok(())
    }

    pub(crate) fn task_status(&self, task: &TaskSlot<E>) -> OperationStatus {
        if task.done {
            return OperationStatus::Completed;
        }
        match task.block {
            None => OperationStatus::Enabled,
            Some(TaskBlock::Resource(res)) => {
                if self.resources.can_acquire(res) {
                    OperationStatus::Enabled
                } else {
                    OperationStatus::BlockedOnResource(res)
                }
            }
            Some(TaskBlock::Join(target)) => {
                if self.is_finished(target) {
                    OperationStatus::Enabled
                } else {
                    OperationStatus::BlockedOnJoin(target)
                }
            }
            Some(TaskBlock::Sleep(until)) => {
                if self.clock.now() >= until {
                    OperationStatus::Enabled
                } else {
                    OperationStatus::Sleeping { until }
                }
            }
        }
    }

    /// Completion test used by joins. Does not recurse into other statuses,
    /// so join cycles show up as a deadlock.
    pub(crate) fn is_finished(&self, op: OperationId) -> bool {
        match self.ops.get(op.index()).map(|slot| &slot.body) {
            None => false,
            Some(OpBody::Entry) => true,
            Some(OpBody::Actor(actor)) => actor.halted,
            Some(OpBody::Task(task)) => task.is_done(),
            Some(OpBody::Timer(timer)) => !timer.is_armed(),
        }
    }
}
