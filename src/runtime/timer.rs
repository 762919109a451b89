//! Logical timers owned by actors.
//!
//! Each timer is its own controlled operation, enabled while armed. Firing
//! advances the logical clock to the timer's deadline and sends the timer
//! event to the owner's mailbox, so the delivery order relative to other
//! sends is a scheduling decision like any other.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HandlerResult;
use crate::event::{ActorId, Event, Message};
use crate::runtime::kernel::{Kernel, OpBody};
use crate::runtime::operation::{OperationId, OperationKind, OperationStatus};
use crate::runtime::snapshot::StateHasher;
use crate::scheduler::outcome::{Bug, BugKind};

/// Handle to a started timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(OperationId);

impl TimerId {
    /// Operation that fires this timer.
    pub fn operation(self) -> OperationId {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer@{}", self.0)
    }
}

pub(crate) struct TimerSlot<E: Event> {
    owner: OperationId,
    owner_actor: ActorId,
    event: E,
    deadline: u64,
    period: Option<u64>,
    armed: bool,
}

impl<E: Event> TimerSlot<E> {
    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }

    pub(crate) fn status(&self) -> OperationStatus {
        if self.armed {
            OperationStatus::Enabled
        } else {
            OperationStatus::Completed
        }
    }

    pub(crate) fn snapshot(&self, state: &mut StateHasher) {
        state.write(&self.owner);
        state.write(&self.armed);
        state.write(&self.deadline);
        state.write(&self.period);
        let _ = write!(state, "{:?}", self.event);
    }
}

fn misuse(kind: BugKind, owner: OperationId, message: String) -> Bug {
    Bug::new(kind, message).with_operations(vec![owner])
}

impl<E: Event> Kernel<E> {
    pub(crate) fn start_timer(
        &mut self,
        owner: OperationId,
        due: i64,
        period: Option<i64>,
        event: E,
    ) -> HandlerResult<TimerId> {
        if due < 0 {
            let message = format!("timer started with negative due time {due}");
            return Err(misuse(BugKind::TimerMisuse, owner, message).into());
        }
        let period = match period {
            Some(p) if p <= 0 => {
                let message = format!("periodic timer started with period {p}");
                return Err(misuse(BugKind::TimerMisuse, owner, message).into());
            }
            Some(p) => Some(p.unsigned_abs()),
            None => None,
        };
        let Some(owner_actor) = self.actor_id(owner).cloned() else {
            let message = format!("{owner} is not an actor and cannot own a timer");
            return Err(misuse(BugKind::IllegalAction, owner, message).into());
        };

        let deadline = self.clock.deadline(due.unsigned_abs());
        let kind = event.kind();
        let group = self.group_of(owner);
        let op = self.push_op(
            OperationKind::Timer,
            format!("timer({owner_actor}, {kind})"),
            group,
            OpBody::Timer(TimerSlot {
                owner,
                owner_actor,
                event,
                deadline,
                period,
                armed: true,
            }),
        );
        debug!(%op, %owner, deadline, ?period, "timer started");
        self.record(owner, format!("started timer {op} for {kind} at tick {deadline}"));
        Ok(TimerId(op))
    }

    /// Disarm `timer`. Stopping an already stopped timer is a no-op.
    pub(crate) fn stop_timer(&mut self, caller: OperationId, timer: TimerId) -> HandlerResult {
        let op = timer.operation();
        match self.ops.get_mut(op.index()).map(|slot| &mut slot.body) {
            Some(OpBody::Timer(slot)) if slot.owner == caller => {
                slot.armed = false;
            }
            Some(OpBody::Timer(slot)) => {
                let message = format!("{caller} stopped {timer}, which belongs to {}", slot.owner);
                return Err(misuse(BugKind::ResourceMisuse, caller, message).into());
            }
            _ => {
                let message = format!("{caller} stopped {timer}, which is not a timer");
                return Err(misuse(BugKind::ResourceMisuse, caller, message).into());
            }
        }
        debug!(%op, %caller, "timer stopped");
        self.record(caller, format!("stopped {timer}"));
        Ok(())
    }

    pub(crate) fn fire_timer(&mut self, op: OperationId) -> HandlerResult {
        let Some(OpBody::Timer(slot)) = self.ops.get_mut(op.index()).map(|slot| &mut slot.body)
        else {
            return Ok(());
        };
        if !slot.armed {
            return Ok(());
        }
        let deadline = slot.deadline;
        let event = slot.event.clone();
        let target = slot.owner_actor.clone();
        match slot.period {
            Some(period) => slot.deadline = deadline.saturating_add(period),
            None => slot.armed = false,
        }

        self.clock.advance_to(deadline);
        debug!(%op, to = %target, tick = deadline, "timer fired");
        self.send(op, &target, Message::Event(event))
    }

    /// Disarm every timer owned by `owner`.
    pub(crate) fn cancel_timers_of(&mut self, owner: OperationId) {
        for slot in &mut self.ops {
            if let OpBody::Timer(timer) = &mut slot.body {
                if timer.owner == owner && timer.armed {
                    timer.armed = false;
                    debug!(op = %slot.info.id, %owner, "timer cancelled");
                }
            }
        }
    }
}
