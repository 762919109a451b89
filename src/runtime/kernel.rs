//! Per-iteration runtime state and the operations every context shares.
//!
//! A fresh [`Kernel`] is built for each iteration and threaded through every
//! context (`TestContext`, `ActorContext`, `TaskContext`) by `&mut`. Nothing
//! here is global, so independent explorations can run side by side.
//!
//! Invariants:
//! - `ops[i].info.id == OperationId(i)`; ids are never reused in an iteration.
//! - An actor's instance is taken out of its slot only while it runs.
//! - ActorId values are allocated in creation order, starting at 1.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::actor::machine::{ActorHost, ActorInstance, ActorStep, Machine, MachineInstance};
use crate::actor::mailbox::Mailbox;
use crate::actor::schema::{Schema, SchemaCache, SchemaError, Temperature};
use crate::engine::config::TestConfig;
use crate::error::{ExecutionError, HandlerResult};
use crate::event::{short_type_name, ActorId, Envelope, Event, Message};
use crate::monitor::{Monitor, MonitorHost, MonitorInstance, MonitorSlot};
use crate::runtime::clock::LogicalClock;
use crate::runtime::operation::{
    OperationGroup, OperationId, OperationInfo, OperationKind, OperationStatus,
};
use crate::runtime::resource::ResourceTable;
use crate::runtime::snapshot::StateHasher;
use crate::runtime::task::TaskSlot;
use crate::runtime::timer::TimerSlot;
use crate::scheduler::outcome::{Bug, BugKind, DroppedEvent};
use crate::scheduler::trace::{Decision, EventLog, LogEntry, Trace};
use crate::strategy::Strategy;

/// Bounds copied from the test configuration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Limits {
    pub(crate) max_steps: u64,
    pub(crate) liveness_threshold: u64,
    pub(crate) report_depth_bound: bool,
}

pub(crate) struct ActorSlot<E: Event> {
    pub(crate) id: ActorId,
    pub(crate) mailbox: Mailbox<E>,
    pub(crate) instance: Option<Box<dyn ActorInstance<E>>>,
    pub(crate) halted: bool,
}

pub(crate) enum OpBody<E: Event> {
    Entry,
    Actor(ActorSlot<E>),
    Task(TaskSlot<E>),
    Timer(TimerSlot<E>),
}

pub(crate) struct OpSlot<E: Event> {
    pub(crate) info: OperationInfo,
    pub(crate) body: OpBody<E>,
}

#[derive(Clone, Copy, Debug)]
enum ActorBinding {
    /// Allocated by `create_actor_id`, not yet bound to an instance.
    Reserved,
    Bound(OperationId),
}

pub(crate) struct Kernel<E: Event> {
    pub(crate) strategy: Box<dyn Strategy>,
    pub(crate) schemas: SchemaCache,
    pub(crate) limits: Limits,
    pub(crate) ops: Vec<OpSlot<E>>,
    actors: BTreeMap<u64, ActorBinding>,
    next_actor: u64,
    next_group: u64,
    pub(crate) resources: ResourceTable,
    pub(crate) monitors: Vec<Box<dyn MonitorSlot<E>>>,
    pub(crate) clock: LogicalClock,
    pub(crate) trace: Trace,
    pub(crate) log: EventLog,
    pub(crate) dropped: Vec<DroppedEvent>,
    /// Schedule steps taken so far.
    pub(crate) step: u64,
    /// Operation that ran last.
    pub(crate) current: OperationId,
    /// First error raised through a context in the current step.
    failure: Option<ExecutionError>,
}

impl<E: Event> Kernel<E> {
    pub(crate) fn new(
        strategy: Box<dyn Strategy>,
        schemas: SchemaCache,
        config: &TestConfig,
    ) -> Self {
        let entry = OpSlot {
            info: OperationInfo {
                id: OperationId::ENTRY,
                kind: OperationKind::Entry,
                name: "entry".to_string(),
                group: OperationGroup::ROOT,
            },
            body: OpBody::Entry,
        };
        Self {
            strategy,
            schemas,
            limits: Limits {
                max_steps: config.max_steps,
                liveness_threshold: config.liveness_temperature_threshold,
                report_depth_bound: config.report_depth_bound,
            },
            ops: vec![entry],
            actors: BTreeMap::new(),
            next_actor: 1,
            next_group: 1,
            resources: ResourceTable::default(),
            monitors: Vec::new(),
            clock: LogicalClock::new(),
            trace: Trace::new(),
            log: EventLog::new(config.log_capacity),
            dropped: Vec::new(),
            step: 0,
            current: OperationId::ENTRY,
            failure: None,
        }
    }

    /// Hand the cross-iteration state back to the engine.
    pub(crate) fn into_parts(self) -> (Box<dyn Strategy>, SchemaCache) {
        (self.strategy, self.schemas)
    }

    pub(crate) fn push_op(
        &mut self,
        kind: OperationKind,
        name: String,
        group: OperationGroup,
        body: OpBody<E>,
    ) -> OperationId {
        let id = OperationId::from_u64(self.ops.len() as u64);
        self.ops.push(OpSlot {
            info: OperationInfo {
                id,
                kind,
                name,
                group,
            },
            body,
        });
        id
    }

    pub(crate) fn info(&self, op: OperationId) -> Option<&OperationInfo> {
        self.ops.get(op.index()).map(|slot| &slot.info)
    }

    pub(crate) fn group_of(&self, op: OperationId) -> OperationGroup {
        self.info(op).map_or(OperationGroup::ROOT, |info| info.group)
    }

    pub(crate) fn set_group(&mut self, op: OperationId, group: OperationGroup) {
        if let Some(slot) = self.ops.get_mut(op.index()) {
            slot.info.group = group;
        }
    }

    pub(crate) fn new_group(&mut self, op: OperationId) -> OperationGroup {
        let group = OperationGroup::from_u64(self.next_group);
        self.next_group += 1;
        self.set_group(op, group);
        group
    }

    /// Remember the first error raised through a context, so a caller that
    /// drops it still ends the iteration.
    pub(crate) fn latch<T>(&mut self, result: HandlerResult<T>) -> HandlerResult<T> {
        if let Err(err) = &result {
            self.failure.get_or_insert_with(|| err.clone());
        }
        result
    }

    /// The error that ends the step just run: the first latched one, else
    /// whatever the step returned.
    pub(crate) fn step_failure(&mut self, result: HandlerResult) -> Option<ExecutionError> {
        self.failure.take().or(result.err())
    }

    /// Append to the execution log.
    pub(crate) fn record(&mut self, op: OperationId, message: String) {
        self.log.push(LogEntry {
            step: self.step,
            operation: op,
            message,
        });
    }

    pub(crate) fn actor_slot(&self, op: OperationId) -> Option<&ActorSlot<E>> {
        match self.ops.get(op.index()).map(|slot| &slot.body) {
            Some(OpBody::Actor(actor)) => Some(actor),
            _ => None,
        }
    }

    pub(crate) fn actor_slot_mut(&mut self, op: OperationId) -> Option<&mut ActorSlot<E>> {
        match self.ops.get_mut(op.index()).map(|slot| &mut slot.body) {
            Some(OpBody::Actor(actor)) => Some(actor),
            _ => None,
        }
    }

    pub(crate) fn mailbox_mut(&mut self, op: OperationId) -> Option<&mut Mailbox<E>> {
        self.actor_slot_mut(op).map(|slot| &mut slot.mailbox)
    }

    pub(crate) fn actor_id(&self, op: OperationId) -> Option<&ActorId> {
        self.actor_slot(op).map(|slot| &slot.id)
    }

    // ----- actors -----

    pub(crate) fn machine_schema<M: Machine<Event = E>>(
        &mut self,
    ) -> Result<Arc<Schema<ActorHost<M>>>, SchemaError> {
        self.schemas
            .get_or_build::<ActorHost<M>>(crate::actor::machine::build_schema::<M>)
    }

    pub(crate) fn allocate_actor_id(&mut self, type_name: &str, name: Option<&str>) -> ActorId {
        let value = self.next_actor;
        self.next_actor += 1;
        self.actors.insert(value, ActorBinding::Reserved);
        ActorId::new(value, type_name, name.map(str::to_string))
    }

    /// Check that `id` may be bound to a new instance.
    fn check_bindable(&self, id: &ActorId) -> Result<(), Bug> {
        match self.actors.get(&id.value()) {
            None => Err(Bug::new(
                BugKind::UnknownActorId,
                format!("{id} was not issued by this runtime"),
            )),
            Some(ActorBinding::Reserved) => Ok(()),
            Some(ActorBinding::Bound(op)) => {
                let live = self.actor_slot(*op).is_some_and(|slot| !slot.halted);
                if live {
                    Err(Bug::new(
                        BugKind::ActorIdConflict,
                        format!("{id} is already bound to a live actor ({op})"),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    pub(crate) fn create_actor<M: Machine<Event = E>>(
        &mut self,
        creator: OperationId,
        name: Option<&str>,
        id: Option<&ActorId>,
        machine: M,
        initial: Option<E>,
    ) -> HandlerResult<ActorId> {
        let schema = self.machine_schema::<M>()?;
        let id = match id {
            Some(id) => {
                self.check_bindable(id)?;
                id.clone()
            }
            None => self.allocate_actor_id(short_type_name::<M>(), name),
        };

        let group = self.group_of(creator);
        let instance = MachineInstance::new(machine, schema, initial);
        let op = self.push_op(
            OperationKind::Actor,
            id.to_string(),
            group,
            OpBody::Actor(ActorSlot {
                id: id.clone(),
                mailbox: Mailbox::new(),
                instance: Some(Box::new(instance)),
                halted: false,
            }),
        );
        self.actors.insert(id.value(), ActorBinding::Bound(op));

        debug!(actor = %id, %op, creator = %creator, "actor created");
        self.record(creator, format!("created {id} as {op}"));
        Ok(id)
    }

    fn resolve_actor(&self, target: &ActorId) -> Result<OperationId, Bug> {
        match self.actors.get(&target.value()) {
            Some(ActorBinding::Bound(op))
                if self.actor_id(*op).is_some_and(|id| id.type_name() == target.type_name()) =>
            {
                Ok(*op)
            }
            Some(ActorBinding::Reserved) => Err(Bug::new(
                BugKind::UnboundActorId,
                format!("event sent to {target}, which was never bound to an actor"),
            )),
            _ => Err(Bug::new(
                BugKind::UnknownActorId,
                format!("event sent to {target}, which was not issued by this runtime"),
            )),
        }
    }

    pub(crate) fn send(
        &mut self,
        sender: OperationId,
        target: &ActorId,
        message: Message<E>,
    ) -> HandlerResult {
        let op = self.resolve_actor(target)?;
        let group = self.group_of(sender);
        let step = self.step;
        let kind = message.kind();
        let halted = match self.actor_slot(op) {
            Some(slot) => slot.halted,
            None => return Ok(()),
        };

        if halted {
            self.dropped.push(DroppedEvent {
                target: target.clone(),
                kind: kind.name().to_string(),
                sender,
                step,
            });
            debug!(to = %target, event = %kind, %sender, "event dropped: target halted");
            self.record(sender, format!("dropped {kind} sent to halted {target}"));
            return Ok(());
        }

        if let Some(mailbox) = self.mailbox_mut(op) {
            mailbox.enqueue(Envelope::new(message, sender, group));
        }
        trace!(to = %target, event = %kind, %sender, "event enqueued");
        self.record(sender, format!("sent {kind} to {target}"));
        Ok(())
    }

    /// Tear down an actor after its `on_halt` hook ran.
    pub(crate) fn finish_halt(&mut self, op: OperationId) {
        let step = self.step;
        let Some(slot) = self.actor_slot_mut(op) else {
            return;
        };
        slot.halted = true;
        slot.instance = None;
        let target = slot.id.clone();
        let leftovers = slot.mailbox.drain();

        for envelope in leftovers {
            let kind = envelope.kind();
            if matches!(envelope.message, Message::Halt) {
                continue;
            }
            debug!(to = %target, event = %kind, "event dropped: target halted");
            self.dropped.push(DroppedEvent {
                target: target.clone(),
                kind: kind.name().to_string(),
                sender: envelope.sender,
                step,
            });
        }

        self.cancel_timers_of(op);
        let freed = self.resources.release_all(op);
        if !freed.is_empty() {
            debug!(actor = %target, released = freed.len(), "halted actor released resources");
        }
        debug!(actor = %target, %op, "actor halted");
        self.record(op, format!("{target} halted"));
    }

    // ----- monitors -----

    pub(crate) fn register_monitor<N: Monitor<Event = E>>(&mut self, monitor: N) -> HandlerResult {
        let name = short_type_name::<N>();
        if self
            .monitors
            .iter()
            .any(|m| m.monitor_type() == TypeId::of::<N>())
        {
            return Err(Bug::new(
                BugKind::IllegalAction,
                format!("monitor {name} is already registered"),
            )
            .into());
        }
        let schema = self
            .schemas
            .get_or_build::<MonitorHost<N>>(crate::monitor::build_schema::<N>)?;
        let instance = MonitorInstance::start(monitor, schema)?;
        debug!(monitor = name, state = instance.state_name(), "monitor registered");
        self.monitors.push(Box::new(instance));
        Ok(())
    }

    pub(crate) fn monitor<N: Monitor<Event = E>>(&mut self, op: OperationId, event: E) -> HandlerResult {
        let slot = self
            .monitors
            .iter_mut()
            .find(|m| m.monitor_type() == TypeId::of::<N>())
            .and_then(|m| m.as_any_mut().downcast_mut::<MonitorInstance<N>>());
        let Some(instance) = slot else {
            trace!(monitor = short_type_name::<N>(), "monitor not registered; event ignored");
            return Ok(());
        };
        let kind = event.kind();
        let before = instance.state_name();
        instance.handle(event)?;
        let after = instance.state_name();
        self.record(
            op,
            format!("monitor {} handled {kind} ({before} -> {after})", short_type_name::<N>()),
        );
        Ok(())
    }

    /// First monitor currently in a hot state.
    pub(crate) fn hot_monitor(&self) -> Option<&'static str> {
        self.monitors
            .iter()
            .find(|m| m.temperature() == Temperature::Hot)
            .map(|m| m.name())
    }

    /// Age hot monitors by one step. Returns a monitor over the threshold.
    pub(crate) fn tick_monitors(&mut self) -> Option<(&'static str, u64)> {
        let threshold = self.limits.liveness_threshold;
        let mut over = None;
        for monitor in &mut self.monitors {
            if monitor.temperature() == Temperature::Hot {
                let hot = {
                    let steps = monitor.hot_steps_mut();
                    *steps += 1;
                    *steps
                };
                if hot > threshold && over.is_none() {
                    over = Some((monitor.name(), hot));
                }
            } else {
                *monitor.hot_steps_mut() = 0;
            }
        }
        over
    }

    // ----- choices -----

    pub(crate) fn choose_bool(&mut self, op: OperationId) -> HandlerResult<bool> {
        let value = self.strategy.next_boolean(op)?;
        self.trace.push(Decision::boolean(op, value));
        trace!(%op, value, "boolean choice");
        Ok(value)
    }

    pub(crate) fn choose_int(&mut self, op: OperationId, max: u64) -> HandlerResult<u64> {
        if max == 0 {
            return Err(Bug::new(
                BugKind::IllegalAction,
                "integer choice with an empty range",
            )
            .into());
        }
        let value = self.strategy.next_integer(op, max)?;
        self.trace.push(Decision::integer(op, max, value));
        trace!(%op, max, value, "integer choice");
        Ok(value)
    }

    // ----- execution -----

    pub(crate) fn run_entry<F>(&mut self, entry: &F) -> HandlerResult
    where
        F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
    {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = TestContext {
                kernel: &mut *self,
                op: OperationId::ENTRY,
            };
            entry(&mut ctx)
        }));
        match result {
            Ok(result) => result,
            Err(payload) => Err(panic_bug(OperationId::ENTRY, payload.as_ref()).into()),
        }
    }

    /// Run one step of `op`. Panics inside user code become `Panic` bugs.
    pub(crate) fn run_operation(&mut self, op: OperationId) -> HandlerResult {
        let Some(kind) = self.info(op).map(|info| info.kind) else {
            return Err(Bug::new(
                BugKind::IllegalAction,
                format!("scheduled {op}, which does not exist"),
            )
            .into());
        };
        let result = catch_unwind(AssertUnwindSafe(|| match kind {
            OperationKind::Entry => Ok(()),
            OperationKind::Actor => self.step_actor(op),
            OperationKind::Task => self.step_task(op),
            OperationKind::Timer => self.fire_timer(op),
        }));
        match result {
            Ok(result) => result,
            Err(payload) => Err(panic_bug(op, payload.as_ref()).into()),
        }
    }

    fn step_actor(&mut self, op: OperationId) -> HandlerResult {
        let Some(mut instance) = self.actor_slot_mut(op).and_then(|slot| slot.instance.take())
        else {
            return Ok(());
        };
        match instance.step(self, op)? {
            ActorStep::Continue => {
                if let Some(slot) = self.actor_slot_mut(op) {
                    slot.instance = Some(instance);
                }
            }
            ActorStep::Halted => self.finish_halt(op),
        }
        Ok(())
    }

    pub(crate) fn status(&self, op: OperationId) -> OperationStatus {
        match self.ops.get(op.index()).map(|slot| &slot.body) {
            None | Some(OpBody::Entry) => OperationStatus::Completed,
            Some(OpBody::Actor(slot)) => {
                if slot.halted {
                    return OperationStatus::Completed;
                }
                match &slot.instance {
                    Some(instance) => instance.status(&slot.mailbox, &self.resources),
                    None => OperationStatus::Enabled,
                }
            }
            Some(OpBody::Task(task)) => self.task_status(task),
            Some(OpBody::Timer(timer)) => timer.status(),
        }
    }

    /// Status of every operation, indexed by id.
    pub(crate) fn statuses(&self) -> Vec<OperationStatus> {
        (0..self.ops.len())
            .map(|idx| self.status(OperationId::from_u64(idx as u64)))
            .collect()
    }

    /// Hash of the whole program state at a scheduling point.
    pub(crate) fn state_hash(&self, statuses: &[OperationStatus]) -> u64 {
        let mut state = StateHasher::new();
        state.write_u64(self.clock.now());
        for (slot, status) in self.ops.iter().zip(statuses) {
            state.write(&slot.info.id);
            state.write(status);
            match &slot.body {
                OpBody::Entry => {}
                OpBody::Actor(actor) => {
                    if let Some(instance) = &actor.instance {
                        instance.snapshot(&mut state);
                    }
                    for envelope in actor.mailbox.iter() {
                        state.write(&envelope.sender);
                        let _ = write!(state, "{:?}", envelope.message);
                    }
                }
                OpBody::Task(task) => task.snapshot(&mut state),
                OpBody::Timer(timer) => timer.snapshot(&mut state),
            }
        }
        for monitor in &self.monitors {
            monitor.snapshot(&mut state);
        }
        self.resources.snapshot(&mut state);
        state.finish()
    }

    /// Text for a deadlock report: one clause per blocked operation.
    pub(crate) fn describe_blocked(&self, op: OperationId, status: OperationStatus) -> String {
        let name = self.info(op).map_or("?", |info| info.name.as_str());
        match status {
            OperationStatus::BlockedOnResource(res) => {
                let holders: Vec<String> = self
                    .resources
                    .holders(res)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                if holders.is_empty() {
                    format!("{op} ({name}) is waiting for {res}")
                } else {
                    format!(
                        "{op} ({name}) is waiting for {res} held by {}",
                        holders.join(", ")
                    )
                }
            }
            other => format!("{op} ({name}) is {other}"),
        }
    }
}

fn panic_bug(op: OperationId, payload: &(dyn std::any::Any + Send)) -> Bug {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    Bug::new(BugKind::Panic, format!("{op} panicked: {message}")).with_operations(vec![op])
}

/// Build the assertion result shared by every context.
pub(crate) fn check(condition: bool, message: impl fmt::Display) -> HandlerResult {
    if condition {
        Ok(())
    } else {
        Err(ExecutionError::Bug(Bug::new(
            BugKind::Assertion,
            message.to_string(),
        )))
    }
}

/// Generates the runtime API shared by every context type.
///
/// The context must have fields `kernel: &mut Kernel<$ev>` and
/// `op: OperationId`.
macro_rules! runtime_api {
    ($ev:ty) => {
        /// Operation running this code.
        pub fn operation(&self) -> $crate::runtime::operation::OperationId {
            self.op
        }

        /// Causal group of the running operation.
        pub fn group(&self) -> $crate::runtime::operation::OperationGroup {
            self.kernel.group_of(self.op)
        }

        /// Start a fresh causal group for this operation and everything it
        /// sends or creates from now on.
        pub fn new_group(&mut self) -> $crate::runtime::operation::OperationGroup {
            self.kernel.new_group(self.op)
        }

        /// Current logical time in ticks.
        pub fn now(&self) -> u64 {
            self.kernel.clock.now()
        }

        /// Create an actor. Its start state's entry action runs as its first
        /// scheduled step and receives `initial`.
        pub fn create_actor<N>(
            &mut self,
            machine: N,
            initial: Option<$ev>,
        ) -> $crate::error::HandlerResult<$crate::event::ActorId>
        where
            N: $crate::actor::machine::Machine<Event = $ev>,
        {
            let result = self.kernel.create_actor(self.op, None, None, machine, initial);
            self.kernel.latch(result)
        }

        /// Create an actor with a user-visible name.
        pub fn create_actor_named<N>(
            &mut self,
            name: &str,
            machine: N,
            initial: Option<$ev>,
        ) -> $crate::error::HandlerResult<$crate::event::ActorId>
        where
            N: $crate::actor::machine::Machine<Event = $ev>,
        {
            let result = self
                .kernel
                .create_actor(self.op, Some(name), None, machine, initial);
            self.kernel.latch(result)
        }

        /// Allocate an id for a machine of type `N` without creating it.
        pub fn create_actor_id<N>(&mut self, name: Option<&str>) -> $crate::event::ActorId
        where
            N: $crate::actor::machine::Machine<Event = $ev>,
        {
            self.kernel
                .allocate_actor_id($crate::event::short_type_name::<N>(), name)
        }

        /// Bind a previously allocated id to a new actor.
        pub fn create_actor_with_id<N>(
            &mut self,
            id: &$crate::event::ActorId,
            machine: N,
            initial: Option<$ev>,
        ) -> $crate::error::HandlerResult
        where
            N: $crate::actor::machine::Machine<Event = $ev>,
        {
            let result = self
                .kernel
                .create_actor(self.op, None, Some(id), machine, initial)
                .map(|_| ());
            self.kernel.latch(result)
        }

        /// Enqueue `event` in `target`'s mailbox.
        pub fn send(
            &mut self,
            target: &$crate::event::ActorId,
            event: $ev,
        ) -> $crate::error::HandlerResult {
            let result = self
                .kernel
                .send(self.op, target, $crate::event::Message::Event(event));
            self.kernel.latch(result)
        }

        /// Enqueue the built-in halt message.
        pub fn send_halt(&mut self, target: &$crate::event::ActorId) -> $crate::error::HandlerResult {
            let result = self.kernel.send(self.op, target, $crate::event::Message::Halt);
            self.kernel.latch(result)
        }

        /// Spawn a concurrent task.
        pub fn spawn<T>(&mut self, name: &str, task: T) -> $crate::runtime::operation::OperationId
        where
            T: $crate::runtime::task::Task<$ev>,
        {
            self.kernel.spawn_task(self.op, name, Box::new(task))
        }

        /// Spawn a task from a step closure.
        pub fn spawn_fn<F>(&mut self, name: &str, step: F) -> $crate::runtime::operation::OperationId
        where
            F: FnMut(
                    &mut $crate::runtime::task::TaskContext<'_, $ev>,
                ) -> $crate::error::HandlerResult<$crate::runtime::task::TaskStep>
                + 'static,
        {
            self.kernel
                .spawn_task(self.op, name, Box::new($crate::runtime::task::FnTask::new(step)))
        }

        pub fn register_monitor<N>(&mut self, monitor: N) -> $crate::error::HandlerResult
        where
            N: $crate::monitor::Monitor<Event = $ev>,
        {
            let result = self.kernel.register_monitor(monitor);
            self.kernel.latch(result)
        }

        /// Deliver `event` to monitor `N` synchronously. A no-op when `N` is
        /// not registered.
        pub fn monitor<N>(&mut self, event: $ev) -> $crate::error::HandlerResult
        where
            N: $crate::monitor::Monitor<Event = $ev>,
        {
            let result = self.kernel.monitor::<N>(self.op, event);
            self.kernel.latch(result)
        }

        /// Fail the iteration with an assertion bug unless `condition` holds.
        pub fn assert(
            &mut self,
            condition: bool,
            message: impl ::std::fmt::Display,
        ) -> $crate::error::HandlerResult {
            let result = $crate::runtime::kernel::check(condition, message);
            self.kernel.latch(result)
        }

        /// Nondeterministic boolean, recorded in the trace.
        pub fn choose_bool(&mut self) -> $crate::error::HandlerResult<bool> {
            let result = self.kernel.choose_bool(self.op);
            self.kernel.latch(result)
        }

        /// Nondeterministic integer in `[0, max)`, recorded in the trace.
        pub fn choose_int(&mut self, max: u64) -> $crate::error::HandlerResult<u64> {
            let result = self.kernel.choose_int(self.op, max);
            self.kernel.latch(result)
        }

        pub fn new_lock(&mut self) -> $crate::runtime::resource::LockId {
            self.kernel.resources.new_lock()
        }

        pub fn new_semaphore(&mut self, permits: u32) -> $crate::runtime::resource::SemaphoreId {
            self.kernel.resources.new_semaphore(permits)
        }

        /// Acquire without blocking. `Ok(false)` if the resource is busy.
        pub fn try_acquire(
            &mut self,
            resource: impl $crate::runtime::resource::Acquirable,
        ) -> $crate::error::HandlerResult<bool> {
            let result = self
                .kernel
                .resources
                .try_acquire(resource.resource(), self.op)
                .map_err($crate::error::ExecutionError::from);
            self.kernel.latch(result)
        }

        pub fn release(
            &mut self,
            resource: impl $crate::runtime::resource::Acquirable,
        ) -> $crate::error::HandlerResult {
            let result = self
                .kernel
                .resources
                .release(resource.resource(), self.op)
                .map_err($crate::error::ExecutionError::from);
            self.kernel.latch(result)
        }

        pub fn new_counter(&mut self, initial: i64) -> $crate::runtime::resource::CounterId {
            self.kernel.resources.new_counter(initial)
        }

        pub fn read_counter(
            &mut self,
            counter: $crate::runtime::resource::CounterId,
        ) -> $crate::error::HandlerResult<i64> {
            let result = self
                .kernel
                .resources
                .counter(counter)
                .map(|cell| *cell)
                .map_err($crate::error::ExecutionError::from);
            self.kernel.latch(result)
        }

        pub fn write_counter(
            &mut self,
            counter: $crate::runtime::resource::CounterId,
            value: i64,
        ) -> $crate::error::HandlerResult {
            let result = self
                .kernel
                .resources
                .counter(counter)
                .map(|cell| *cell = value)
                .map_err($crate::error::ExecutionError::from);
            self.kernel.latch(result)
        }

        /// Add `delta` atomically (within this step) and return the old value.
        pub fn fetch_add(
            &mut self,
            counter: $crate::runtime::resource::CounterId,
            delta: i64,
        ) -> $crate::error::HandlerResult<i64> {
            let result = self
                .kernel
                .resources
                .counter(counter)
                .map(|cell| {
                    let old = *cell;
                    *cell = old.wrapping_add(delta);
                    old
                })
                .map_err($crate::error::ExecutionError::from);
            self.kernel.latch(result)
        }

        /// Append a line to the execution log.
        pub fn log(&mut self, message: impl ::std::fmt::Display) {
            self.kernel.record(self.op, message.to_string());
        }
    };
}

pub(crate) use runtime_api;

/// Context of the test entry point.
///
/// The entry point runs synchronously before the first scheduling point. It
/// typically creates actors, registers monitors and sends initial events.
pub struct TestContext<'a, E: Event> {
    kernel: &'a mut Kernel<E>,
    op: OperationId,
}

impl<'a, E: Event> TestContext<'a, E> {
    runtime_api!(E);
}
