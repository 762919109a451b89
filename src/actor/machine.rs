//! Actor state machines.
//!
//! A [`Machine`] declares its states once (see [`SchemaBuilder`]) and is then
//! stepped by the scheduler. One step processes exactly one unit of work:
//! - the start state's entry action, on the first step;
//! - otherwise a raised event, then a satisfiable pending continuation, then
//!   the first deliverable mailbox event.
//!
//! Actions request at most one follow-up (goto, push, pop, raise, halt, or a
//! wait) through [`ActorContext`]. The follow-up is applied after the action
//! returns, inside the same step. Exit actions and `on_halt` may not request
//! anything.

use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::actor::mailbox::{Disposition, Mailbox};
use crate::actor::schema::{Host, Schema, SchemaBuilder, SchemaError, StateIndex, Transition};
use crate::error::HandlerResult;
use crate::event::{short_type_name, ActorId, Envelope, Event, EventKind, Message};
use crate::runtime::kernel::{runtime_api, Kernel};
use crate::runtime::operation::{OperationId, OperationStatus};
use crate::runtime::resource::{Acquirable, ResourceId, ResourceTable};
use crate::runtime::snapshot::StateHasher;
use crate::runtime::timer::TimerId;
use crate::scheduler::outcome::{Bug, BugKind};

/// Upper bound on state transitions within a single step.
pub const MAX_TRANSITIONS_PER_STEP: u32 = 1024;

/// Runs when a state is entered. Receives the triggering event, if any.
pub type EntryAction<M> =
    fn(&mut M, &mut ActorContext<'_, M>, Option<&<M as Machine>::Event>) -> HandlerResult;

/// Runs when a state is left.
pub type ExitAction<M> = fn(&mut M, &mut ActorContext<'_, M>) -> HandlerResult;

/// Handles one event.
pub type EventAction<M> =
    fn(&mut M, &mut ActorContext<'_, M>, <M as Machine>::Event) -> HandlerResult;

type ReceiveCont<M> =
    Box<dyn FnOnce(&mut M, &mut ActorContext<'_, M>, <M as Machine>::Event) -> HandlerResult>;
type AcquireCont<M> = Box<dyn FnOnce(&mut M, &mut ActorContext<'_, M>) -> HandlerResult>;

/// An actor type.
///
/// ```ignore
/// impl Machine for Server {
///     type Event = Ev;
///
///     fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
///         schema
///             .start_state("Idle")
///             .on_event(PING, Self::on_ping)
///             .on_goto(STOP, "Stopped");
///         schema.state("Stopped").ignore(PING);
///     }
/// }
/// ```
pub trait Machine: Sized + 'static {
    type Event: Event;

    /// Declare states and bindings. Called once per machine type.
    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>);

    /// Cleanup hook run when the actor halts.
    fn on_halt(&mut self, _ctx: &mut ActorContext<'_, Self>) -> HandlerResult {
        Ok(())
    }

    /// Feed the machine's logical fields to the state hash.
    fn snapshot(&self, _state: &mut StateHasher) {}
}

/// Schema host for actor machines.
pub struct ActorHost<M>(PhantomData<fn() -> M>);

impl<M: Machine> Host for ActorHost<M> {
    type Entry = EntryAction<M>;
    type Exit = ExitAction<M>;
    type Action = EventAction<M>;
    const IS_MONITOR: bool = false;
}

pub(crate) fn build_schema<M: Machine>() -> Result<Schema<ActorHost<M>>, SchemaError> {
    let mut builder = SchemaBuilder::new(short_type_name::<M>(), <M::Event as Event>::KINDS);
    M::configure(&mut builder);
    builder.build()
}

enum Request<M: Machine> {
    Goto(&'static str),
    Push(&'static str),
    Pop,
    Raise(M::Event),
    Halt,
    Receive(Vec<EventKind>, ReceiveCont<M>),
    Acquire(ResourceId, AcquireCont<M>),
}

impl<M: Machine> Request<M> {
    fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::Push(_) => "push",
            Self::Pop => "pop",
            Self::Raise(_) => "raise",
            Self::Halt => "halt",
            Self::Receive(..) => "receive",
            Self::Acquire(..) => "acquire",
        }
    }
}

enum Wait<M: Machine> {
    Receive {
        kinds: Vec<EventKind>,
        cont: ReceiveCont<M>,
    },
    Acquire {
        resource: ResourceId,
        cont: AcquireCont<M>,
    },
}

/// API available to actor actions.
pub struct ActorContext<'a, M: Machine> {
    kernel: &'a mut Kernel<M::Event>,
    op: OperationId,
    id: &'a ActorId,
    state: &'static str,
    request: Option<Request<M>>,
    conflict: Option<&'static str>,
}

impl<'a, M: Machine> ActorContext<'a, M> {
    fn new(
        kernel: &'a mut Kernel<M::Event>,
        op: OperationId,
        id: &'a ActorId,
        state: &'static str,
    ) -> Self {
        Self {
            kernel,
            op,
            id,
            state,
            request: None,
            conflict: None,
        }
    }

    runtime_api!(M::Event);

    /// This actor's id.
    pub fn id(&self) -> &ActorId {
        self.id
    }

    /// State whose action is running.
    pub fn state(&self) -> &'static str {
        self.state
    }

    /// Replace the current state once this action returns.
    pub fn goto(&mut self, state: &'static str) {
        self.request(Request::Goto(state));
    }

    pub fn push(&mut self, state: &'static str) {
        self.request(Request::Push(state));
    }

    /// Leave the current state and resume the one below it. Its entry
    /// action does not run again.
    pub fn pop(&mut self) {
        self.request(Request::Pop);
    }

    /// Handle `event` at this actor's next step, ahead of its mailbox.
    pub fn raise(&mut self, event: M::Event) {
        self.request(Request::Raise(event));
    }

    pub fn halt(&mut self) {
        self.request(Request::Halt);
    }

    /// Block until an event of one of `kinds` arrives, then run `cont` with
    /// it as a separate step. Other events stay queued meanwhile.
    pub fn receive<F>(&mut self, kinds: &[EventKind], cont: F)
    where
        F: FnOnce(&mut M, &mut ActorContext<'_, M>, M::Event) -> HandlerResult + 'static,
    {
        self.request(Request::Receive(kinds.to_vec(), Box::new(cont)));
    }

    /// Block until `resource` is free, acquire it, then run `cont` as a
    /// separate step.
    pub fn acquire<F>(&mut self, resource: impl Acquirable, cont: F)
    where
        F: FnOnce(&mut M, &mut ActorContext<'_, M>) -> HandlerResult + 'static,
    {
        self.request(Request::Acquire(resource.resource(), Box::new(cont)));
    }

    /// Deliver `event` to this actor once, `due` ticks from now.
    pub fn start_timer(&mut self, due: i64, event: M::Event) -> HandlerResult<TimerId> {
        let result = self.kernel.start_timer(self.op, due, None, event);
        self.kernel.latch(result)
    }

    /// Deliver `event` `due` ticks from now and then every `period` ticks.
    pub fn start_periodic_timer(
        &mut self,
        due: i64,
        period: i64,
        event: M::Event,
    ) -> HandlerResult<TimerId> {
        let result = self.kernel.start_timer(self.op, due, Some(period), event);
        self.kernel.latch(result)
    }

    pub fn stop_timer(&mut self, timer: TimerId) -> HandlerResult {
        let result = self.kernel.stop_timer(self.op, timer);
        self.kernel.latch(result)
    }

    fn request(&mut self, request: Request<M>) {
        if self.request.is_some() {
            self.conflict.get_or_insert(request.name());
        } else {
            self.request = Some(request);
        }
    }

    fn finish(self) -> Result<Option<Request<M>>, Bug> {
        if let Some(second) = self.conflict {
            let first = self.request.as_ref().map_or("?", Request::name);
            return Err(Bug::new(
                BugKind::IllegalAction,
                format!(
                    "{} in state {} requested both {first} and {second} in one action",
                    self.id, self.state
                ),
            )
            .with_operations(vec![self.op]));
        }
        Ok(self.request)
    }
}

/// Result of one actor step.
pub(crate) enum ActorStep {
    Continue,
    Halted,
}

/// Type-erased actor instance stored in the kernel.
pub(crate) trait ActorInstance<E: Event> {
    fn status(&self, mailbox: &Mailbox<E>, resources: &ResourceTable) -> OperationStatus;

    fn step(&mut self, kernel: &mut Kernel<E>, op: OperationId) -> HandlerResult<ActorStep>;

    fn snapshot(&self, state: &mut StateHasher);
}

pub(crate) struct MachineInstance<M: Machine> {
    machine: M,
    schema: Arc<Schema<ActorHost<M>>>,
    /// Never empty.
    stack: Vec<StateIndex>,
    started: bool,
    initial: Option<M::Event>,
    raised: Option<Envelope<M::Event>>,
    waiting: Option<Wait<M>>,
}

impl<M: Machine> MachineInstance<M> {
    pub(crate) fn new(
        machine: M,
        schema: Arc<Schema<ActorHost<M>>>,
        initial: Option<M::Event>,
    ) -> Self {
        let start = schema.start();
        Self {
            machine,
            schema,
            stack: vec![start],
            started: false,
            initial,
            raised: None,
            waiting: None,
        }
    }

    fn top(&self) -> StateIndex {
        self.stack
            .last()
            .copied()
            .unwrap_or_else(|| self.schema.start())
    }

    fn state_name(&self) -> &'static str {
        self.schema.state(self.top()).name
    }

    fn replace_top(&mut self, state: StateIndex) {
        if let Some(top) = self.stack.last_mut() {
            *top = state;
        }
    }

    /// Binding for `kind`, searching from the top frame down.
    fn lookup(&self, kind: EventKind) -> Option<(usize, Transition<EventAction<M>>)> {
        self.stack
            .iter()
            .enumerate()
            .rev()
            .find_map(|(frame, &state)| {
                self.schema
                    .transition(state, kind)
                    .map(|transition| (frame, transition))
            })
    }

    fn disposition(&self, kind: EventKind) -> Disposition {
        match self.lookup(kind) {
            Some((_, Transition::Ignore)) => Disposition::Ignore,
            Some((_, Transition::Defer)) => Disposition::Defer,
            Some(_) => Disposition::Handle,
            None => Disposition::Unhandled,
        }
    }

    fn resolve(&self, id: &ActorId, name: &'static str) -> Result<StateIndex, Bug> {
        self.schema.lookup(name).ok_or_else(|| {
            Bug::new(
                BugKind::UnknownState,
                format!("{id} has no state named `{name}`"),
            )
        })
    }

    fn illegal(&self, id: &ActorId, what: String) -> Bug {
        Bug::new(
            BugKind::IllegalAction,
            format!("{id} in state {}: {what}", self.state_name()),
        )
    }

    fn enter(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
        id: &ActorId,
        state: StateIndex,
        event: Option<&M::Event>,
    ) -> HandlerResult<Option<Request<M>>> {
        let resolved = self.schema.state(state);
        let name = resolved.name;
        let Some(entry) = resolved.entry else {
            return Ok(None);
        };
        let mut ctx = ActorContext::new(kernel, op, id, name);
        entry(&mut self.machine, &mut ctx, event)?;
        Ok(ctx.finish()?)
    }

    fn exit_top(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
        id: &ActorId,
    ) -> HandlerResult {
        let resolved = self.schema.state(self.top());
        let name = resolved.name;
        let Some(exit) = resolved.exit else {
            return Ok(());
        };
        let mut ctx = ActorContext::new(kernel, op, id, name);
        exit(&mut self.machine, &mut ctx)?;
        if let Some(request) = ctx.finish()? {
            let what = format!("exit action requested {}", request.name());
            return Err(self.illegal(id, what).into());
        }
        Ok(())
    }

    fn unhandled(&self, id: &ActorId, kind: EventKind) -> Bug {
        Bug::new(
            BugKind::UnhandledEvent,
            format!("{id} cannot handle {kind} in state {}", self.state_name()),
        )
    }

    fn spend(&self, id: &ActorId, budget: &mut u32) -> Result<(), Bug> {
        *budget += 1;
        if *budget > MAX_TRANSITIONS_PER_STEP {
            let what = format!("more than {MAX_TRANSITIONS_PER_STEP} transitions in one step");
            return Err(self.illegal(id, what));
        }
        Ok(())
    }

    /// Pop frames above `frame`, running their exit actions.
    fn unwind_to(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
        id: &ActorId,
        frame: usize,
        budget: &mut u32,
    ) -> HandlerResult {
        while self.stack.len() > frame + 1 {
            self.spend(id, budget)?;
            self.exit_top(kernel, op, id)?;
            self.stack.pop();
        }
        Ok(())
    }

    fn apply(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
        id: &ActorId,
        mut next: Option<Request<M>>,
        budget: &mut u32,
    ) -> HandlerResult<ActorStep> {
        while let Some(request) = next.take() {
            self.spend(id, budget)?;
            match request {
                Request::Goto(name) => {
                    let target = self.resolve(id, name)?;
                    self.exit_top(kernel, op, id)?;
                    self.replace_top(target);
                    next = self.enter(kernel, op, id, target, None)?;
                }
                Request::Push(name) => {
                    let target = self.resolve(id, name)?;
                    self.stack.push(target);
                    next = self.enter(kernel, op, id, target, None)?;
                }
                Request::Pop => {
                    if self.stack.len() <= 1 {
                        let what = "pop would empty the state stack".to_string();
                        return Err(self.illegal(id, what).into());
                    }
                    self.exit_top(kernel, op, id)?;
                    self.stack.pop();
                }
                Request::Raise(event) => {
                    let group = kernel.group_of(op);
                    self.raised = Some(Envelope::new(Message::Event(event), op, group));
                }
                Request::Halt => return self.halt(kernel, op, id),
                Request::Receive(kinds, cont) => {
                    self.waiting = Some(Wait::Receive { kinds, cont });
                }
                Request::Acquire(resource, cont) => {
                    self.waiting = Some(Wait::Acquire { resource, cont });
                }
            }
        }
        Ok(ActorStep::Continue)
    }

    fn halt(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
        id: &ActorId,
    ) -> HandlerResult<ActorStep> {
        let mut ctx = ActorContext::new(kernel, op, id, self.state_name());
        self.machine.on_halt(&mut ctx)?;
        if let Some(request) = ctx.finish()? {
            let what = format!("on_halt requested {}", request.name());
            return Err(self.illegal(id, what).into());
        }
        Ok(ActorStep::Halted)
    }

    fn dispatch(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
        id: &ActorId,
        envelope: Envelope<M::Event>,
    ) -> HandlerResult<ActorStep> {
        let Envelope {
            message,
            sender,
            group,
        } = envelope;
        kernel.set_group(op, group);
        let event = match message {
            Message::Halt => return self.halt(kernel, op, id),
            Message::Event(event) => event,
        };
        let kind = event.kind();
        let Some((frame, transition)) = self.lookup(kind) else {
            return Err(self.unhandled(id, kind).into());
        };

        let mut budget = 0;
        let next = match transition {
            Transition::Ignore => return Ok(ActorStep::Continue),
            Transition::Defer => {
                if let Some(mailbox) = kernel.mailbox_mut(op) {
                    mailbox.push_front(Envelope::new(Message::Event(event), sender, group));
                }
                return Ok(ActorStep::Continue);
            }
            Transition::Do(action) => {
                self.unwind_to(kernel, op, id, frame, &mut budget)?;
                let mut ctx = ActorContext::new(kernel, op, id, self.state_name());
                action(&mut self.machine, &mut ctx, event)?;
                ctx.finish()?
            }
            Transition::Goto(target) => {
                self.unwind_to(kernel, op, id, frame, &mut budget)?;
                self.spend(id, &mut budget)?;
                self.exit_top(kernel, op, id)?;
                self.replace_top(target);
                self.enter(kernel, op, id, target, Some(&event))?
            }
            Transition::Push(target) => {
                self.unwind_to(kernel, op, id, frame, &mut budget)?;
                self.spend(id, &mut budget)?;
                self.stack.push(target);
                self.enter(kernel, op, id, target, Some(&event))?
            }
        };
        self.apply(kernel, op, id, next, &mut budget)
    }

    fn resume(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
        id: &ActorId,
        wait: Wait<M>,
    ) -> HandlerResult<ActorStep> {
        let mut budget = 0;
        match wait {
            Wait::Receive { kinds, cont } => {
                let taken = kernel
                    .mailbox_mut(op)
                    .and_then(|mailbox| mailbox.take_matching(&kinds));
                let Some(envelope) = taken else {
                    self.waiting = Some(Wait::Receive { kinds, cont });
                    return Ok(ActorStep::Continue);
                };
                kernel.set_group(op, envelope.group);
                let event = match envelope.message {
                    Message::Halt => return self.halt(kernel, op, id),
                    Message::Event(event) => event,
                };
                let mut ctx = ActorContext::new(kernel, op, id, self.state_name());
                cont(&mut self.machine, &mut ctx, event)?;
                let next = ctx.finish()?;
                self.apply(kernel, op, id, next, &mut budget)
            }
            Wait::Acquire { resource, cont } => {
                let halt = kernel
                    .mailbox_mut(op)
                    .and_then(|mailbox| mailbox.take_matching(&[]));
                if halt.is_some() {
                    return self.halt(kernel, op, id);
                }
                if !kernel.resources.try_acquire(resource, op)? {
                    self.waiting = Some(Wait::Acquire { resource, cont });
                    return Ok(ActorStep::Continue);
                }
                let mut ctx = ActorContext::new(kernel, op, id, self.state_name());
                cont(&mut self.machine, &mut ctx)?;
                let next = ctx.finish()?;
                self.apply(kernel, op, id, next, &mut budget)
            }
        }
    }
}

impl<M: Machine> ActorInstance<M::Event> for MachineInstance<M> {
    fn status(&self, mailbox: &Mailbox<M::Event>, resources: &ResourceTable) -> OperationStatus {
        if !self.started || self.raised.is_some() {
            return OperationStatus::Enabled;
        }
        match &self.waiting {
            Some(Wait::Receive { kinds, .. }) => {
                if mailbox.has_matching(kinds) {
                    OperationStatus::Enabled
                } else {
                    OperationStatus::BlockedOnReceive
                }
            }
            Some(Wait::Acquire { resource, .. }) => {
                if resources.can_acquire(*resource) || mailbox.has_matching(&[]) {
                    OperationStatus::Enabled
                } else {
                    OperationStatus::BlockedOnResource(*resource)
                }
            }
            None => {
                if mailbox.has_deliverable(|kind| self.disposition(kind)) {
                    OperationStatus::Enabled
                } else {
                    OperationStatus::Idle
                }
            }
        }
    }

    fn step(
        &mut self,
        kernel: &mut Kernel<M::Event>,
        op: OperationId,
    ) -> HandlerResult<ActorStep> {
        let Some(id) = kernel.actor_id(op).cloned() else {
            return Ok(ActorStep::Continue);
        };

        if !self.started {
            self.started = true;
            let initial = self.initial.take();
            let start = self.top();
            let mut budget = 1;
            let next = self.enter(kernel, op, &id, start, initial.as_ref())?;
            return self.apply(kernel, op, &id, next, &mut budget);
        }

        if let Some(envelope) = self.raised.take() {
            return self.dispatch(kernel, op, &id, envelope);
        }

        if let Some(wait) = self.waiting.take() {
            return self.resume(kernel, op, &id, wait);
        }

        let this = &*self;
        let dequeued = kernel
            .mailbox_mut(op)
            .and_then(|mailbox| mailbox.try_dequeue(|kind| this.disposition(kind)));
        match dequeued {
            Some(dequeued) if dequeued.unhandled => {
                kernel.set_group(op, dequeued.envelope.group);
                Err(self.unhandled(&id, dequeued.envelope.kind()).into())
            }
            Some(dequeued) => self.dispatch(kernel, op, &id, dequeued.envelope),
            None => Ok(ActorStep::Continue),
        }
    }

    fn snapshot(&self, state: &mut StateHasher) {
        for &idx in &self.stack {
            state.write_str(self.schema.state(idx).name);
        }
        state.write(&self.started);
        if let Some(raised) = &self.raised {
            let _ = write!(state, "{:?}", raised.message);
        }
        match &self.waiting {
            None => state.write_u64(0),
            Some(Wait::Receive { kinds, .. }) => {
                state.write_u64(1);
                for kind in kinds {
                    state.write_str(kind.name());
                }
            }
            Some(Wait::Acquire { resource, .. }) => {
                state.write_u64(2);
                state.write(resource);
            }
        }
        self.machine.snapshot(state);
    }
}
