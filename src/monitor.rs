//! Safety and liveness monitors.
//!
//! A monitor is a state machine without a mailbox. Events reach it
//! synchronously through `ctx.monitor::<M>(event)` from any operation, and
//! are handled to completion (including raised follow-ups) before the call
//! returns. States may be tagged hot or cold; the scheduler ages hot monitors
//! once per step and reports a liveness violation when one stays hot past the
//! configured threshold or at the end of an iteration.

use std::any::{Any, TypeId};
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::actor::machine::MAX_TRANSITIONS_PER_STEP;
use crate::actor::schema::{
    Host, Schema, SchemaBuilder, SchemaError, StateIndex, Temperature, Transition,
};
use crate::error::{ExecutionError, HandlerResult};
use crate::event::{short_type_name, Event};
use crate::runtime::kernel::check;
use crate::runtime::snapshot::StateHasher;
use crate::scheduler::outcome::{Bug, BugKind};

pub type MonitorEntry<M> =
    fn(&mut M, &mut MonitorContext<M>, Option<&<M as Monitor>::Event>) -> HandlerResult;
pub type MonitorExit<M> = fn(&mut M, &mut MonitorContext<M>) -> HandlerResult;
pub type MonitorAction<M> =
    fn(&mut M, &mut MonitorContext<M>, <M as Monitor>::Event) -> HandlerResult;

/// A safety or liveness property checked during execution.
pub trait Monitor: Sized + 'static {
    type Event: Event;

    /// Declare states, bindings and temperatures. Push, pop and defer are
    /// rejected at build time.
    fn configure(schema: &mut SchemaBuilder<MonitorHost<Self>>);

    fn snapshot(&self, _state: &mut StateHasher) {}
}

/// Schema host for monitors.
pub struct MonitorHost<M>(PhantomData<fn() -> M>);

impl<M: Monitor> Host for MonitorHost<M> {
    type Entry = MonitorEntry<M>;
    type Exit = MonitorExit<M>;
    type Action = MonitorAction<M>;
    const IS_MONITOR: bool = true;
}

pub(crate) fn build_schema<M: Monitor>() -> Result<Schema<MonitorHost<M>>, SchemaError> {
    let mut builder = SchemaBuilder::new(short_type_name::<M>(), <M::Event as Event>::KINDS);
    M::configure(&mut builder);
    builder.build()
}

enum Request<E> {
    Goto(&'static str),
    Raise(E),
}

impl<E> Request<E> {
    fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::Raise(_) => "raise",
        }
    }
}

/// API available to monitor actions.
pub struct MonitorContext<M: Monitor> {
    monitor: &'static str,
    state: &'static str,
    request: Option<Request<M::Event>>,
    conflict: Option<&'static str>,
    /// First failed assertion, reported even if the action dropped it.
    failure: Option<Bug>,
}

impl<M: Monitor> MonitorContext<M> {
    fn new(monitor: &'static str, state: &'static str) -> Self {
        Self {
            monitor,
            state,
            request: None,
            conflict: None,
            failure: None,
        }
    }

    pub fn state(&self) -> &'static str {
        self.state
    }

    /// Safety check. A failure ends the iteration as an assertion failure.
    pub fn assert(&mut self, condition: bool, message: impl std::fmt::Display) -> HandlerResult {
        if condition {
            return Ok(());
        }
        let result = check(false, format_args!("monitor {}: {message}", self.monitor));
        if let Err(ExecutionError::Bug(bug)) = &result {
            self.failure.get_or_insert_with(|| bug.clone());
        }
        result
    }

    pub fn goto(&mut self, state: &'static str) {
        self.request(Request::Goto(state));
    }

    /// Handle `event` right after the current action.
    pub fn raise(&mut self, event: M::Event) {
        self.request(Request::Raise(event));
    }

    fn request(&mut self, request: Request<M::Event>) {
        if self.request.is_some() {
            self.conflict.get_or_insert(request.name());
        } else {
            self.request = Some(request);
        }
    }

    fn finish(self) -> Result<Option<Request<M::Event>>, Bug> {
        if let Some(bug) = self.failure {
            return Err(bug);
        }
        if let Some(second) = self.conflict {
            let first = self.request.as_ref().map_or("?", Request::name);
            return Err(Bug::new(
                BugKind::IllegalAction,
                format!(
                    "monitor {} in state {} requested both {first} and {second} in one action",
                    self.monitor, self.state
                ),
            ));
        }
        Ok(self.request)
    }
}

pub(crate) struct MonitorInstance<M: Monitor> {
    monitor: M,
    schema: Arc<Schema<MonitorHost<M>>>,
    state: StateIndex,
    hot_steps: u64,
}

impl<M: Monitor> MonitorInstance<M> {
    /// Enter the start state.
    pub(crate) fn start(monitor: M, schema: Arc<Schema<MonitorHost<M>>>) -> HandlerResult<Self> {
        let state = schema.start();
        let mut this = Self {
            monitor,
            schema,
            state,
            hot_steps: 0,
        };
        let mut budget = 1;
        let next = this.enter(state, None)?;
        if let Some(raised) = this.follow(next, &mut budget)? {
            this.run(raised, &mut budget)?;
        }
        Ok(this)
    }

    pub(crate) fn handle(&mut self, event: M::Event) -> HandlerResult {
        let mut budget = 0;
        self.run(event, &mut budget)
    }

    pub(crate) fn state_name(&self) -> &'static str {
        self.schema.state(self.state).name
    }

    fn name(&self) -> &'static str {
        self.schema.machine()
    }

    fn context(&self) -> MonitorContext<M> {
        MonitorContext::new(self.name(), self.state_name())
    }

    fn spend(&self, budget: &mut u32) -> Result<(), Bug> {
        *budget += 1;
        if *budget > MAX_TRANSITIONS_PER_STEP {
            return Err(Bug::new(
                BugKind::IllegalAction,
                format!(
                    "monitor {} made more than {MAX_TRANSITIONS_PER_STEP} transitions for one event",
                    self.name()
                ),
            ));
        }
        Ok(())
    }

    fn set_state(&mut self, state: StateIndex) {
        self.state = state;
        if self.schema.state(state).temperature != Temperature::Hot {
            self.hot_steps = 0;
        }
    }

    fn enter(
        &mut self,
        state: StateIndex,
        event: Option<&M::Event>,
    ) -> HandlerResult<Option<Request<M::Event>>> {
        let Some(entry) = self.schema.state(state).entry else {
            return Ok(None);
        };
        let mut ctx = self.context();
        entry(&mut self.monitor, &mut ctx, event)?;
        Ok(ctx.finish()?)
    }

    fn exit(&mut self) -> HandlerResult {
        let Some(exit) = self.schema.state(self.state).exit else {
            return Ok(());
        };
        let mut ctx = self.context();
        exit(&mut self.monitor, &mut ctx)?;
        if let Some(request) = ctx.finish()? {
            return Err(Bug::new(
                BugKind::IllegalAction,
                format!(
                    "monitor {} requested {} from the exit action of {}",
                    self.name(),
                    request.name(),
                    self.state_name()
                ),
            )
            .into());
        }
        Ok(())
    }

    fn goto(
        &mut self,
        target: StateIndex,
        event: Option<&M::Event>,
    ) -> HandlerResult<Option<Request<M::Event>>> {
        self.exit()?;
        self.set_state(target);
        self.enter(target, event)
    }

    /// Apply goto requests until one raises an event (returned) or none
    /// remain.
    fn follow(
        &mut self,
        mut next: Option<Request<M::Event>>,
        budget: &mut u32,
    ) -> HandlerResult<Option<M::Event>> {
        while let Some(request) = next.take() {
            match request {
                Request::Raise(event) => return Ok(Some(event)),
                Request::Goto(name) => {
                    self.spend(budget)?;
                    let target = self.schema.lookup(name).ok_or_else(|| {
                        Bug::new(
                            BugKind::UnknownState,
                            format!("monitor {} has no state named `{name}`", self.name()),
                        )
                    })?;
                    next = self.goto(target, None)?;
                }
            }
        }
        Ok(None)
    }

    fn run(&mut self, event: M::Event, budget: &mut u32) -> HandlerResult {
        let mut pending = Some(event);
        while let Some(event) = pending.take() {
            self.spend(budget)?;
            let kind = event.kind();
            let next = match self.schema.transition(self.state, kind) {
                Some(Transition::Ignore) => None,
                Some(Transition::Do(action)) => {
                    let mut ctx = self.context();
                    action(&mut self.monitor, &mut ctx, event)?;
                    ctx.finish()?
                }
                Some(Transition::Goto(target)) => self.goto(target, Some(&event))?,
                Some(Transition::Push(_) | Transition::Defer) | None => {
                    return Err(Bug::new(
                        BugKind::UnhandledEvent,
                        format!(
                            "monitor {} cannot handle {kind} in state {}",
                            self.name(),
                            self.state_name()
                        ),
                    )
                    .into());
                }
            };
            pending = self.follow(next, budget)?;
        }
        Ok(())
    }
}

/// Type-erased monitor stored in the kernel.
pub(crate) trait MonitorSlot<E: Event> {
    fn monitor_type(&self) -> TypeId;

    fn name(&self) -> &'static str;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn temperature(&self) -> Temperature;

    fn hot_steps_mut(&mut self) -> &mut u64;

    fn snapshot(&self, state: &mut StateHasher);
}

impl<M: Monitor> MonitorSlot<M::Event> for MonitorInstance<M> {
    fn monitor_type(&self) -> TypeId {
        TypeId::of::<M>()
    }

    fn name(&self) -> &'static str {
        short_type_name::<M>()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn temperature(&self) -> Temperature {
        self.schema.state(self.state).temperature
    }

    fn hot_steps_mut(&mut self) -> &mut u64 {
        &mut self.hot_steps
    }

    fn snapshot(&self, state: &mut StateHasher) {
        let _ = write!(state, "{}:{}", MonitorSlot::name(self), self.state_name());
        self.monitor.snapshot(state);
    }
}
