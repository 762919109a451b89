//! Deterministic actor runtime with a controlled, exploring scheduler.
//!
//! ## Scope
//! Programs are written as state machines (actors) that exchange immutable
//! events through per-actor mailboxes, plus optional spawned tasks, timers and
//! modeled resources (locks, semaphores, shared counters). Every point where
//! two activities could interleave is mediated by a single scheduler, which
//! asks a pluggable strategy what runs next and records every decision.
//!
//! ## Key invariants
//! - Only one controlled operation executes at any instant.
//! - Events from one sender to one receiver are dequeued in send order.
//! - A recorded trace replays to the same verdict, or fails loudly with a
//!   divergence error if the program no longer matches it.
//! - No global state: each iteration runs inside its own kernel, so several
//!   explorations can run in one process.
//!
//! ## Flow (one iteration)
//! `entry point -> create actors / send events -> scheduling point ->
//! strategy picks an enabled operation -> operation runs one step -> repeat`
//! until quiescence, a bug, or the step bound.
//!
//! ## Notable entry points
//! - [`Machine`] / [`ActorContext`]: actor definitions and their API.
//! - [`Monitor`] / [`MonitorContext`]: safety and liveness specifications.
//! - [`Task`] / [`TaskContext`]: spawned activities with explicit continuations.
//! - [`TestEngine`], [`run_iteration`], [`replay`]: exploration drivers.
//! - [`ReproArtifact`]: persisted counterexamples.

pub mod actor;
pub mod engine;
pub mod error;
pub mod event;
pub mod monitor;
pub mod runtime;
pub mod scheduler;
pub mod strategy;

pub use actor::machine::{
    ActorContext, ActorHost, EntryAction, EventAction, ExitAction, Machine, MAX_TRANSITIONS_PER_STEP,
};
pub use actor::mailbox::{Disposition, Mailbox};
pub use actor::schema::{Schema, SchemaBuilder, SchemaError, StateBuilder, Temperature};
pub use engine::artifact::{replay_artifact, replay_artifact_path, ArtifactError, ReproArtifact};
pub use engine::config::{ConfigError, StrategyKind, TestConfig};
pub use engine::minimize::{minimize, MinimizeConfig};
pub use engine::{replay, run_iteration, BugFound, TestEngine, TestReport};
pub use error::{EngineError, ExecutionError, HandlerResult};
pub use event::{ActorId, Envelope, Event, EventKind, Message};
pub use monitor::{Monitor, MonitorContext, MonitorHost};
pub use runtime::kernel::TestContext;
pub use runtime::operation::{OperationGroup, OperationId, OperationInfo, OperationKind, OperationStatus};
pub use runtime::resource::{CounterId, LockId, ResourceId, SemaphoreId};
pub use runtime::snapshot::StateHasher;
pub use runtime::task::{FnTask, Task, TaskContext, TaskStep};
pub use runtime::timer::TimerId;
pub use scheduler::outcome::{Bug, BugKind, DroppedEvent, IterationOutcome, Verdict};
pub use scheduler::trace::{trace_hash, Decision, DecisionKind, LogEntry, Trace};
pub use strategy::{
    dfs::DfsStrategy, prioritization::PrioritizationStrategy, prioritization::SwitchPolicy,
    prioritization::UniformSwitchPolicy, probabilistic::ProbabilisticStrategy,
    random::RandomStrategy, replay::ReplayStrategy, Divergence, SchedulingPoint, Strategy,
};
