//! Halting, dropped events and halt cleanup.

use actor_sim::{
    run_iteration, ActorContext, ActorHost, ActorId, BugKind, Event, EventKind, HandlerResult,
    Machine, OperationId, SchemaBuilder, TestConfig, TestContext, Verdict,
};

use crate::{init_tracing, seed_value_from_env};

const PING: EventKind = EventKind::new("Ping");
const GRAB: EventKind = EventKind::new("Grab");

#[derive(Clone, Debug)]
enum Ev {
    Ping,
    Grab,
}

impl Event for Ev {
    const KINDS: &'static [EventKind] = &[PING, GRAB];

    fn kind(&self) -> EventKind {
        match self {
            Ev::Ping => PING,
            Ev::Grab => GRAB,
        }
    }
}

/// Fails if it ever handles a ping.
struct Target;

impl Target {
    fn on_ping(&mut self, ctx: &mut ActorContext<'_, Self>, _: Ev) -> HandlerResult {
        ctx.assert(false, "a halted actor handled an event")
    }
}

impl Machine for Target {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Alive").on_event(PING, Self::on_ping);
    }
}

fn halt_then_ping(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
    let target = ctx.create_actor_named("target", Target, None)?;
    ctx.send_halt(&target)?;
    ctx.send(&target, Ev::Ping)?;
    Ok(())
}

fn seeds() -> std::ops::Range<u64> {
    let start = seed_value_from_env("SCENARIO_SEED_START", 0);
    let count = seed_value_from_env("SCENARIO_SEED_COUNT", 20);
    start..start + count
}

#[test]
fn events_queued_behind_halt_are_dropped() {
    init_tracing();
    for seed in seeds() {
        let config = TestConfig::default().with_seed(seed);
        let outcome = run_iteration(&halt_then_ping, &config).unwrap();
        assert_eq!(outcome.verdict, Verdict::Success, "seed {seed}: {:?}", outcome.bug);
        assert_eq!(outcome.dropped.len(), 1, "seed {seed}");

        let dropped = &outcome.dropped[0];
        assert_eq!(dropped.kind, "Ping");
        assert_eq!(dropped.sender, OperationId::ENTRY);
        assert_eq!(dropped.target.name(), Some("target"));
    }
}

/// Sends one ping to `target` from its start state, then halts itself.
struct LateSender {
    target: ActorId,
}

impl LateSender {
    fn start(&mut self, ctx: &mut ActorContext<'_, Self>, _: Option<&Ev>) -> HandlerResult {
        ctx.send(&self.target, Ev::Ping)?;
        ctx.halt();
        Ok(())
    }
}

impl Machine for LateSender {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Init").on_entry(Self::start);
    }
}

/// Halts on its first step.
struct Quitter;

impl Quitter {
    fn start(&mut self, ctx: &mut ActorContext<'_, Self>, _: Option<&Ev>) -> HandlerResult {
        ctx.halt();
        Ok(())
    }
}

impl Machine for Quitter {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Init").on_entry(Self::start);
    }
}

fn send_to_quitter(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
    let quitter = ctx.create_actor_named("quitter", Quitter, None)?;
    ctx.create_actor_named("sender", LateSender { target: quitter }, None)?;
    Ok(())
}

#[test]
fn sends_to_a_halted_actor_are_dropped_whenever_they_arrive() {
    init_tracing();
    for seed in seeds() {
        let config = TestConfig::default().with_seed(seed);
        let outcome = run_iteration(&send_to_quitter, &config).unwrap();
        assert_eq!(outcome.verdict, Verdict::Success, "seed {seed}");
        // Drained at halt or dropped at send time, depending on the order.
        assert_eq!(outcome.dropped.len(), 1, "seed {seed}");
        assert_eq!(outcome.dropped[0].kind, "Ping");
        assert_eq!(outcome.dropped[0].target.name(), Some("quitter"));
    }
}

/// Takes a lock and halts while holding it.
struct Holder {
    lock: actor_sim::LockId,
}

impl Holder {
    fn start(&mut self, ctx: &mut ActorContext<'_, Self>, _: Option<&Ev>) -> HandlerResult {
        ctx.acquire(self.lock, |_: &mut Self, ctx: &mut ActorContext<'_, Self>| {
            ctx.halt();
            Ok(())
        });
        Ok(())
    }
}

impl Machine for Holder {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Init").on_entry(Self::start);
    }
}

/// Waits for the lock after being told to.
struct Waiter {
    lock: actor_sim::LockId,
}

impl Waiter {
    fn on_grab(&mut self, ctx: &mut ActorContext<'_, Self>, _: Ev) -> HandlerResult {
        ctx.acquire(self.lock, |this: &mut Self, ctx: &mut ActorContext<'_, Self>| {
            ctx.release(this.lock)
        });
        Ok(())
    }
}

impl Machine for Waiter {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Idle").on_event(GRAB, Self::on_grab);
    }
}

fn halted_holder(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
    let lock = ctx.new_lock();
    ctx.create_actor_named("holder", Holder { lock }, None)?;
    let waiter = ctx.create_actor_named("waiter", Waiter { lock }, None)?;
    ctx.send(&waiter, Ev::Grab)?;
    Ok(())
}

#[test]
fn halting_releases_held_resources() {
    init_tracing();
    for seed in seeds() {
        let config = TestConfig::default().with_seed(seed);
        let outcome = run_iteration(&halted_holder, &config).unwrap();
        assert_eq!(
            outcome.verdict,
            Verdict::Success,
            "seed {seed}: {:?}",
            outcome.bug
        );
    }
}

#[test]
fn halt_hook_may_not_request_transitions() {
    struct Stubborn;

    impl Stubborn {
        fn start(&mut self, ctx: &mut ActorContext<'_, Self>, _: Option<&Ev>) -> HandlerResult {
            ctx.halt();
            Ok(())
        }
    }

    impl Machine for Stubborn {
        type Event = Ev;

        fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
            schema.start_state("Init").on_entry(Self::start);
            schema.state("Elsewhere");
        }

        fn on_halt(&mut self, ctx: &mut ActorContext<'_, Self>) -> HandlerResult {
            ctx.goto("Elsewhere");
            Ok(())
        }
    }

    fn entry(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
        ctx.create_actor(Stubborn, None)?;
        Ok(())
    }

    init_tracing();
    let outcome = run_iteration(&entry, &TestConfig::default()).unwrap();
    assert_eq!(outcome.bug_kind(), Some(BugKind::IllegalAction));
}
