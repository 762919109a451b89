//! Lock-order inversion between two actors.

use actor_sim::{
    ActorContext, ActorHost, BugKind, Event, EventKind, HandlerResult, LockId, Machine,
    OperationId, SchemaBuilder, StrategyKind, TestConfig, TestContext, TestEngine, Verdict,
};

use crate::init_tracing;

#[derive(Clone, Debug)]
enum Ev {}

impl Event for Ev {
    const KINDS: &'static [EventKind] = &[];

    fn kind(&self) -> EventKind {
        match *self {}
    }
}

/// Takes `first`, then `second`, then releases both.
struct Philosopher {
    first: LockId,
    second: LockId,
}

impl Philosopher {
    fn start(&mut self, ctx: &mut ActorContext<'_, Self>, _: Option<&Ev>) -> HandlerResult {
        ctx.acquire(self.first, |this: &mut Self, ctx: &mut ActorContext<'_, Self>| {
            ctx.acquire(this.second, |this: &mut Self, ctx: &mut ActorContext<'_, Self>| {
                ctx.release(this.second)?;
                ctx.release(this.first)?;
                ctx.goto("Fed");
                Ok(())
            });
            Ok(())
        });
        Ok(())
    }
}

impl Machine for Philosopher {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Hungry").on_entry(Self::start);
        schema.state("Fed");
    }
}

fn opposite_order(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
    let a = ctx.new_lock();
    let b = ctx.new_lock();
    ctx.create_actor_named("p1", Philosopher { first: a, second: b }, None)?;
    ctx.create_actor_named("p2", Philosopher { first: b, second: a }, None)?;
    Ok(())
}

fn same_order(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
    let a = ctx.new_lock();
    let b = ctx.new_lock();
    ctx.create_actor_named("p1", Philosopher { first: a, second: b }, None)?;
    ctx.create_actor_named("p2", Philosopher { first: a, second: b }, None)?;
    Ok(())
}

fn dfs() -> TestConfig {
    TestConfig::default()
        .with_iterations(1_000)
        .with_strategy(StrategyKind::Dfs {
            state_caching: false,
        })
}

#[test]
fn opposite_lock_order_deadlocks() {
    init_tracing();
    let report = TestEngine::new(dfs()).explore(&opposite_order).unwrap();
    let found = report.first_bug().expect("deadlock");
    assert_eq!(found.outcome.verdict, Verdict::Deadlock);

    let bug = found.outcome.bug.as_ref().unwrap();
    assert_eq!(bug.kind, BugKind::Deadlock);
    assert_eq!(
        bug.operations,
        vec![OperationId::from_u64(1), OperationId::from_u64(2)]
    );
    assert!(bug.message.contains("held by"), "{}", bug.message);
}

#[test]
fn consistent_lock_order_never_deadlocks() {
    init_tracing();
    let report = TestEngine::new(dfs()).explore(&same_order).unwrap();
    assert!(report.exhausted);
    assert!(!report.has_bugs(), "{:?}", report.first_bug());
}
