//! Pre-allocated actor ids and binding rules.

use actor_sim::{
    run_iteration, ActorContext, ActorHost, BugKind, Event, EventKind, HandlerResult, Machine,
    SchemaBuilder, TestConfig, TestContext, Verdict,
};

use crate::init_tracing;

const HELLO: EventKind = EventKind::new("Hello");

#[derive(Clone, Debug)]
struct Hello;

impl Event for Hello {
    const KINDS: &'static [EventKind] = &[HELLO];

    fn kind(&self) -> EventKind {
        HELLO
    }
}

struct Greeter;

impl Greeter {
    fn on_hello(&mut self, ctx: &mut ActorContext<'_, Self>, _: Hello) -> HandlerResult {
        ctx.log("hello received");
        ctx.halt();
        Ok(())
    }
}

impl Machine for Greeter {
    type Event = Hello;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Waiting").on_event(HELLO, Self::on_hello);
    }
}

fn bound_before_send(ctx: &mut TestContext<'_, Hello>) -> HandlerResult {
    let id = ctx.create_actor_id::<Greeter>(Some("late"));
    ctx.create_actor_with_id(&id, Greeter, None)?;
    ctx.send(&id, Hello)?;
    Ok(())
}

fn sent_before_bind(ctx: &mut TestContext<'_, Hello>) -> HandlerResult {
    let id = ctx.create_actor_id::<Greeter>(None);
    ctx.send(&id, Hello)?;
    Ok(())
}

fn bound_twice(ctx: &mut TestContext<'_, Hello>) -> HandlerResult {
    let id = ctx.create_actor_id::<Greeter>(None);
    ctx.create_actor_with_id(&id, Greeter, None)?;
    ctx.create_actor_with_id(&id, Greeter, None)?;
    Ok(())
}

#[test]
fn reserved_id_receives_once_bound() {
    init_tracing();
    let outcome = run_iteration(&bound_before_send, &TestConfig::default()).unwrap();
    assert_eq!(outcome.verdict, Verdict::Success);
    assert!(outcome
        .log
        .iter()
        .any(|entry| entry.message == "hello received"));
}

#[test]
fn sending_to_an_unbound_id_is_a_bug() {
    init_tracing();
    let outcome = run_iteration(&sent_before_bind, &TestConfig::default()).unwrap();
    assert_eq!(outcome.bug_kind(), Some(BugKind::UnboundActorId));
    assert_eq!(outcome.verdict, Verdict::AssertionFailure);
    assert_eq!(outcome.steps, 0);
}

#[test]
fn binding_a_live_id_twice_is_a_conflict() {
    init_tracing();
    let outcome = run_iteration(&bound_twice, &TestConfig::default()).unwrap();
    assert_eq!(outcome.bug_kind(), Some(BugKind::ActorIdConflict));
}
