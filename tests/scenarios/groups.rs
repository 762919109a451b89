//! Causal groups follow envelopes, created actors and spawned tasks.

use actor_sim::{
    run_iteration, ActorContext, ActorHost, ActorId, Event, EventKind, HandlerResult, Machine,
    OperationGroup, SchemaBuilder, TaskStep, TestConfig, TestContext, Verdict,
};

use crate::{init_tracing, seed_value_from_env};

const TAG: EventKind = EventKind::new("Tag");

/// Carries the group its sender expects the receiver to run in.
#[derive(Clone, Debug)]
struct Tag(OperationGroup);

impl Event for Tag {
    const KINDS: &'static [EventKind] = &[TAG];

    fn kind(&self) -> EventKind {
        TAG
    }
}

fn observed(ctx_group: OperationGroup, expected: OperationGroup, who: &str) -> String {
    format!("{who} in {ctx_group}, expected {expected}")
}

/// Opens a fresh group on start and tags the relay with it.
struct Origin {
    relay: ActorId,
}

impl Origin {
    fn start(&mut self, ctx: &mut ActorContext<'_, Self>, _: Option<&Tag>) -> HandlerResult {
        let group = ctx.new_group();
        ctx.assert(group != OperationGroup::ROOT, "new group reused the root")?;
        ctx.assert(ctx.group() == group, "origin did not switch groups")?;
        ctx.send(&self.relay, Tag(group))
    }
}

impl Machine for Origin {
    type Event = Tag;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Init").on_entry(Self::start);
    }
}

/// Checks the group of each tag it handles, then hands it on to a child
/// actor and a task.
struct Relay;

impl Relay {
    fn on_tag(&mut self, ctx: &mut ActorContext<'_, Self>, tag: Tag) -> HandlerResult {
        let expected = tag.0;
        let group = ctx.group();
        ctx.assert(group == expected, observed(group, expected, "relay"))?;
        ctx.log("group ok");
        ctx.create_actor(Child, Some(Tag(expected)))?;
        ctx.spawn_fn("helper", move |cx| {
            let group = cx.group();
            cx.assert(group == expected, observed(group, expected, "task"))?;
            cx.log("group ok");
            Ok(TaskStep::Done)
        });
        Ok(())
    }
}

impl Machine for Relay {
    type Event = Tag;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Listening").on_event(TAG, Self::on_tag);
    }
}

/// Created by the relay; starts in its creator's group.
struct Child;

impl Child {
    fn start(&mut self, ctx: &mut ActorContext<'_, Self>, tag: Option<&Tag>) -> HandlerResult {
        let expected = tag.map_or(OperationGroup::ROOT, |t| t.0);
        let group = ctx.group();
        ctx.assert(group == expected, observed(group, expected, "child"))?;
        ctx.log("group ok");
        Ok(())
    }
}

impl Machine for Child {
    type Event = Tag;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Born").on_entry(Self::start);
    }
}

fn tagged_relay(ctx: &mut TestContext<'_, Tag>) -> HandlerResult {
    ctx.assert(ctx.group() == OperationGroup::ROOT, "entry point left the root group")?;
    let relay = ctx.create_actor_named("relay", Relay, None)?;
    ctx.create_actor_named("origin", Origin { relay: relay.clone() }, None)?;
    ctx.send(&relay, Tag(OperationGroup::ROOT))
}

#[test]
fn groups_follow_sends_and_creations() {
    init_tracing();
    let start = seed_value_from_env("SCENARIO_SEED_START", 0);
    let count = seed_value_from_env("SCENARIO_SEED_COUNT", 20);
    for seed in start..start + count {
        let config = TestConfig::default().with_seed(seed);
        let outcome = run_iteration(&tagged_relay, &config).unwrap();
        assert_eq!(outcome.verdict, Verdict::Success, "seed {seed}: {:?}", outcome.bug);

        // Two tags, each checked by the relay, its child and its task.
        let checks = outcome
            .log
            .iter()
            .filter(|entry| entry.message == "group ok")
            .count();
        assert_eq!(checks, 6, "seed {seed}");
    }
}
