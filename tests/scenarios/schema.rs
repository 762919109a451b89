//! Declaration errors surface before or instead of a verdict.

use actor_sim::{
    ActorContext, ActorHost, EngineError, Event, EventKind, HandlerResult, Machine, Monitor,
    MonitorHost, SchemaBuilder, SchemaError, TestConfig, TestContext, TestEngine,
};

use crate::init_tracing;

const PING: EventKind = EventKind::new("Ping");
const STRAY: EventKind = EventKind::new("Stray");

#[derive(Clone, Debug)]
struct Ping;

impl Event for Ping {
    const KINDS: &'static [EventKind] = &[PING];

    fn kind(&self) -> EventKind {
        PING
    }
}

struct Dangling;

impl Machine for Dangling {
    type Event = Ping;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Here").on_goto(PING, "Nowhere");
    }
}

struct Headless;

impl Machine for Headless {
    type Event = Ping;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.state("Floating").ignore(PING);
    }
}

struct Foreign;

impl Machine for Foreign {
    type Event = Ping;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Only").ignore(STRAY);
    }
}

struct Looping;

impl Machine for Looping {
    type Event = Ping;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("A").parent("B");
        schema.state("B").parent("A");
    }
}

struct Doubled;

impl Doubled {
    fn noop(&mut self, _: &mut ActorContext<'_, Self>, _: Ping) -> HandlerResult {
        Ok(())
    }
}

impl Machine for Doubled {
    type Event = Ping;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema
            .start_state("Only")
            .on_event(PING, Self::noop)
            .ignore(PING);
    }
}

struct Pusher;

impl Monitor for Pusher {
    type Event = Ping;

    fn configure(schema: &mut SchemaBuilder<MonitorHost<Self>>) {
        schema.start_state("Start").on_push(PING, "Start");
    }
}

struct Tepid;

impl Monitor for Tepid {
    type Event = Ping;

    fn configure(schema: &mut SchemaBuilder<MonitorHost<Self>>) {
        schema.start_state("Start").hot().cold();
    }
}

fn engine() -> TestEngine {
    TestEngine::new(TestConfig::default())
}

#[test]
fn machine_declaration_errors_are_reported() {
    init_tracing();
    assert_eq!(
        engine().validate_machine::<Dangling>().unwrap_err().to_string(),
        EngineError::Schema(SchemaError::UnknownState {
            machine: "Dangling",
            state: "Here",
            target: "Nowhere",
        })
        .to_string()
    );
    assert!(matches!(
        engine().validate_machine::<Headless>(),
        Err(EngineError::Schema(SchemaError::MissingStart {
            machine: "Headless"
        }))
    ));
    assert!(matches!(
        engine().validate_machine::<Foreign>(),
        Err(EngineError::Schema(SchemaError::UnknownEvent {
            event: "Stray",
            ..
        }))
    ));
    assert!(matches!(
        engine().validate_machine::<Looping>(),
        Err(EngineError::Schema(SchemaError::InheritanceCycle { .. }))
    ));
    assert!(matches!(
        engine().validate_machine::<Doubled>(),
        Err(EngineError::Schema(SchemaError::DuplicateBinding { event: "Ping", .. }))
    ));
}

#[test]
fn monitor_declaration_errors_are_reported() {
    init_tracing();
    assert!(matches!(
        engine().validate_monitor::<Pusher>(),
        Err(EngineError::Schema(SchemaError::Unsupported { .. }))
    ));
    assert!(matches!(
        engine().validate_monitor::<Tepid>(),
        Err(EngineError::Schema(SchemaError::ConflictingTemperature { .. }))
    ));
}

#[test]
fn creating_an_invalid_machine_aborts_the_exploration() {
    fn entry(ctx: &mut TestContext<'_, Ping>) -> HandlerResult {
        ctx.create_actor(Dangling, None)?;
        Ok(())
    }

    init_tracing();
    let err = engine().explore(&entry).unwrap_err();
    assert!(
        matches!(err, EngineError::Schema(SchemaError::UnknownState { .. })),
        "{err}"
    );
}
