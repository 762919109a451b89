//! Per-sender FIFO delivery under arbitrary schedules.

use proptest::prelude::*;

use actor_sim::{
    run_iteration, ActorContext, ActorHost, ActorId, Event, EventKind, HandlerResult, Machine,
    SchemaBuilder, StrategyKind, TestConfig, TestContext, Verdict,
};

const NEXT: EventKind = EventKind::new("Next");
const SEQ: EventKind = EventKind::new("Seq");
const NOISE: EventKind = EventKind::new("Noise");

#[derive(Clone, Debug)]
enum Ev {
    Next,
    Seq { from: usize, n: u32 },
    Noise,
}

impl Event for Ev {
    const KINDS: &'static [EventKind] = &[NEXT, SEQ, NOISE];

    fn kind(&self) -> EventKind {
        match self {
            Ev::Next => NEXT,
            Ev::Seq { .. } => SEQ,
            Ev::Noise => NOISE,
        }
    }
}

/// Sends `count` numbered events to the sink, one per step.
struct Sender {
    sink: ActorId,
    index: usize,
    count: u32,
    sent: u32,
}

impl Sender {
    fn start(&mut self, ctx: &mut ActorContext<'_, Self>, _: Option<&Ev>) -> HandlerResult {
        ctx.raise(Ev::Next);
        Ok(())
    }

    fn on_next(&mut self, ctx: &mut ActorContext<'_, Self>, _: Ev) -> HandlerResult {
        ctx.send(
            &self.sink,
            Ev::Seq {
                from: self.index,
                n: self.sent,
            },
        )?;
        if self.sent % 2 == 0 {
            ctx.send(&self.sink, Ev::Noise)?;
        }
        self.sent += 1;
        if self.sent < self.count {
            ctx.raise(Ev::Next);
        }
        Ok(())
    }
}

impl Machine for Sender {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema
            .start_state("Sending")
            .on_entry(Self::start)
            .on_event(NEXT, Self::on_next);
    }
}

/// Checks that each sender's numbers arrive in order, deferring every
/// other batch to exercise the deferred path.
struct Sink {
    next: Vec<u32>,
    received: u32,
}

impl Sink {
    fn on_seq(&mut self, ctx: &mut ActorContext<'_, Self>, ev: Ev) -> HandlerResult {
        let Ev::Seq { from, n } = ev else {
            return Ok(());
        };
        let expected = self.next[from];
        ctx.assert(
            n == expected,
            format!("sender {from}: got {n}, expected {expected}"),
        )?;
        self.next[from] += 1;
        self.received += 1;
        if self.received % 3 == 0 {
            ctx.goto("Paused");
        }
        Ok(())
    }
}

impl Machine for Sink {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema
            .start_state("Open")
            .on_event(SEQ, Self::on_seq)
            .ignore(NOISE);
        schema
            .state("Paused")
            .defer(SEQ)
            .on_goto(NOISE, "Open");
    }
}

fn fan_in(senders: usize, count: u32) -> impl Fn(&mut TestContext<'_, Ev>) -> HandlerResult {
    move |ctx| {
        let sink = ctx.create_actor_named(
            "sink",
            Sink {
                next: vec![0; senders],
                received: 0,
            },
            None,
        )?;
        for index in 0..senders {
            ctx.create_actor(
                Sender {
                    sink: sink.clone(),
                    index,
                    count,
                    sent: 0,
                },
                None,
            )?;
        }
        Ok(())
    }
}

fn strategy_kind() -> impl Strategy<Value = StrategyKind> {
    prop_oneof![
        Just(StrategyKind::Random),
        (0u32..=4).prop_map(|switch_bound| StrategyKind::Probabilistic { switch_bound }),
        (0u32..=4).prop_map(|switch_points| StrategyKind::Prioritization { switch_points }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn events_from_one_sender_arrive_in_send_order(
        seed in any::<u64>(),
        senders in 1usize..=4,
        count in 1u32..=8,
        strategy in strategy_kind(),
    ) {
        let config = TestConfig::default().with_seed(seed).with_strategy(strategy);
        let outcome = run_iteration(&fan_in(senders, count), &config).unwrap();
        prop_assert_eq!(outcome.verdict, Verdict::Success, "{:?}", outcome.bug);
    }
}
