//! Same configuration, same trace; recorded trace, same verdict.

use proptest::prelude::*;

use actor_sim::{
    replay, run_iteration, trace_hash, ActorContext, ActorHost, ActorId, CounterId, Event,
    EventKind, HandlerResult, Machine, SchemaBuilder, StrategyKind, TaskStep, TestConfig,
    TestContext,
};

const WORK: EventKind = EventKind::new("Work");
const REPORT: EventKind = EventKind::new("Report");

#[derive(Clone, Debug)]
enum Ev {
    Work(u64),
    Report(u64),
}

impl Event for Ev {
    const KINDS: &'static [EventKind] = &[WORK, REPORT];

    fn kind(&self) -> EventKind {
        match self {
            Ev::Work(_) => WORK,
            Ev::Report(_) => REPORT,
        }
    }
}

/// Does a nondeterministic amount of work and reports it.
struct Node {
    total: CounterId,
    collector: ActorId,
}

impl Node {
    fn on_work(&mut self, ctx: &mut ActorContext<'_, Self>, ev: Ev) -> HandlerResult {
        let Ev::Work(budget) = ev else {
            return Ok(());
        };
        let spent = ctx.choose_int(budget + 1)?;
        if ctx.choose_bool()? {
            ctx.fetch_add(self.total, spent as i64)?;
        }
        ctx.send(&self.collector, Ev::Report(spent))
    }
}

impl Machine for Node {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Ready").on_event(WORK, Self::on_work);
    }
}

/// Fails on an arbitrary, schedule-dependent condition.
struct Collector {
    reports: Vec<u64>,
    expected: usize,
}

impl Collector {
    fn on_report(&mut self, ctx: &mut ActorContext<'_, Self>, ev: Ev) -> HandlerResult {
        if let Ev::Report(spent) = ev {
            self.reports.push(spent);
        }
        if self.reports.len() == self.expected {
            let sorted = self.reports.windows(2).all(|w| w[0] <= w[1]);
            ctx.assert(!sorted || self.expected < 3, "reports arrived sorted")?;
        }
        Ok(())
    }
}

impl Machine for Collector {
    type Event = Ev;

    fn configure(schema: &mut SchemaBuilder<ActorHost<Self>>) {
        schema.start_state("Collecting").on_event(REPORT, Self::on_report);
    }
}

fn network(nodes: usize, budget: u64) -> impl Fn(&mut TestContext<'_, Ev>) -> HandlerResult {
    move |ctx| {
        let total = ctx.new_counter(0);
        let collector = ctx.create_actor(
            Collector {
                reports: Vec::new(),
                expected: nodes,
            },
            None,
        )?;
        for _ in 0..nodes {
            let node = ctx.create_actor(
                Node {
                    total,
                    collector: collector.clone(),
                },
                None,
            )?;
            ctx.send(&node, Ev::Work(budget))?;
        }
        ctx.spawn_fn("auditor", move |cx| {
            let value = cx.read_counter(total)?;
            cx.assert(value >= 0, "negative total")?;
            Ok(TaskStep::Done)
        });
        Ok(())
    }
}

fn strategy_kind() -> impl Strategy<Value = StrategyKind> {
    prop_oneof![
        Just(StrategyKind::Random),
        (0u32..=6).prop_map(|switch_bound| StrategyKind::Probabilistic { switch_bound }),
        (0u32..=3).prop_map(|switch_points| StrategyKind::Prioritization { switch_points }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn same_seed_same_trace(
        seed in any::<u64>(),
        nodes in 1usize..=4,
        budget in 0u64..=5,
        strategy in strategy_kind(),
    ) {
        let config = TestConfig::default().with_seed(seed).with_strategy(strategy);
        let program = network(nodes, budget);
        let first = run_iteration(&program, &config).unwrap();
        let second = run_iteration(&program, &config).unwrap();
        prop_assert_eq!(&first.trace, &second.trace);
        prop_assert_eq!(first.verdict, second.verdict);
        prop_assert_eq!(first.steps, second.steps);
    }

    #[test]
    fn recorded_trace_replays_exactly(
        seed in any::<u64>(),
        nodes in 1usize..=4,
        budget in 0u64..=5,
        strategy in strategy_kind(),
    ) {
        let config = TestConfig::default().with_seed(seed).with_strategy(strategy);
        let program = network(nodes, budget);
        let recorded = run_iteration(&program, &config).unwrap();
        let replayed = replay(&program, &recorded.trace, &config).unwrap();
        prop_assert_eq!(trace_hash(&replayed.trace), trace_hash(&recorded.trace));
        prop_assert_eq!(replayed.verdict, recorded.verdict);
        prop_assert_eq!(replayed.bug, recorded.bug);
        prop_assert_eq!(replayed.clock, recorded.clock);
    }
}
