//! Spawned tasks: sleeping, joining, semaphores and panics.

use actor_sim::{
    run_iteration, BugKind, CounterId, Event, EventKind, HandlerResult, OperationId,
    SemaphoreId, StateHasher, StrategyKind, Task, TaskContext, TaskStep, TestConfig, TestContext,
    TestEngine, Verdict,
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

fn sleeper(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
    let mut slept = false;
    ctx.spawn_fn("sleeper", move |cx| {
        if !slept {
            slept = true;
            cx.sleep(10);
            return Ok(TaskStep::Yield);
        }
        let now = cx.now();
        cx.assert(now == 10, format!("woke at tick {now}"))?;
        Ok(TaskStep::Done)
    });
    Ok(())
}

#[test]
fn sleeping_advances_the_clock_only_when_nothing_else_runs() {
    init_tracing();
    let outcome = run_iteration(&sleeper, &TestConfig::default()).unwrap();
    assert_eq!(outcome.verdict, Verdict::Success, "{:?}", outcome.bug);
    assert_eq!(outcome.clock, 10);
}

/// Writes a value, then finishes.
fn child(cell: CounterId) -> impl FnMut(&mut TaskContext<'_, Ev>) -> HandlerResult<TaskStep> {
    move |cx| {
        cx.write_counter(cell, 7)?;
        Ok(TaskStep::Done)
    }
}

fn joiner(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
    let cell = ctx.new_counter(0);
    let target = ctx.spawn_fn("child", child(cell));
    ctx.spawn_fn("parent", move |cx| {
        if !cx.join(target)? {
            return Ok(TaskStep::Yield);
        }
        let value = cx.read_counter(cell)?;
        cx.assert(value == 7, format!("joined before the child wrote ({value})"))?;
        Ok(TaskStep::Done)
    });
    Ok(())
}

#[test]
fn join_observes_the_finished_child_in_every_schedule() {
    init_tracing();
    let config = TestConfig::default().with_strategy(StrategyKind::Dfs {
        state_caching: false,
    });
    let report = TestEngine::new(config).explore(&joiner).unwrap();
    assert!(report.exhausted);
    assert!(!report.has_bugs(), "{:?}", report.first_bug());
}

#[test]
fn joining_yourself_is_illegal() {
    fn entry(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
        ctx.spawn_fn("narcissus", |cx| {
            let me = cx.operation();
            cx.join(me)?;
            Ok(TaskStep::Done)
        });
        Ok(())
    }

    init_tracing();
    let outcome = run_iteration(&entry, &TestConfig::default()).unwrap();
    assert_eq!(outcome.bug_kind(), Some(BugKind::IllegalAction));
}

#[test]
fn joining_an_unknown_operation_is_illegal() {
    fn entry(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
        ctx.spawn_fn("lost", |cx| {
            cx.join(OperationId::from_u64(99))?;
            Ok(TaskStep::Done)
        });
        Ok(())
    }

    init_tracing();
    let outcome = run_iteration(&entry, &TestConfig::default()).unwrap();
    assert_eq!(outcome.bug_kind(), Some(BugKind::IllegalAction));
}

#[derive(Clone, Copy, Debug, Hash)]
enum Phase {
    Acquire,
    Work,
    Release,
}

/// Holds one permit of a shared semaphore for one step.
struct Worker {
    permits: SemaphoreId,
    inside: CounterId,
    limit: i64,
    phase: Phase,
}

impl Task<Ev> for Worker {
    fn step(&mut self, cx: &mut TaskContext<'_, Ev>) -> HandlerResult<TaskStep> {
        match self.phase {
            Phase::Acquire => {
                if cx.acquire(self.permits)? {
                    let before = cx.fetch_add(self.inside, 1)?;
                    cx.assert(before < self.limit, format!("{} workers inside", before + 1))?;
                    self.phase = Phase::Work;
                }
                Ok(TaskStep::Yield)
            }
            Phase::Work => {
                self.phase = Phase::Release;
                Ok(TaskStep::Yield)
            }
            Phase::Release => {
                cx.fetch_add(self.inside, -1)?;
                cx.release(self.permits)?;
                Ok(TaskStep::Done)
            }
        }
    }

    fn snapshot(&self, state: &mut StateHasher) {
        state.write(&self.phase);
    }
}

fn bounded_workers(permits: u32, limit: i64) -> impl Fn(&mut TestContext<'_, Ev>) -> HandlerResult {
    move |ctx| {
        let sem = ctx.new_semaphore(permits);
        let inside = ctx.new_counter(0);
        for name in ["w1", "w2", "w3"] {
            ctx.spawn(
                name,
                Worker {
                    permits: sem,
                    inside,
                    limit,
                    phase: Phase::Acquire,
                },
            );
        }
        Ok(())
    }
}

fn dfs_cached() -> TestConfig {
    TestConfig::default()
        .with_iterations(10_000)
        .with_strategy(StrategyKind::Dfs {
            state_caching: true,
        })
}

#[test]
fn semaphore_never_admits_more_than_its_permits() {
    init_tracing();
    let report = TestEngine::new(dfs_cached())
        .explore(&bounded_workers(2, 2))
        .unwrap();
    assert!(report.exhausted);
    assert!(!report.has_bugs(), "{:?}", report.first_bug());
}

#[test]
fn exceeding_the_expected_occupancy_is_found() {
    init_tracing();
    let report = TestEngine::new(dfs_cached())
        .explore(&bounded_workers(2, 1))
        .unwrap();
    let found = report.first_bug().expect("two workers inside at once");
    assert_eq!(found.outcome.bug_kind(), Some(BugKind::Assertion));
}

#[test]
fn panicking_task_is_reported_as_a_bug() {
    fn entry(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
        ctx.spawn_fn("boom", |_| panic!("task exploded"));
        Ok(())
    }

    init_tracing();
    let outcome = run_iteration(&entry, &TestConfig::default()).unwrap();
    assert_eq!(outcome.bug_kind(), Some(BugKind::Panic));
    let bug = outcome.bug.unwrap();
    assert!(bug.message.contains("task exploded"), "{}", bug.message);
    assert_eq!(bug.operations, vec![OperationId::from_u64(1)]);
}

#[test]
fn dropped_assertion_still_fails_the_iteration() {
    fn entry(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
        ctx.spawn_fn("careless", |cx| {
            let failed = cx.assert(false, "invariant broken").is_err();
            cx.log(format!("assertion failed: {failed}"));
            Ok(TaskStep::Done)
        });
        Ok(())
    }

    init_tracing();
    let outcome = run_iteration(&entry, &TestConfig::default()).unwrap();
    assert_eq!(outcome.verdict, Verdict::AssertionFailure);
    let bug = outcome.bug.unwrap();
    assert_eq!(bug.message, "invariant broken");
    assert_eq!(bug.step, 1);
}

#[test]
fn dropped_misuse_in_the_entry_point_is_reported() {
    fn entry(ctx: &mut TestContext<'_, Ev>) -> HandlerResult {
        let lock = ctx.new_lock();
        let _ = ctx.release(lock);
        Ok(())
    }

    init_tracing();
    let outcome = run_iteration(&entry, &TestConfig::default()).unwrap();
    assert_eq!(outcome.bug_kind(), Some(BugKind::ResourceMisuse));
    assert_eq!(outcome.steps, 0);
}
