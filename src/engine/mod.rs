//! Exploration driver.
//!
//! [`TestEngine`] runs a test entry point for many iterations under one
//! strategy and aggregates the verdicts into a [`TestReport`]. The strategy
//! and the schema cache survive across iterations, while each iteration gets a
//! fresh kernel. Nothing else carries over, so every iteration is determined
//! by the strategy's decisions alone.
//!
//! [`run_iteration`] and [`replay`] are single-iteration drivers. Replay is
//! strict: if the program no longer matches the trace, it fails with
//! [`EngineError::Divergence`] rather than producing a verdict.

pub mod artifact;
pub mod config;
pub mod minimize;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::actor::machine::{self, ActorHost, Machine};
use crate::actor::schema::SchemaCache;
use crate::error::{EngineError, HandlerResult};
use crate::event::Event;
use crate::monitor::{self, Monitor, MonitorHost};
use crate::runtime::kernel::{Kernel, TestContext};
use crate::scheduler::outcome::IterationOutcome;
use crate::scheduler::trace::Trace;
use crate::strategy::replay::ReplayStrategy;
use crate::strategy::{self, Strategy};

use self::config::{StrategyKind, TestConfig};

/// State carried from one iteration to the next.
struct Parts {
    strategy: Box<dyn Strategy>,
    schemas: SchemaCache,
}

impl Parts {
    fn new(strategy: Box<dyn Strategy>) -> Self {
        Self {
            strategy,
            schemas: SchemaCache::default(),
        }
    }

    fn from_config(config: &TestConfig) -> Self {
        Self::new(strategy::from_config(config))
    }

    /// Run one iteration. `Ok(None)` means the strategy is exhausted.
    fn run_iteration<E, F>(
        self,
        config: &TestConfig,
        iteration: u64,
        entry: &F,
    ) -> (Self, Result<Option<IterationOutcome>, EngineError>)
    where
        E: Event,
        F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
    {
        let Parts {
            mut strategy,
            schemas,
        } = self;
        if !strategy.prepare_iteration(iteration) {
            return (Parts { strategy, schemas }, Ok(None));
        }

        let description = strategy.description();
        let span = info_span!("iteration", iteration, strategy = %description);
        let _guard = span.enter();

        let mut kernel = Kernel::new(strategy, schemas, config);
        let result = kernel
            .run(entry)
            .map(|termination| kernel.outcome(iteration, termination));
        let steps = kernel.step;
        let (mut strategy, schemas) = kernel.into_parts();

        let result = result.and_then(|outcome| {
            strategy.finish_iteration(steps)?;
            debug!(verdict = ?outcome.verdict, steps = outcome.steps, "iteration finished");
            Ok(Some(outcome))
        });
        (Parts { strategy, schemas }, result)
    }
}

/// A buggy iteration.
#[derive(Clone, Debug, Serialize)]
pub struct BugFound {
    pub iteration: u64,
    pub seed: u64,
    pub outcome: IterationOutcome,
}

/// Aggregated results of an exploration.
#[derive(Clone, Debug, Serialize)]
pub struct TestReport {
    pub strategy: String,
    pub iterations: u64,
    pub bugs: Vec<BugFound>,
    pub min_steps: u64,
    pub max_steps: u64,
    pub total_steps: u64,
    /// The strategy had no iteration left to run.
    pub exhausted: bool,
    /// Iterations that reached `max_steps`.
    pub depth_bound_hits: u64,
    /// Iterations cut short by state caching.
    pub pruned: u64,
    pub elapsed: Duration,
}

impl TestReport {
    fn new(strategy: String) -> Self {
        Self {
            strategy,
            iterations: 0,
            bugs: Vec::new(),
            min_steps: 0,
            max_steps: 0,
            total_steps: 0,
            exhausted: false,
            depth_bound_hits: 0,
            pruned: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, seed: u64, outcome: IterationOutcome) {
        self.min_steps = if self.iterations == 0 {
            outcome.steps
        } else {
            self.min_steps.min(outcome.steps)
        };
        self.max_steps = self.max_steps.max(outcome.steps);
        self.total_steps += outcome.steps;
        self.iterations += 1;
        if outcome.bound_reached {
            self.depth_bound_hits += 1;
        }
        if outcome.pruned {
            self.pruned += 1;
        }
        if outcome.is_bug() {
            self.bugs.push(BugFound {
                iteration: outcome.iteration,
                seed,
                outcome,
            });
        }
    }

    pub fn has_bugs(&self) -> bool {
        !self.bugs.is_empty()
    }

    pub fn first_bug(&self) -> Option<&BugFound> {
        self.bugs.first()
    }

    fn log_summary(&self) {
        info!(
            strategy = %self.strategy,
            iterations = self.iterations,
            bugs = self.bugs.len(),
            exhausted = self.exhausted,
            total_steps = self.total_steps,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "exploration finished"
        );
    }
}

/// Runs many iterations of one test.
pub struct TestEngine {
    config: TestConfig,
    parts: Option<Parts>,
    custom_strategy: bool,
}

impl TestEngine {
    /// Engine with the strategy named by `config.strategy`.
    pub fn new(config: TestConfig) -> Self {
        Self {
            parts: Some(Parts::from_config(&config)),
            config,
            custom_strategy: false,
        }
    }

    /// Engine with a caller-supplied strategy. `config.strategy` is ignored.
    pub fn with_strategy(config: TestConfig, strategy: Box<dyn Strategy>) -> Self {
        Self {
            config,
            parts: Some(Parts::new(strategy)),
            custom_strategy: true,
        }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    fn parts_mut(&mut self) -> &mut Parts {
        let config = &self.config;
        self.parts.get_or_insert_with(|| Parts::from_config(config))
    }

    /// Build and cache the schema of `M`, reporting declaration errors.
    pub fn validate_machine<M: Machine>(&mut self) -> Result<(), EngineError> {
        self.parts_mut()
            .schemas
            .get_or_build::<ActorHost<M>>(machine::build_schema::<M>)?;
        Ok(())
    }

    pub fn validate_monitor<M: Monitor>(&mut self) -> Result<(), EngineError> {
        self.parts_mut()
            .schemas
            .get_or_build::<MonitorHost<M>>(monitor::build_schema::<M>)?;
        Ok(())
    }

    fn deadline(&self, started: Instant) -> Option<Instant> {
        self.config
            .timeout_ms
            .map(|ms| started + Duration::from_millis(ms))
    }

    /// Run up to `config.iterations` iterations.
    pub fn explore<E, F>(&mut self, entry: &F) -> Result<TestReport, EngineError>
    where
        E: Event,
        F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
    {
        self.config.validate()?;
        let started = Instant::now();
        let deadline = self.deadline(started);
        let mut parts = match self.parts.take() {
            Some(parts) => parts,
            None => Parts::from_config(&self.config),
        };

        let mut report = TestReport::new(parts.strategy.description());
        info!(
            strategy = %report.strategy,
            iterations = self.config.iterations,
            seed = self.config.seed,
            "exploration started"
        );

        let mut failure = None;
        for iteration in 0..self.config.iterations {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                info!(iteration, "exploration timed out");
                break;
            }
            let (next, result) = parts.run_iteration(&self.config, iteration, entry);
            parts = next;
            match result {
                Err(err) => {
                    failure = Some(err);
                    break;
                }
                Ok(None) => {
                    report.exhausted = true;
                    break;
                }
                Ok(Some(outcome)) => {
                    let is_bug = outcome.is_bug();
                    report.record(self.config.seed, outcome);
                    if is_bug && self.config.stop_on_first_bug {
                        break;
                    }
                }
            }
        }
        self.parts = Some(parts);
        if let Some(err) = failure {
            return Err(err);
        }

        report.elapsed = started.elapsed();
        report.log_summary();
        Ok(report)
    }

    /// Like [`explore`](Self::explore), with iterations spread over
    /// `workers` scoped threads.
    ///
    /// Worker `w` runs iterations `w, w + workers, ...` with its own
    /// strategy and schema cache. Results are merged in iteration order.
    /// DFS and custom strategies keep their state across iterations and run
    /// on the calling thread instead.
    pub fn explore_parallel<E, F>(
        &mut self,
        entry: &F,
        workers: usize,
    ) -> Result<TestReport, EngineError>
    where
        E: Event,
        F: Fn(&mut TestContext<'_, E>) -> HandlerResult + Sync,
    {
        let sequential = workers <= 1
            || self.custom_strategy
            || matches!(self.config.strategy, StrategyKind::Dfs { .. });
        if sequential {
            return self.explore(entry);
        }
        self.config.validate()?;

        let started = Instant::now();
        let deadline = self.deadline(started);
        let config = &self.config;
        let stop = AtomicBool::new(false);
        let stop = &stop;
        info!(
            strategy = ?config.strategy,
            iterations = config.iterations,
            workers,
            "parallel exploration started"
        );

        let results: Vec<Result<Vec<IterationOutcome>, EngineError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    scope.spawn(move || {
                        run_worker(config, worker as u64, workers as u64, entry, stop, deadline)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        });

        let mut outcomes = Vec::new();
        for result in results {
            outcomes.extend(result?);
        }
        outcomes.sort_by_key(|outcome| outcome.iteration);
        if config.stop_on_first_bug {
            if let Some(first) = outcomes.iter().position(IterationOutcome::is_bug) {
                outcomes.truncate(first + 1);
            }
        }

        let mut report = TestReport::new(strategy::from_config(config).description());
        for outcome in outcomes {
            report.record(config.seed, outcome);
        }
        report.elapsed = started.elapsed();
        report.log_summary();
        Ok(report)
    }
}

fn run_worker<E, F>(
    config: &TestConfig,
    worker: u64,
    workers: u64,
    entry: &F,
    stop: &AtomicBool,
    deadline: Option<Instant>,
) -> Result<Vec<IterationOutcome>, EngineError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    let _span = info_span!("worker", worker).entered();
    let mut parts = Parts::from_config(config);
    let mut outcomes = Vec::new();
    let mut iteration = worker;
    while iteration < config.iterations && !stop.load(Ordering::Relaxed) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        let (next, result) = parts.run_iteration(config, iteration, entry);
        parts = next;
        let Some(outcome) = result? else {
            break;
        };
        if outcome.is_bug() && config.stop_on_first_bug {
            stop.store(true, Ordering::Relaxed);
        }
        outcomes.push(outcome);
        iteration += workers;
    }
    Ok(outcomes)
}

fn single<E, F>(
    parts: Parts,
    config: &TestConfig,
    iteration: u64,
    entry: &F,
) -> Result<IterationOutcome, EngineError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    config.validate()?;
    let (_, result) = parts.run_iteration(config, iteration, entry);
    result?.ok_or(EngineError::Exhausted)
}

/// Run iteration 0 of the configured strategy.
pub fn run_iteration<E, F>(entry: &F, config: &TestConfig) -> Result<IterationOutcome, EngineError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    single(Parts::from_config(config), config, 0, entry)
}

/// Replay `trace` exactly.
pub fn replay<E, F>(
    entry: &F,
    trace: &Trace,
    config: &TestConfig,
) -> Result<IterationOutcome, EngineError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    replay_with(entry, ReplayStrategy::new(trace.clone()), config, 0)
}

pub(crate) fn replay_with<E, F>(
    entry: &F,
    strategy: ReplayStrategy,
    config: &TestConfig,
    iteration: u64,
) -> Result<IterationOutcome, EngineError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    single(Parts::new(Box::new(strategy)), config, iteration, entry)
}
