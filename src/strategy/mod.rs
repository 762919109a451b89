//! Exploration strategies.
//!
//! The scheduler consults a [`Strategy`] at every scheduling point and at
//! every nondeterministic choice. Strategies never see program state beyond
//! the enabled set and an optional state hash; they only decide.
//!
//! Contract:
//! - `prepare_iteration` is called before every iteration; `false` means the
//!   search space is exhausted and no iteration runs.
//! - `next_operation` must return a member of `point.enabled`.
//! - `finish_iteration` is called once when the iteration terminates, with
//!   the number of schedule steps taken.
//! - Only replay-style strategies return [`Divergence`].

pub mod dfs;
pub mod prioritization;
pub mod probabilistic;
pub mod random;
pub mod replay;
pub mod rng;

use crate::engine::config::{StrategyKind, TestConfig};
use crate::runtime::operation::OperationId;

/// What the strategy sees at a scheduling point.
#[derive(Clone, Copy, Debug)]
pub struct SchedulingPoint<'a> {
    /// Schedule steps taken so far in this iteration.
    pub step: u64,
    /// Operation that ran last (the entry point before the first step).
    pub current: OperationId,
    /// Enabled operations, in id order. Never empty.
    pub enabled: &'a [OperationId],
    /// Program state hash, when the strategy asked for it.
    pub state_hash: Option<u64>,
}

/// A recorded trace no longer matches the program.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("at decision {step}: expected {expected}, found {found}")]
pub struct Divergence {
    pub step: u64,
    pub expected: String,
    pub found: String,
}

/// Decision policy for scheduling points and choices.
pub trait Strategy {
    fn prepare_iteration(&mut self, iteration: u64) -> bool;

    fn next_operation(&mut self, point: &SchedulingPoint<'_>) -> Result<OperationId, Divergence>;

    fn next_boolean(&mut self, op: OperationId) -> Result<bool, Divergence>;

    /// A value in `[0, max)`. `max` is never zero.
    fn next_integer(&mut self, op: OperationId, max: u64) -> Result<u64, Divergence>;

    fn finish_iteration(&mut self, _steps: u64) -> Result<(), Divergence> {
        Ok(())
    }

    /// Whether the scheduler should compute `state_hash` for each point.
    fn wants_state_hash(&self) -> bool {
        false
    }

    /// Record a program state. `false` prunes the rest of the iteration.
    fn visit_state(&mut self, _hash: u64) -> bool {
        true
    }

    /// Whether the iteration ends at this scheduling point as pruned.
    /// Replay uses it to stop where the recorded iteration was pruned.
    fn prune_here(&mut self) -> bool {
        false
    }

    /// Whether every continuously enabled operation is eventually scheduled.
    fn is_fair(&self) -> bool;

    fn description(&self) -> String;
}

/// Build the configured strategy.
pub(crate) fn from_config(config: &TestConfig) -> Box<dyn Strategy> {
    match config.strategy {
        StrategyKind::Random => Box::new(random::RandomStrategy::new(config.seed)),
        StrategyKind::Probabilistic { switch_bound } => Box::new(
            probabilistic::ProbabilisticStrategy::new(config.seed, switch_bound),
        ),
        StrategyKind::Prioritization { switch_points } => {
            Box::new(prioritization::PrioritizationStrategy::new(
                config.seed,
                config.max_steps,
                Box::new(prioritization::UniformSwitchPolicy::new(switch_points)),
            ))
        }
        StrategyKind::Dfs { state_caching } => Box::new(dfs::DfsStrategy::new(state_caching)),
    }
}
