//! Uniform random scheduling.

use super::rng::SimRng;
use super::{Divergence, SchedulingPoint, Strategy};
use crate::runtime::operation::OperationId;

/// Picks uniformly among enabled operations and choice values.
///
/// Each iteration reseeds from `(seed, iteration)`, so iteration `i` makes the
/// same decisions no matter which worker or run executes it.
#[derive(Clone, Debug)]
pub struct RandomStrategy {
    seed: u64,
    rng: SimRng,
}

impl RandomStrategy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: SimRng::for_iteration(seed, 0),
        }
    }
}

impl Strategy for RandomStrategy {
    fn prepare_iteration(&mut self, iteration: u64) -> bool {
        self.rng = SimRng::for_iteration(self.seed, iteration);
        true
    }

    fn next_operation(&mut self, point: &SchedulingPoint<'_>) -> Result<OperationId, Divergence> {
        Ok(point.enabled[self.rng.gen_index(point.enabled.len())])
    }

    fn next_boolean(&mut self, _op: OperationId) -> Result<bool, Divergence> {
        Ok(self.rng.gen_bool(1, 2))
    }

    fn next_integer(&mut self, _op: OperationId, max: u64) -> Result<u64, Divergence> {
        Ok(self.rng.gen_below(max))
    }

    fn is_fair(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        format!("random (seed {})", self.seed)
    }
}
