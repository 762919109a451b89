//! Sticky random scheduling: keep running the current operation and switch
//! away with probability `1 / 2^switch_bound` per step.

use super::rng::SimRng;
use super::{Divergence, SchedulingPoint, Strategy};
use crate::runtime::operation::OperationId;

const MAX_SWITCH_BOUND: u32 = 62;

#[derive(Clone, Debug)]
pub struct ProbabilisticStrategy {
    seed: u64,
    switch_bound: u32,
    rng: SimRng,
}

impl ProbabilisticStrategy {
    pub fn new(seed: u64, switch_bound: u32) -> Self {
        Self {
            seed,
            switch_bound: switch_bound.min(MAX_SWITCH_BOUND),
            rng: SimRng::for_iteration(seed, 0),
        }
    }
}

impl Strategy for ProbabilisticStrategy {
    fn prepare_iteration(&mut self, iteration: u64) -> bool {
        self.rng = SimRng::for_iteration(self.seed, iteration);
        true
    }

    fn next_operation(&mut self, point: &SchedulingPoint<'_>) -> Result<OperationId, Divergence> {
        let stay = point.enabled.contains(&point.current)
            && !self.rng.gen_bool(1, 1u64 << self.switch_bound);
        if stay {
            return Ok(point.current);
        }
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
        format!(
            "probabilistic (seed {}, switch 1/2^{})",
            self.seed, self.switch_bound
        )
    }
}
