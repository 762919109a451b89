//! Priority-based scheduling with a bounded number of priority switches.
//!
//! Operations receive a random priority slot when they are first seen. The
//! highest-priority enabled operation always runs. At a small set of
//! switch steps the running operation is demoted to the lowest priority,
//! which lets the search reach bugs that need a specific, small number of
//! preemptions.

use std::collections::BTreeSet;

use super::rng::SimRng;
use super::{Divergence, SchedulingPoint, Strategy};
use crate::runtime::operation::OperationId;

/// Chooses the steps at which priorities change.
pub trait SwitchPolicy {
    /// Steps in `[0, horizon)` at which to demote the running operation.
    fn switch_points(&mut self, rng: &mut SimRng, horizon: u64) -> BTreeSet<u64>;

    fn description(&self) -> String;
}

/// `count` distinct switch steps drawn uniformly over the horizon.
#[derive(Clone, Copy, Debug)]
pub struct UniformSwitchPolicy {
    count: u32,
}

impl UniformSwitchPolicy {
    pub fn new(count: u32) -> Self {
        Self { count }
    }
}

impl SwitchPolicy for UniformSwitchPolicy {
    fn switch_points(&mut self, rng: &mut SimRng, horizon: u64) -> BTreeSet<u64> {
        let want = u64::from(self.count).min(horizon);
        let mut points = BTreeSet::new();
        while (points.len() as u64) < want {
            points.insert(rng.gen_below(horizon));
        }
        points
    }

    fn description(&self) -> String {
        format!("{} uniform switch points", self.count)
    }
}

pub struct PrioritizationStrategy {
    seed: u64,
    max_steps: u64,
    policy: Box<dyn SwitchPolicy>,
    rng: SimRng,
    /// Highest priority first.
    priorities: Vec<OperationId>,
    switches: BTreeSet<u64>,
    last_length: u64,
}

impl PrioritizationStrategy {
    pub fn new(seed: u64, max_steps: u64, policy: Box<dyn SwitchPolicy>) -> Self {
        Self {
            seed,
            max_steps,
            policy,
            rng: SimRng::for_iteration(seed, 0),
            priorities: Vec::new(),
            switches: BTreeSet::new(),
            last_length: 0,
        }
    }

    fn highest_enabled(&self, enabled: &[OperationId]) -> Option<usize> {
        self.priorities.iter().position(|op| enabled.contains(op))
    }
}

impl Strategy for PrioritizationStrategy {
    fn prepare_iteration(&mut self, iteration: u64) -> bool {
        self.rng = SimRng::for_iteration(self.seed, iteration);
        self.priorities.clear();
        let horizon = self.last_length.max(self.max_steps / 2).max(1);
        self.switches = self.policy.switch_points(&mut self.rng, horizon);
        true
    }

    fn next_operation(&mut self, point: &SchedulingPoint<'_>) -> Result<OperationId, Divergence> {
        for &op in point.enabled {
            if !self.priorities.contains(&op) {
                let slot = self.rng.gen_index(self.priorities.len() + 1);
                self.priorities.insert(slot, op);
            }
        }

        if self.switches.remove(&point.step) {
            if let Some(top) = self.highest_enabled(point.enabled) {
                let demoted = self.priorities.remove(top);
                self.priorities.push(demoted);
            }
        }

        match self.highest_enabled(point.enabled) {
            Some(idx) => Ok(self.priorities[idx]),
            None => Ok(point.enabled[0]),
        }
    }

    fn next_boolean(&mut self, _op: OperationId) -> Result<bool, Divergence> {
        Ok(self.rng.gen_bool(1, 2))
    }

    fn next_integer(&mut self, _op: OperationId, max: u64) -> Result<u64, Divergence> {
        Ok(self.rng.gen_below(max))
    }

    fn finish_iteration(&mut self, steps: u64) -> Result<(), Divergence> {
        self.last_length = steps;
        Ok(())
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        format!(
            "prioritization (seed {}, {})",
            self.seed,
            self.policy.description()
        )
    }
}
