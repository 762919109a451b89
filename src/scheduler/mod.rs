//! The controlled scheduling loop.
//!
//! At every scheduling point the loop recomputes all operation statuses and
//! then takes the first matching rule:
//! - nothing enabled, a task sleeping: jump the clock to the earliest wake-up;
//! - nothing enabled, something blocked: deadlock;
//! - nothing enabled, a monitor hot: liveness violation;
//! - nothing enabled: quiesced;
//! - step bound reached: liveness (hot monitor), depth bound, or a clean stop;
//! - the strategy prunes the point: a prune marker ends the trace;
//! - otherwise the strategy picks one enabled operation, the decision is
//!   recorded, and that operation runs exactly one step.
//!
//! Bugs raised by user code end the loop at the step they surface in, even
//! when the code that saw the error dropped it.

pub mod outcome;
pub mod trace;

use tracing::{debug, trace, warn};

use crate::error::{EngineError, ExecutionError, HandlerResult};
use crate::event::Event;
use crate::runtime::kernel::{Kernel, TestContext};
use crate::runtime::operation::{OperationId, OperationStatus};
use crate::strategy::{Divergence, SchedulingPoint};

use self::outcome::{Bug, BugKind, IterationOutcome, Verdict};
use self::trace::Decision;

/// How the scheduling loop stopped.
#[derive(Debug)]
pub(crate) enum Termination {
    /// No operation could make progress and nothing was blocked.
    Quiesced,
    /// `max_steps` reached without a verdict.
    BoundReached,
    /// The strategy pruned an already visited state.
    Pruned,
    Bug(Bug),
}

impl<E: Event> Kernel<E> {
    /// Run the entry point, then schedule until termination.
    pub(crate) fn run<F>(&mut self, entry: &F) -> Result<Termination, EngineError>
    where
        F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
    {
        let result = self.run_entry(entry);
        if let Some(err) = self.step_failure(result) {
            return self.classify(err);
        }
        self.schedule()
    }

    fn classify(&self, err: ExecutionError) -> Result<Termination, EngineError> {
        match err {
            ExecutionError::Bug(mut bug) => {
                bug.step = self.step;
                if bug.operations.is_empty() {
                    bug.operations.push(self.current);
                }
                warn!(kind = %bug.kind, step = bug.step, message = %bug.message, "bug found");
                Ok(Termination::Bug(bug))
            }
            ExecutionError::Schema(err) => Err(err.into()),
            ExecutionError::Divergence(err) => Err(err.into()),
        }
    }

    /// A bug detected by the scheduler itself.
    fn detected(&self, kind: BugKind, message: String, operations: Vec<OperationId>) -> Termination {
        let mut bug = Bug::new(kind, message).with_operations(operations);
        bug.step = self.step;
        warn!(kind = %bug.kind, step = bug.step, message = %bug.message, "bug found");
        Termination::Bug(bug)
    }

    pub(crate) fn schedule(&mut self) -> Result<Termination, EngineError> {
        loop {
            let statuses = self.statuses();
            let enabled: Vec<OperationId> = statuses
                .iter()
                .enumerate()
                .filter(|(_, status)| status.is_enabled())
                .map(|(idx, _)| OperationId::from_u64(idx as u64))
                .collect();

            if enabled.is_empty() {
                let wake = statuses
                    .iter()
                    .filter_map(|status| match status {
                        OperationStatus::Sleeping { until } => Some(*until),
                        _ => None,
                    })
                    .min();
                if let Some(until) = wake {
                    trace!(until, "no operation enabled; advancing clock");
                    self.clock.advance_to(until);
                    continue;
                }
                return Ok(self.quiesce(&statuses));
            }

            if self.step >= self.limits.max_steps {
                return Ok(self.bound_reached());
            }

            let state_hash = self
                .strategy
                .wants_state_hash()
                .then(|| self.state_hash(&statuses));
            let revisited = state_hash.is_some_and(|hash| !self.strategy.visit_state(hash));
            if revisited || self.strategy.prune_here() {
                debug!(step = self.step, ?state_hash, "state already explored; pruning");
                self.trace.push(Decision::prune(self.current));
                return Ok(Termination::Pruned);
            }

            let point = SchedulingPoint {
                step: self.step,
                current: self.current,
                enabled: &enabled,
                state_hash,
            };
            let chosen = self.strategy.next_operation(&point)?;
            if !enabled.contains(&chosen) {
                return Err(Divergence {
                    step: self.step,
                    expected: "an enabled operation".to_string(),
                    found: chosen.to_string(),
                }
                .into());
            }

            trace!(
                step = self.step,
                from = %self.current,
                to = %chosen,
                enabled = enabled.len(),
                "schedule"
            );
            self.trace.push(Decision::schedule(self.current, chosen));
            self.step += 1;
            self.current = chosen;

            let result = self.run_operation(chosen);
            if let Some(err) = self.step_failure(result) {
                return self.classify(err);
            }

            if let Some((monitor, hot)) = self.tick_monitors() {
                let message = format!("monitor {monitor} stayed hot for {hot} steps");
                return Ok(self.detected(BugKind::Liveness, message, vec![chosen]));
            }
        }
    }

    fn quiesce(&self, statuses: &[OperationStatus]) -> Termination {
        let blocked: Vec<(OperationId, OperationStatus)> = statuses
            .iter()
            .enumerate()
            .filter(|(_, status)| status.is_blocked())
            .map(|(idx, status)| (OperationId::from_u64(idx as u64), *status))
            .collect();

        if !blocked.is_empty() {
            let reasons: Vec<String> = blocked
                .iter()
                .map(|&(op, status)| self.describe_blocked(op, status))
                .collect();
            let ops = blocked.iter().map(|&(op, _)| op).collect();
            return self.detected(BugKind::Deadlock, reasons.join("; "), ops);
        }

        if let Some(monitor) = self.hot_monitor() {
            let message = format!("monitor {monitor} is hot when the program quiesced");
            return self.detected(BugKind::Liveness, message, Vec::new());
        }

        debug!(step = self.step, "quiesced");
        Termination::Quiesced
    }

    fn bound_reached(&self) -> Termination {
        if let Some(monitor) = self.hot_monitor() {
            let message = format!(
                "monitor {monitor} is hot after {} steps",
                self.limits.max_steps
            );
            return self.detected(BugKind::Liveness, message, Vec::new());
        }
        if self.limits.report_depth_bound {
            let message = format!("reached the bound of {} steps", self.limits.max_steps);
            return self.detected(BugKind::DepthBound, message, Vec::new());
        }
        debug!(step = self.step, "step bound reached");
        Termination::BoundReached
    }

    /// Summarize the iteration. Consumes the recorded trace, log and drops.
    pub(crate) fn outcome(&mut self, iteration: u64, termination: Termination) -> IterationOutcome {
        let (verdict, bug, bound_reached, pruned) = match termination {
            Termination::Quiesced => (Verdict::Success, None, false, false),
            Termination::BoundReached => (Verdict::Success, None, true, false),
            Termination::Pruned => (Verdict::Success, None, false, true),
            Termination::Bug(bug) => {
                let bound = bug.kind == BugKind::DepthBound;
                (bug.verdict(), Some(bug), bound, false)
            }
        };
        IterationOutcome {
            iteration,
            verdict,
            bug,
            trace: std::mem::take(&mut self.trace),
            steps: self.step,
            bound_reached,
            pruned,
            dropped: std::mem::take(&mut self.dropped),
            log: self.log.dump(),
            clock: self.clock.now(),
        }
    }
}
