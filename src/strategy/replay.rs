//! Replays a recorded trace decision by decision.
//!
//! Strict replay (the default) fails with a [`Divergence`] whenever the live
//! program disagrees with the trace. Prefix replay follows the trace while it
//! applies and falls back to the first option afterwards; the minimizer uses
//! it to complete truncated traces.

use super::{Divergence, SchedulingPoint, Strategy};
use crate::runtime::operation::OperationId;
use crate::scheduler::trace::{Decision, DecisionKind, Trace};

#[derive(Clone, Debug)]
pub struct ReplayStrategy {
    trace: Trace,
    cursor: usize,
    strict: bool,
    used: bool,
}

impl ReplayStrategy {
    pub fn new(trace: Trace) -> Self {
        Self {
            trace,
            cursor: 0,
            strict: true,
            used: false,
        }
    }

    /// Follow `trace` as far as it applies, then take first options.
    pub fn prefix(trace: Trace) -> Self {
        Self {
            strict: false,
            ..Self::new(trace)
        }
    }

    fn next_decision(&mut self) -> (u64, Option<Decision>) {
        let step = self.cursor as u64;
        let decision = self.trace.get(self.cursor).copied();
        self.cursor += 1;
        (step, decision)
    }

    fn diverge<T>(&self, step: u64, expected: String, found: String) -> Result<T, Divergence> {
        Err(Divergence {
            step,
            expected,
            found,
        })
    }
}

fn describe(decision: Option<&Decision>) -> String {
    match decision {
        None => "end of trace".to_string(),
        Some(d) => match d.kind {
            DecisionKind::Schedule => format!("schedule of op{}", d.value),
            DecisionKind::Boolean => format!("boolean choice by {}", d.operation),
            DecisionKind::Integer { max } => {
                format!("integer choice below {max} by {}", d.operation)
            }
            DecisionKind::Prune => "a pruning point".to_string(),
        },
    }
}

impl Strategy for ReplayStrategy {
    fn prepare_iteration(&mut self, _iteration: u64) -> bool {
        if self.used {
            return false;
        }
        self.used = true;
        self.cursor = 0;
        true
    }

    fn next_operation(&mut self, point: &SchedulingPoint<'_>) -> Result<OperationId, Divergence> {
        let (step, decision) = self.next_decision();
        if let Some(chosen) = decision.as_ref().and_then(Decision::scheduled) {
            if point.enabled.contains(&chosen) {
                return Ok(chosen);
            }
            if self.strict {
                return self.diverge(
                    step,
                    format!("{chosen} to be enabled"),
                    format!("{} enabled operations", point.enabled.len()),
                );
            }
        } else if self.strict {
            return self.diverge(
                step,
                describe(decision.as_ref()),
                "a scheduling point".to_string(),
            );
        }
        Ok(point.enabled[0])
    }

    fn next_boolean(&mut self, op: OperationId) -> Result<bool, Divergence> {
        let (step, decision) = self.next_decision();
        match decision {
            Some(d) if d.kind == DecisionKind::Boolean && d.operation == op => Ok(d.value != 0),
            other if self.strict => self.diverge(
                step,
                describe(other.as_ref()),
                format!("boolean choice by {op}"),
            ),
            _ => Ok(false),
        }
    }

    fn next_integer(&mut self, op: OperationId, max: u64) -> Result<u64, Divergence> {
        let (step, decision) = self.next_decision();
        match decision {
            Some(d)
                if d.kind == (DecisionKind::Integer { max }) && d.operation == op && d.value < max =>
            {
                Ok(d.value)
            }
            other if self.strict => self.diverge(
                step,
                describe(other.as_ref()),
                format!("integer choice below {max} by {op}"),
            ),
            _ => Ok(0),
        }
    }

    fn prune_here(&mut self) -> bool {
        if self.trace.get(self.cursor).is_some_and(Decision::is_prune) {
            self.cursor += 1;
            return true;
        }
        false
    }

    fn finish_iteration(&mut self, _steps: u64) -> Result<(), Divergence> {
        if self.strict && self.cursor < self.trace.len() {
            let step = self.cursor as u64;
            return self.diverge(
                step,
                describe(self.trace.get(self.cursor)),
                "end of program".to_string(),
            );
        }
        Ok(())
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        let mode = if self.strict { "strict" } else { "prefix" };
        format!("replay ({mode}, {} decisions)", self.trace.len())
    }
}
