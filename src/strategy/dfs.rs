//! Exhaustive depth-first exploration of the decision tree.
//!
//! Each decision (schedule or choice) is a node recording the options that
//! were available and the alternative taken. An iteration replays the
//! current stack as a prefix, then always takes the first option at new
//! nodes. Between iterations the deepest node with an untried alternative is
//! advanced and everything below it is discarded.
//!
//! Invariants:
//! - Replaying the prefix must observe the same options at every node;
//!   anything else means the program is nondeterministic and is reported
//!   as a [`Divergence`].
//! - With state caching off, every distinct interleaving runs exactly once.
//! - With state caching on, a frontier point whose state hash was already
//!   seen ends the iteration (`visit_state` returns false). Points inside the
//!   replayed prefix are never pruned.

use ahash::AHashSet;

use super::{Divergence, SchedulingPoint, Strategy};
use crate::runtime::operation::OperationId;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Options {
    Schedule(Vec<OperationId>),
    Boolean,
    Integer(u64),
}

impl Options {
    fn width(&self) -> u64 {
        match self {
            Self::Schedule(ops) => ops.len() as u64,
            Self::Boolean => 2,
            Self::Integer(max) => *max,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Schedule(ops) => {
                let ids: Vec<String> = ops.iter().map(ToString::to_string).collect();
                format!("schedule among [{}]", ids.join(", "))
            }
            Self::Boolean => "boolean choice".to_string(),
            Self::Integer(max) => format!("integer choice below {max}"),
        }
    }
}

#[derive(Clone, Debug)]
struct Node {
    options: Options,
    chosen: u64,
}

#[derive(Debug, Default)]
pub struct DfsStrategy {
    stack: Vec<Node>,
    cursor: usize,
    started: bool,
    exhausted: bool,
    state_caching: bool,
    visited: AHashSet<u64>,
}

impl DfsStrategy {
    pub fn new(state_caching: bool) -> Self {
        Self {
            state_caching,
            ..Self::default()
        }
    }

    /// Whether the whole tree has been explored.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn decide(&mut self, options: Options) -> Result<u64, Divergence> {
        let step = self.cursor as u64;
        self.cursor += 1;
        match self.stack.get(step as usize) {
            Some(node) if node.options == options => Ok(node.chosen),
            Some(node) => Err(Divergence {
                step,
                expected: node.options.describe(),
                found: options.describe(),
            }),
            None => {
                self.stack.push(Node { options, chosen: 0 });
                Ok(0)
            }
        }
    }
}

impl Strategy for DfsStrategy {
    fn prepare_iteration(&mut self, _iteration: u64) -> bool {
        self.cursor = 0;
        if !self.started {
            self.started = true;
            return true;
        }
        while let Some(node) = self.stack.last_mut() {
            if node.chosen + 1 < node.options.width() {
                node.chosen += 1;
                return true;
            }
            self.stack.pop();
        }
        self.exhausted = true;
        false
    }

    fn next_operation(&mut self, point: &SchedulingPoint<'_>) -> Result<OperationId, Divergence> {
        let idx = self.decide(Options::Schedule(point.enabled.to_vec()))?;
        Ok(point.enabled[idx as usize])
    }

    fn next_boolean(&mut self, _op: OperationId) -> Result<bool, Divergence> {
        Ok(self.decide(Options::Boolean)? == 1)
    }

    fn next_integer(&mut self, _op: OperationId, max: u64) -> Result<u64, Divergence> {
        self.decide(Options::Integer(max))
    }

    fn finish_iteration(&mut self, _steps: u64) -> Result<(), Divergence> {
        // Nodes past the cursor were not reached this time and cannot be
        // backtracked into.
        self.stack.truncate(self.cursor);
        Ok(())
    }

    fn wants_state_hash(&self) -> bool {
        self.state_caching
    }

    fn visit_state(&mut self, hash: u64) -> bool {
        if self.cursor < self.stack.len() {
            self.visited.insert(hash);
            return true;
        }
        self.visited.insert(hash)
    }

    fn is_fair(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        if self.state_caching {
            "dfs (state caching)".to_string()
        } else {
            "dfs".to_string()
        }
    }
}
