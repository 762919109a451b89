//! Per-iteration runtime: operations, contexts, resources, tasks and timers.

pub mod clock;
pub mod kernel;
pub mod operation;
pub mod resource;
pub mod snapshot;
pub mod task;
pub mod timer;
