//! Error types shared by handlers and the exploration driver.
//!
//! Two layers:
//! - [`ExecutionError`] ends the current iteration. Handlers return it through
//!   [`HandlerResult`] and propagate it with `?`.
//! - [`EngineError`] ends an exploration. It is never a bug verdict: schema
//!   defects, replay divergence and invalid configuration are reported here.

use crate::actor::schema::SchemaError;
use crate::engine::config::ConfigError;
use crate::scheduler::outcome::Bug;
use crate::strategy::Divergence;

/// Result type returned by actions, continuations, task steps and entry points.
pub type HandlerResult<T = ()> = Result<T, ExecutionError>;

/// Reason the current iteration cannot continue.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A bug was found; the iteration ends with a classified verdict.
    #[error(transparent)]
    Bug(#[from] Bug),
    /// A machine or monitor declaration is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// The strategy could not follow the live program (replay only).
    #[error(transparent)]
    Divergence(#[from] Divergence),
}

impl ExecutionError {
    /// The bug carried by this error, if it is one.
    pub fn as_bug(&self) -> Option<&Bug> {
        match self {
            Self::Bug(bug) => Some(bug),
            _ => None,
        }
    }
}

/// Errors that abort exploration instead of producing a verdict.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid state machine declaration: {0}")]
    Schema(#[from] SchemaError),
    #[error("replayed trace no longer matches the program: {0}")]
    Divergence(#[from] Divergence),
    #[error("invalid test configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("the strategy has no iteration left to run")]
    Exhausted,
}
