//! Deterministic trace minimizer.
//!
//! Shrinks a failing [`ReproArtifact`] by cutting decisions off the tail of
//! its trace. Each candidate prefix is completed by a prefix replay (first
//! option at every decision past the cut) and kept only if it reproduces the
//! same bug kind with a strictly shorter recorded trace. The kept artifact
//! always carries the exact re-recorded trace, so it replays strictly.
//!
//! Cut sizes halve on every rejected candidate. The result is locally
//! minimal with respect to tail cuts, not globally minimal.

use tracing::debug;

use crate::error::{EngineError, HandlerResult};
use crate::event::Event;
use crate::runtime::kernel::TestContext;
use crate::strategy::replay::ReplayStrategy;

use super::artifact::ReproArtifact;
use super::replay_with;

#[derive(Clone, Copy, Debug)]
pub struct MinimizeConfig {
    /// Maximum candidate replays.
    pub max_checks: u32,
}

impl Default for MinimizeConfig {
    fn default() -> Self {
        Self { max_checks: 64 }
    }
}

pub fn minimize<E, F>(
    entry: &F,
    failing: &ReproArtifact,
    cfg: MinimizeConfig,
) -> Result<ReproArtifact, EngineError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    let kind = failing.bug.kind;
    let mut current = failing.clone();
    let mut cut = current.trace.len() / 2;
    let mut checks = 0;

    while cut > 0 && checks < cfg.max_checks {
        checks += 1;
        let mut candidate = current.trace.clone();
        candidate.truncate(current.trace.len() - cut);

        let outcome = replay_with(
            entry,
            ReplayStrategy::prefix(candidate),
            &current.config,
            current.iteration,
        )?;
        let shorter = outcome.trace.len() < current.trace.len();
        match ReproArtifact::from_outcome(&current.config, &outcome) {
            Some(next) if shorter && next.bug.kind == kind => {
                debug!(from = current.trace.len(), to = next.trace.len(), "trace shrunk");
                current = next;
                cut = cut.min(current.trace.len() / 2);
            }
            _ => cut /= 2,
        }
    }
    Ok(current)
}
