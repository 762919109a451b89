//! Reproducible artifacts for failing iterations.
//!
//! An artifact bundles everything needed to re-run a buggy iteration
//! bit-for-bit: the configuration, the recorded trace and a stable hash of
//! that trace. Artifacts are pretty-printed JSON so they can be attached to
//! bug reports and diffed. The schema is versioned; loading an artifact
//! written by a different schema version fails instead of guessing.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, HandlerResult};
use crate::event::Event;
use crate::runtime::kernel::TestContext;
use crate::scheduler::outcome::{Bug, BugKind, IterationOutcome, Verdict};
use crate::scheduler::trace::{trace_hash, Trace};
use crate::strategy::replay::ReplayStrategy;

use super::config::TestConfig;
use super::replay_with;

pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Self-contained reproduction of one buggy iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproArtifact {
    pub schema_version: u32,

    /// Version stamp for diagnostics (not determinism).
    pub crate_version: String,

    /// Determinism keys.
    pub config: TestConfig,
    pub iteration: u64,

    /// Failure data.
    pub bug: Bug,
    pub trace: Trace,
    /// [`trace_hash`] of `trace`.
    pub expected_trace_hash: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("artifact JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("artifact schema version {found} is not supported (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("trace hash mismatch: expected {expected:#018x}, found {found:#018x}")]
    HashMismatch { expected: u64, found: u64 },
    #[error("replay did not reproduce {expected} (verdict {found:?})")]
    NotReproduced { expected: BugKind, found: Verdict },
}

impl ReproArtifact {
    /// Capture a buggy outcome. `None` if the outcome has no bug.
    pub fn from_outcome(config: &TestConfig, outcome: &IterationOutcome) -> Option<Self> {
        let bug = outcome.bug.clone()?;
        Some(Self {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            config: config.clone(),
            iteration: outcome.iteration,
            bug,
            trace: outcome.trace.clone(),
            expected_trace_hash: trace_hash(&outcome.trace),
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ArtifactError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let artifact: Self = serde_json::from_slice(bytes)?;
        if artifact.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(ArtifactError::SchemaVersion {
                found: artifact.schema_version,
                expected: ARTIFACT_SCHEMA_VERSION,
            });
        }
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        Self::from_json(&fs::read(path)?)
    }
}

/// Replay an artifact strictly and check that it reproduces the same bug
/// along the same trace.
pub fn replay_artifact<E, F>(
    entry: &F,
    artifact: &ReproArtifact,
) -> Result<IterationOutcome, ArtifactError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    let recorded = trace_hash(&artifact.trace);
    if recorded != artifact.expected_trace_hash {
        return Err(ArtifactError::HashMismatch {
            expected: artifact.expected_trace_hash,
            found: recorded,
        });
    }

    let strategy = ReplayStrategy::new(artifact.trace.clone());
    let outcome = replay_with(entry, strategy, &artifact.config, artifact.iteration)?;
    let found = trace_hash(&outcome.trace);
    if found != artifact.expected_trace_hash {
        return Err(ArtifactError::HashMismatch {
            expected: artifact.expected_trace_hash,
            found,
        });
    }
    if outcome.bug_kind() != Some(artifact.bug.kind) {
        return Err(ArtifactError::NotReproduced {
            expected: artifact.bug.kind,
            found: outcome.verdict,
        });
    }
    Ok(outcome)
}

/// Load an artifact from disk and replay it.
pub fn replay_artifact_path<E, F>(entry: &F, path: &Path) -> Result<IterationOutcome, ArtifactError>
where
    E: Event,
    F: Fn(&mut TestContext<'_, E>) -> HandlerResult,
{
    let artifact = ReproArtifact::load(path)?;
    replay_artifact(entry, &artifact)
}
