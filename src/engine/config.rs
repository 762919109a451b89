//! Exploration configuration.
//!
//! [`TestConfig`] is plain data: serializable (it is embedded in every
//! reproduction artifact), buildable in code through `with_*` setters, and
//! optionally overridden from the environment so CI can widen a search
//! without recompiling.

use serde::{Deserialize, Serialize};

/// Largest supported probabilistic switch bound (1 in 2^62 per step).
pub const MAX_SWITCH_BOUND: u32 = 62;

pub const ENV_SEED: &str = "ACTOR_SIM_SEED";
pub const ENV_ITERATIONS: &str = "ACTOR_SIM_ITERATIONS";
pub const ENV_MAX_STEPS: &str = "ACTOR_SIM_MAX_STEPS";

/// Which exploration strategy to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Uniform choice at every scheduling point.
    #[default]
    Random,
    /// Stay on the running operation; switch with probability 1/2^`switch_bound`.
    Probabilistic { switch_bound: u32 },
    /// Bounded priority switching.
    Prioritization { switch_points: u32 },
    /// Exhaustive depth-first search.
    Dfs { state_caching: bool },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub iterations: u64,
    /// Schedule decisions per iteration before the step bound applies.
    pub max_steps: u64,
    /// Base seed. Iteration `i` of a seeded strategy derives its RNG from
    /// `seed` and `i`.
    pub seed: u64,
    pub strategy: StrategyKind,
    /// Consecutive steps a monitor may stay hot before a liveness violation.
    pub liveness_temperature_threshold: u64,
    /// Report hitting `max_steps` as `DepthBoundExceeded` instead of success.
    pub report_depth_bound: bool,
    pub stop_on_first_bug: bool,
    /// Wall-clock limit for a whole exploration.
    pub timeout_ms: Option<u64>,
    /// Entries kept in the per-iteration execution log.
    pub log_capacity: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            max_steps: 10_000,
            seed: 0,
            strategy: StrategyKind::Random,
            liveness_temperature_threshold: 5_000,
            report_depth_bound: false,
            stop_on_first_bug: true,
            timeout_ms: None,
            log_capacity: 256,
        }
    }
}

/// Invalid configuration values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("iterations must be at least 1")]
    ZeroIterations,
    #[error("max_steps must be at least 1")]
    ZeroMaxSteps,
    #[error("log_capacity must be at least 1")]
    ZeroLogCapacity,
    #[error("liveness_temperature_threshold must be at least 1")]
    ZeroLivenessThreshold,
    #[error("probabilistic switch bound {bound} exceeds {MAX_SWITCH_BOUND}")]
    SwitchBoundTooLarge { bound: u32 },
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

impl TestConfig {
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_liveness_threshold(mut self, steps: u64) -> Self {
        self.liveness_temperature_threshold = steps;
        self
    }

    pub fn with_report_depth_bound(mut self, report: bool) -> Self {
        self.report_depth_bound = report;
        self
    }

    pub fn with_stop_on_first_bug(mut self, stop: bool) -> Self {
        self.stop_on_first_bug = stop;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::ZeroLogCapacity);
        }
        if self.liveness_temperature_threshold == 0 {
            return Err(ConfigError::ZeroLivenessThreshold);
        }
        if let StrategyKind::Probabilistic { switch_bound } = self.strategy {
            if switch_bound > MAX_SWITCH_BOUND {
                return Err(ConfigError::SwitchBoundTooLarge {
                    bound: switch_bound,
                });
            }
        }
        Ok(())
    }

    /// Apply `ACTOR_SIM_SEED`, `ACTOR_SIM_ITERATIONS` and
    /// `ACTOR_SIM_MAX_STEPS` when set.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let parse = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidEnv { var, value: raw }),
            }
        };
        if let Some(seed) = parse(ENV_SEED)? {
            self.seed = seed;
        }
        if let Some(iterations) = parse(ENV_ITERATIONS)? {
            self.iterations = iterations;
        }
        if let Some(max_steps) = parse(ENV_MAX_STEPS)? {
            self.max_steps = max_steps;
        }
        Ok(self)
    }
}
