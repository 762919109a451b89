//! End-to-end scenarios driven through the public exploration API.
//!
//! Run with: `cargo test --test scenarios`
//!
//! Seeds can be widened from the environment:
//! `SCENARIO_SEED_START=1000 SCENARIO_SEED_COUNT=500 cargo test --test scenarios`

mod artifacts;
mod deadlock;
mod groups;
mod halt;
mod ids;
mod schema;
mod tasks;

use std::sync::Once;

pub(crate) fn seed_value_from_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Route `tracing` output through the test harness. `RUST_LOG` selects the
/// level; nothing is printed by default.
pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
