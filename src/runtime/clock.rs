//! Logical clock for timers and task sleeps.
//!
//! Time only moves when the scheduler fires a timer or when every enabled
//! operation is exhausted and a sleeper is waiting. Ticks never run backwards.

/// Tick-based logical clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogicalClock {
    now: u64,
}

impl LogicalClock {
    /// Create a new clock at tick 0.
    pub fn new() -> Self {
        Self { now: 0 }
    }

    /// Current time in ticks.
    #[inline(always)]
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Advance to an absolute tick. Earlier ticks are ignored.
    #[inline(always)]
    pub fn advance_to(&mut self, t: u64) {
        self.now = self.now.max(t);
    }

    /// Absolute tick `dt` ticks from now, saturating on overflow.
    #[inline(always)]
    pub fn deadline(&self, dt: u64) -> u64 {
        self.now.saturating_add(dt)
    }
}
