//! Deterministic RNG for schedule exploration.
//!
//! Uses xorshift64* for speed and stable output across platforms.
//! This is not cryptographically secure and must never be used for secrets.

/// Deterministic RNG with a single 64-bit state.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG. A zero seed is remapped to a non-zero constant to
    /// avoid the xorshift lockup state.
    pub fn new(seed: u64) -> Self {
        let s = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: s }
    }

    /// RNG for one iteration of a seeded exploration.
    ///
    /// Iterations get unrelated streams even for adjacent seeds.
    pub fn for_iteration(seed: u64, iteration: u64) -> Self {
        Self::new(mix64(seed ^ mix64(iteration.wrapping_add(1))))
    }

    /// Next 64-bit value from xorshift64*.
    #[inline(always)]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate a value in `[0, bound)`. `bound` must be non-zero.
    #[inline(always)]
    pub fn gen_below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        self.next_u64() % bound
    }

    /// Generate an index into a slice of length `len`.
    #[inline(always)]
    pub fn gen_index(&mut self, len: usize) -> usize {
        self.gen_below(len as u64) as usize
    }

    /// Generate a boolean with probability `numerator / denominator`.
    #[inline(always)]
    pub fn gen_bool(&mut self, numerator: u64, denominator: u64) -> bool {
        debug_assert!(denominator > 0);
        debug_assert!(numerator <= denominator);
        (self.next_u64() % denominator) < numerator
    }
}

/// SplitMix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
