//! Program state hashing for DFS state caching.
//!
//! Hashes are only compared within one process. The hasher uses fixed seeds
//! so two identical program states in the same run always collide.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

const SEEDS: [u64; 4] = [
    0x243F_6A88_85A3_08D3,
    0x1319_8A2E_0370_7344,
    0xA409_3822_299F_31D0,
    0x082E_FA98_EC4E_6C89,
];

/// Accumulates the logical state of operations, monitors and resources.
///
/// User machines feed their own fields through [`crate::Machine::snapshot`].
/// Formatting through `write!` hashes the rendered text without allocating.
pub struct StateHasher {
    inner: ahash::AHasher,
}

impl StateHasher {
    pub(crate) fn new() -> Self {
        let state = ahash::RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]);
        Self {
            inner: state.build_hasher(),
        }
    }

    pub fn write<T: Hash + ?Sized>(&mut self, value: &T) {
        value.hash(&mut self.inner);
    }

    #[inline(always)]
    pub fn write_u64(&mut self, value: u64) {
        self.inner.write_u64(value);
    }

    pub fn write_str(&mut self, value: &str) {
        self.inner.write(value.as_bytes());
        self.inner.write_u8(0xff);
    }

    pub(crate) fn finish(self) -> u64 {
        self.inner.finish()
    }
}

impl fmt::Write for StateHasher {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write(s.as_bytes());
        Ok(())
    }
}
