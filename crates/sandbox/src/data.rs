// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-activation sandbox state (spec §4.3's determinism constraints):
//! the activation-supplied `now`, the seeded RNG, and the memory limiter.
//! Lives on the `wasmtime::Store` as its host data.

use crate::limits::SandboxLimits;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SandboxData {
    /// Wall-clock timestamp fixed for the duration of one `activate()`
    /// call; the sandbox's only source of time. Never re-read from
    /// `std::time::SystemTime::now()`.
    pub now_ms: i64,
    rng: StdRng,
    pub limits: SandboxLimits,
}

impl SandboxData {
    pub fn new(now_ms: i64, randomness_seed: u64, max_memory_bytes: usize) -> Self {
        Self {
            now_ms,
            rng: StdRng::seed_from_u64(randomness_seed),
            limits: SandboxLimits::new(max_memory_bytes),
        }
    }

    /// Re-seed ahead of the next `activate()` call, for `updateRandomSeed`
    /// jobs (spec §3) and for reusing one `SandboxData` across activations
    /// within the same live `WorkflowHandle`.
    pub fn reseed(&mut self, randomness_seed: u64) {
        self.rng = StdRng::seed_from_u64(randomness_seed);
    }

    pub fn set_now_ms(&mut self, now_ms: i64) {
        self.now_ms = now_ms;
    }

    /// The host side of `determinism::next_random`.
    pub fn next_random(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}
