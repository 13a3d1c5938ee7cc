// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-sandbox memory cap (`maxIsolateMemoryMB`, spec §4.3) via
//! `wasmtime::ResourceLimiter`.

use wasmtime::ResourceLimiter;

/// Caps linear memory growth at a configured byte ceiling. One instance
/// per [`crate::Sandbox`]; never shared across sandboxes since the cap is
/// per-slot, not pool-wide.
pub struct SandboxLimits {
    max_memory_bytes: usize,
}

impl SandboxLimits {
    pub fn new(max_memory_bytes: usize) -> Self {
        Self { max_memory_bytes }
    }
}

impl ResourceLimiter for SandboxLimits {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        Ok(desired <= self.max_memory_bytes)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        Ok(maximum.map_or(true, |max| desired <= max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_growth_within_cap() {
        let mut limits = SandboxLimits::new(1024);
        assert!(limits.memory_growing(0, 1024, None).expect("limiter call"));
    }

    #[test]
    fn rejects_growth_past_cap() {
        let mut limits = SandboxLimits::new(1024);
        assert!(!limits.memory_growing(0, 1025, None).expect("limiter call"));
    }
}
