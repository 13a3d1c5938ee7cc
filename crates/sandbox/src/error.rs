// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from the sandbox and its pool (spec §4.3, §7).
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A job attempted a non-deterministic primitive disallowed by the
    /// sandbox's fixed host-import list. Surfaced as a workflow task
    /// failure completion, not fatal to the worker.
    #[error("determinism violation: {0}")]
    DeterminismViolation(String),

    /// The activation ran past `isolateExecutionTimeoutMs`.
    #[error("activation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to compile bundle module {module}: {source}")]
    Compile {
        module: String,
        #[source]
        source: wasmtime::Error,
    },

    #[error("failed to instantiate sandbox: {0}")]
    Instantiate(String),

    #[error("sandbox trapped: {0}")]
    Trap(String),

    #[error("guest memory access out of bounds")]
    MemoryOutOfBounds,

    #[error("failed to (de)serialize sandbox payload: {0}")]
    Codec(String),

    #[error("sandbox pool exhausted (all {0} slots busy)")]
    PoolExhausted(usize),
}

impl SandboxError {
    /// Whether this error invalidates a single workflow run (→ evict) as
    /// opposed to being fatal to the whole worker (§7's propagation
    /// policy: determinism violations and timeouts are run-scoped).
    pub fn is_run_scoped(&self) -> bool {
        matches!(
            self,
            SandboxError::DeterminismViolation(_) | SandboxError::Timeout(_) | SandboxError::Trap(_)
        )
    }
}
