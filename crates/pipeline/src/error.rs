// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy owned by `worker-pipeline` (spec §7), converting its
//! collaborators' errors inward.

use thiserror::Error;
use worker_bridge::{BridgeError, ConverterError};
use worker_core::CoreError;
use worker_sandbox::SandboxError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Converter(#[from] ConverterError),

    /// Internal invariant violation not already covered by `CoreError`:
    /// duplicate `start` for a token that already has a handle, a
    /// `StartWorkflow` job missing required fields, etc. Fatal.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl PipelineError {
    /// Whether this error is fatal to the whole worker (transitions it to
    /// `FAILED`) as opposed to invalidating only the run/task it was
    /// raised for, per §7's propagation policy table.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Core(e) => e.is_fatal(),
            PipelineError::Bridge(e) => e.is_fatal(),
            PipelineError::IllegalState(_) => true,
            PipelineError::Sandbox(_) => false,
            PipelineError::Converter(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_state_is_fatal() {
        assert!(PipelineError::IllegalState("duplicate start".into()).is_fatal());
    }

    #[test]
    fn decode_errors_are_not_fatal() {
        assert!(!PipelineError::Converter(ConverterError::Decode("bad".into())).is_fatal());
    }

    #[test]
    fn shutdown_bridge_error_is_not_fatal() {
        assert!(!PipelineError::Bridge(BridgeError::Shutdown).is_fatal());
    }
}
