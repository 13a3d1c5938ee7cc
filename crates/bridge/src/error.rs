// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use worker_core::RunId;
use thiserror::Error;

/// Errors from the [`crate::Bridge`] trait (spec §7).
#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    /// Signalled by the bridge once it is draining; caught inside the poll
    /// loop and converted to stream completion. Not fatal.
    #[error("bridge is shutting down")]
    Shutdown,

    /// Per-run failure from completion submission. Converted into a
    /// synthetic `removeFromCache` activation for that run. Not fatal.
    #[error("workflow completion rejected for run {run_id}: {message}")]
    Workflow { run_id: RunId, message: String },

    /// Any other bridge failure. Fatal per §7's propagation policy.
    #[error("bridge call failed: {0}")]
    Transport(String),
}

impl BridgeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }
}

/// Errors from [`crate::DataConverter`] encode/decode operations.
#[derive(Debug, Error, Clone)]
pub enum ConverterError {
    #[error("failed to encode payload: {0}")]
    Encode(String),
    #[error("failed to decode payload: {0}")]
    Decode(String),
}
