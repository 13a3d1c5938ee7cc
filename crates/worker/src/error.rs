// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy owned by `durable-worker` (spec §7): the façade's own
//! fatal conditions, plus `#[from]` conversions for every collaborator's
//! error type.

use std::time::Duration;
use thiserror::Error;
use worker_bridge::BridgeError;
use worker_pipeline::PipelineError;
use worker_sandbox::SandboxError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// `run()` called from a state other than `INITIALIZED`, or a
    /// `shutdown`/`suspend`/`resume` request made from a state that does
    /// not legally admit it (§4.1's transition table). Fatal.
    #[error("illegal state transition: {0}")]
    IllegalState(String),

    /// The drain watchdog's `shutdownGraceTimeMs` elapsed before the
    /// lifecycle reached `DRAINED`. Fatal: the worker transitions to
    /// `FAILED` (§4.1, §7).
    #[error("graceful shutdown period of {0:?} expired before drain completed")]
    GracefulShutdownPeriodExpired(Duration),
}

impl WorkerError {
    pub fn is_fatal(&self) -> bool {
        match self {
            WorkerError::Pipeline(e) => e.is_fatal(),
            WorkerError::Sandbox(_) => false,
            WorkerError::Bridge(e) => e.is_fatal(),
            WorkerError::IllegalState(_) | WorkerError::GracefulShutdownPeriodExpired(_) => true,
        }
    }
}
