// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy owned by `worker-core` (spec §7).

use crate::ids::RunId;
use thiserror::Error;

/// Errors that originate in the data model itself — decode/invariant
/// violations that every downstream crate's error enum converts inward via
/// `#[from]`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An activation has no non-eviction jobs and no `removeFromCache`
    /// job; §4.2 step 2, §8's invariant property. Fatal.
    #[error("activation for run {run_id} has no jobs and is not an eviction")]
    EmptyActivation { run_id: RunId },

    /// Internal invariant violation: duplicate `start`, activation
    /// referencing a handle that should not exist, etc. Fatal per §7.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Payload failed to decode via the configured `DataConverter`. Not
    /// fatal: translated into a failed activity/workflow result.
    #[error("failed to decode payload: {0}")]
    Decode(String),
}

impl CoreError {
    /// Whether this error invalidates a single workflow run (→ evict) as
    /// opposed to being fatal to the whole worker, per §7's propagation
    /// policy table.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::EmptyActivation { .. } | CoreError::IllegalState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_activation_and_illegal_state_are_fatal() {
        assert!(CoreError::EmptyActivation { run_id: RunId::new("r1") }.is_fatal());
        assert!(CoreError::IllegalState("duplicate start".into()).is_fatal());
    }

    #[test]
    fn decode_errors_are_not_fatal() {
        assert!(!CoreError::Decode("bad json".into()).is_fatal());
    }
}
