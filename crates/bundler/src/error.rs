// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors from building a [`crate::BundleArtifact`] (spec §4.4's error
/// policy: a failed validation pass aborts construction with every
/// module's diagnostic, not just the first).
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("module {path} not found in workflows directory or virtual overlay")]
    ModuleNotFound { path: String },

    #[error("bundle validation failed for {} module(s):\n{}", .diagnostics.len(), .diagnostics.join("\n"))]
    Validation { diagnostics: Vec<String> },

    #[error("failed to serialize bundle artifact: {0}")]
    Serialize(String),

    #[error("failed to deserialize bundle artifact: {0}")]
    Deserialize(String),
}
