// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bundle artifact produced by [`crate::Bundler::build`] (spec §4.4
//! step 5).

use crate::error::BundleError;
use serde::{Deserialize, Serialize};

/// A single self-contained code artifact: every roster module plus the
/// generated activity stubs and entrypoint, each stored as WAT source
/// bytes (`wasmtime::Module::new` accepts WAT text directly, so no
/// separate text/binary distinction is needed downstream).
///
/// Serialized with `bincode` for the snapshot-caching round-trip property
/// in §8 — a compact binary form suited to repeated disk reads at worker
/// startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleArtifact {
    pub modules: Vec<(String, Vec<u8>)>,
    pub entry: String,
}

impl BundleArtifact {
    pub fn to_bytes(&self) -> Result<Vec<u8>, BundleError> {
        bincode::serialize(self).map_err(|e| BundleError::Serialize(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BundleError> {
        bincode::deserialize(bytes).map_err(|e| BundleError::Deserialize(e.to_string()))
    }

    pub fn module(&self, name: &str) -> Option<&[u8]> {
        self.modules
            .iter()
            .find(|(module_name, _)| module_name == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    pub fn entry_module(&self) -> Option<&[u8]> {
        self.module(&self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_round_trips_through_bincode() {
        let artifact = BundleArtifact {
            modules: vec![("a".to_string(), b"(module)".to_vec())],
            entry: "a".to_string(),
        };
        let bytes = artifact.to_bytes().expect("serialize");
        let back = BundleArtifact::from_bytes(&bytes).expect("deserialize");
        assert_eq!(artifact, back);
    }

    #[test]
    fn entry_module_resolves_by_name() {
        let artifact = BundleArtifact {
            modules: vec![("entry".to_string(), b"(module)".to_vec())],
            entry: "entry".to_string(),
        };
        assert_eq!(artifact.entry_module(), Some(b"(module)".as_slice()));
    }
}
