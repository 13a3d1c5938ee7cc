// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bundler's in-memory overlay filesystem (spec §4.4 step 1).

use crate::error::BundleError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An in-memory filesystem overlaid on the real workflows directory.
/// Generated entries (activity stubs, the entrypoint) are inserted first
/// and always shadow a same-named real file, per §4.4 step 1.
///
/// A `BTreeMap` backs the overlay, not a `HashMap`: bundle output must be
/// byte-identical across runs with identical inputs (§8), and iterating a
/// `BTreeMap` in key order removes hashmap iteration order as a source of
/// nondeterminism.
pub struct VirtualFs {
    real_root: PathBuf,
    overlay: BTreeMap<String, Vec<u8>>,
}

impl VirtualFs {
    pub fn new(real_root: impl Into<PathBuf>) -> Self {
        Self {
            real_root: real_root.into(),
            overlay: BTreeMap::new(),
        }
    }

    /// Insert generated content, shadowing any real file at the same path.
    pub fn insert_generated(&mut self, path: impl Into<String>, content: Vec<u8>) {
        self.overlay.insert(path.into(), content);
    }

    /// Read a path, preferring the overlay and reading through to the real
    /// filesystem otherwise.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, BundleError> {
        if let Some(content) = self.overlay.get(path) {
            return Ok(content.clone());
        }
        let full_path = self.real_root.join(path);
        std::fs::read(&full_path).map_err(|source| BundleError::Io {
            path: full_path.display().to_string(),
            source,
        })
    }

    /// Generated paths in sorted order, for deterministic iteration when
    /// building the roster and the final artifact.
    pub fn generated_paths(&self) -> impl Iterator<Item = &str> {
        self.overlay.keys().map(String::as_str)
    }

    pub fn real_root(&self) -> &Path {
        &self.real_root
    }
}
