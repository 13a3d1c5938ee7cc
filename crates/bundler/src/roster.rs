// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow module roster discovery (spec §4.4 step 3).

use crate::error::BundleError;
use std::path::Path;

/// Shallow-scan `workflows_dir` for `.wat`/`.wasm` files; the roster is the
/// discovered module names union the configured interceptor module list.
/// Sorted for deterministic bundle output (§8).
pub fn discover_roster(workflows_dir: &Path, interceptor_modules: &[String]) -> Result<Vec<String>, BundleError> {
    let mut names: Vec<String> = Vec::new();

    if workflows_dir.is_dir() {
        let entries = std::fs::read_dir(workflows_dir).map_err(|source| BundleError::Io {
            path: workflows_dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| BundleError::Io {
                path: workflows_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            let is_module = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("wat") | Some("wasm")
            );
            if !is_module {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }

    for interceptor in interceptor_modules {
        if !names.contains(interceptor) {
            names.push(interceptor.clone());
        }
    }

    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_is_sorted_union_of_files_and_interceptors() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("zeta.wat"), b"").expect("write");
        std::fs::write(dir.path().join("alpha.wasm"), b"").expect("write");
        std::fs::write(dir.path().join("ignored.txt"), b"").expect("write");

        let roster = discover_roster(dir.path(), &["interceptor-one".to_string()]).expect("discover");
        assert_eq!(roster, vec!["alpha", "interceptor-one", "zeta"]);
    }

    #[test]
    fn missing_workflows_dir_yields_interceptors_only() {
        let roster = discover_roster(Path::new("/does/not/exist"), &["only".to_string()]).expect("discover");
        assert_eq!(roster, vec!["only"]);
    }
}
