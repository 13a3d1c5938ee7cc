// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The offline bundler itself (spec §4.4): wires virtual-fs overlay, stub
//! synthesis, roster discovery, entrypoint synthesis, and the final
//! validation pass together into one [`BundleArtifact`].

use crate::artifact::BundleArtifact;
use crate::entrypoint::synth_entrypoint;
use crate::error::BundleError;
use crate::roster::discover_roster;
use crate::stub::{synth_activity_stub_module, ActivityStubSpec};
use crate::virtual_fs::VirtualFs;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The name the synthesized entrypoint module is stored under in the
/// artifact's module list.
pub const ENTRYPOINT_MODULE_NAME: &str = "__entrypoint__";

/// Inputs to one bundle build: a workflows directory, a dependency root
/// (the node_modules-like resolve root — unmodeled beyond being the real
/// root the virtual filesystem reads through to, since dependency
/// resolution itself is out of scope), the activity module → exported
/// function map, and the ordered interceptor module list.
///
/// `activity_modules` is a `BTreeMap`, not a `HashMap`: bundle output must
/// be deterministic (§8), and iterating in sorted specifier order removes
/// hashmap ordering as a source of nondeterminism.
#[derive(Debug, Clone, Default)]
pub struct BundlerConfig {
    pub workflows_dir: PathBuf,
    pub dependency_root: PathBuf,
    pub activity_modules: BTreeMap<String, Vec<String>>,
    pub interceptor_modules: Vec<String>,
}

/// Builds [`BundleArtifact`]s. Offline, runs once at worker construction
/// (spec §4.4); holds only a `wasmtime::Engine` used for the final
/// validation pass, which is this crate's one synchronous, CPU-bound
/// operation (§5).
pub struct Bundler {
    engine: wasmtime::Engine,
}

impl Default for Bundler {
    fn default() -> Self {
        Self::new()
    }
}

impl Bundler {
    pub fn new() -> Self {
        Self {
            engine: wasmtime::Engine::default(),
        }
    }

    pub fn build(&self, config: &BundlerConfig) -> Result<BundleArtifact, BundleError> {
        let mut vfs = VirtualFs::new(&config.workflows_dir);

        for (module_specifier, fn_names) in &config.activity_modules {
            let spec = ActivityStubSpec::new(module_specifier.clone(), fn_names.clone());
            let wat = synth_activity_stub_module(&spec);
            vfs.insert_generated(format!("{module_specifier}.wat"), wat.into_bytes());
        }

        let roster = discover_roster(&config.workflows_dir, &config.interceptor_modules)?;
        let entry_wat = synth_entrypoint(&roster);

        let mut modules: Vec<(String, Vec<u8>)> = Vec::new();
        let mut diagnostics: Vec<String> = Vec::new();

        for name in &roster {
            match resolve_module_bytes(&vfs, name) {
                Ok(bytes) => modules.push((name.clone(), bytes)),
                Err(err) => diagnostics.push(err.to_string()),
            }
        }
        for specifier in config.activity_modules.keys() {
            match resolve_module_bytes(&vfs, specifier) {
                Ok(bytes) => modules.push((specifier.clone(), bytes)),
                Err(err) => diagnostics.push(err.to_string()),
            }
        }
        modules.push((ENTRYPOINT_MODULE_NAME.to_string(), entry_wat.into_bytes()));

        for (name, bytes) in &modules {
            if let Err(e) = wasmtime::Module::validate(&self.engine, bytes) {
                diagnostics.push(format!("{name}: {e}"));
            }
        }

        if !diagnostics.is_empty() {
            diagnostics.sort();
            return Err(BundleError::Validation { diagnostics });
        }

        Ok(BundleArtifact {
            modules,
            entry: ENTRYPOINT_MODULE_NAME.to_string(),
        })
    }
}

fn resolve_module_bytes(vfs: &VirtualFs, name: &str) -> Result<Vec<u8>, BundleError> {
    vfs.read(&format!("{name}.wat"))
        .or_else(|_| vfs.read(&format!("{name}.wasm")))
        .map_err(|_| BundleError::ModuleNotFound { path: name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_workflow(dir: &tempfile::TempDir, workflow_wat: &str) -> BundlerConfig {
        std::fs::write(dir.path().join("wf.wat"), workflow_wat).expect("write workflow");
        let mut activity_modules = BTreeMap::new();
        activity_modules.insert("activities/bad".to_string(), vec!["f".to_string()]);
        BundlerConfig {
            workflows_dir: dir.path().to_path_buf(),
            dependency_root: dir.path().to_path_buf(),
            activity_modules,
            interceptor_modules: Vec::new(),
        }
    }

    #[test]
    fn builds_artifact_with_workflow_stub_and_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_workflow(&dir, "(module)");
        let bundler = Bundler::new();

        let artifact = bundler.build(&config).expect("build");
        assert!(artifact.module("wf").is_some());
        assert!(artifact.module("activities/bad").is_some());
        assert_eq!(artifact.entry, ENTRYPOINT_MODULE_NAME);
        assert!(artifact.entry_module().is_some());
    }

    #[test]
    fn invalid_workflow_module_reports_diagnostics_not_just_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_workflow(&dir, "not valid wat at all");
        let bundler = Bundler::new();

        let err = bundler.build(&config).unwrap_err();
        match err {
            BundleError::Validation { diagnostics } => {
                assert!(!diagnostics.is_empty());
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn bundling_twice_with_identical_inputs_is_byte_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_with_workflow(&dir, "(module)");
        let bundler = Bundler::new();

        let first = bundler.build(&config).expect("first build").to_bytes().expect("encode");
        let second = bundler.build(&config).expect("second build").to_bytes().expect("encode");
        assert_eq!(first, second);
    }
}
