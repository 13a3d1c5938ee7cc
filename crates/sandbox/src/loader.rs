// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compiles a [`worker_bundler::BundleArtifact`]'s modules against a
//! sandbox engine, bridging C4's output into C2/C3's input.

use crate::error::SandboxError;
use std::collections::HashMap;
use std::sync::Arc;
use worker_bundler::BundleArtifact;

/// Compile every module in `artifact` once, keyed by name, so the pool can
/// hand out cheap `Arc<Module>` clones per sandbox rather than
/// recompiling per acquisition.
pub fn compile_modules(
    engine: &wasmtime::Engine,
    artifact: &BundleArtifact,
) -> Result<HashMap<String, Arc<wasmtime::Module>>, SandboxError> {
    let mut compiled = HashMap::with_capacity(artifact.modules.len());
    for (name, bytes) in &artifact.modules {
        let module = wasmtime::Module::new(engine, bytes).map_err(|source| SandboxError::Compile {
            module: name.clone(),
            source,
        })?;
        compiled.insert(name.clone(), Arc::new(module));
    }
    Ok(compiled)
}

/// Compile just the artifact's entry module, the one every sandbox slot in
/// a pool is seeded from.
pub fn compile_entry_module(
    engine: &wasmtime::Engine,
    artifact: &BundleArtifact,
) -> Result<Arc<wasmtime::Module>, SandboxError> {
    let bytes = artifact
        .entry_module()
        .ok_or_else(|| SandboxError::Instantiate(format!("entry module {} missing from artifact", artifact.entry)))?;
    let module = wasmtime::Module::new(engine, bytes).map_err(|source| SandboxError::Compile {
        module: artifact.entry.clone(),
        source,
    })?;
    Ok(Arc::new(module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_every_module_in_the_artifact() {
        let engine = wasmtime::Engine::default();
        let artifact = BundleArtifact {
            modules: vec![
                ("a".to_string(), b"(module)".to_vec()),
                ("entry".to_string(), b"(module)".to_vec()),
            ],
            entry: "entry".to_string(),
        };
        let compiled = compile_modules(&engine, &artifact).expect("compile");
        assert_eq!(compiled.len(), 2);
        assert!(compile_entry_module(&engine, &artifact).is_ok());
    }

    #[test]
    fn missing_entry_module_is_reported() {
        let engine = wasmtime::Engine::default();
        let artifact = BundleArtifact {
            modules: vec![("a".to_string(), b"(module)".to_vec())],
            entry: "missing".to_string(),
        };
        assert!(compile_entry_module(&engine, &artifact).is_err());
    }
}
