// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entrypoint module synthesis (spec §4.4 step 4).
//!
//! The original entrypoint sets up a lazy-require barrier over the roster,
//! overrides determinism-sensitive globals, and exports the worker
//! interface. The Wasm analogue: a generated module that declares the
//! determinism imports every workflow module must also restrict itself to
//! (so a later `Linker` instantiation fails fast on anything else
//! time/randomness-shaped) and records the roster as a manifest custom
//! section.

use crate::stub::escape_wat_string;
use std::fmt::Write as _;

/// The custom section name carrying the bundle roster manifest.
pub const BUNDLE_ROSTER_SECTION: &str = "bundle-roster";

/// Synthesize the entrypoint module's WAT source.
pub fn synth_entrypoint(roster: &[String]) -> String {
    let roster_json = serde_json::to_string(roster).unwrap_or_else(|_| "[]".to_string());

    let mut wat = String::new();
    let _ = writeln!(wat, "(module");
    let _ = writeln!(wat, "  (import \"determinism\" \"now\" (func $now (result i64)))");
    let _ = writeln!(
        wat,
        "  (import \"determinism\" \"next_random\" (func $next_random (result f64)))"
    );
    let _ = writeln!(wat, "  (memory (export \"memory\") 1)");
    let _ = writeln!(wat, "  (func (export \"_entry\") (result i32) (i32.const 0))");
    let _ = writeln!(
        wat,
        "  (@custom \"{BUNDLE_ROSTER_SECTION}\" (after func) \"{}\")",
        escape_wat_string(&roster_json)
    );
    wat.push_str(")\n");
    wat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entrypoint_declares_determinism_imports_and_roster() {
        let wat = synth_entrypoint(&["wf-a".to_string(), "wf-b".to_string()]);
        assert!(wat.contains("\"determinism\" \"now\""));
        assert!(wat.contains("\"determinism\" \"next_random\""));
        assert!(wat.contains("wf-a"));
        assert!(wat.contains("wf-b"));
    }

    #[test]
    fn entrypoint_synthesis_is_pure() {
        let roster = vec!["a".to_string()];
        assert_eq!(synth_entrypoint(&roster), synth_entrypoint(&roster));
    }
}
