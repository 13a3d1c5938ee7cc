// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity stub synthesis (spec §4.4 step 2).
//!
//! The original bundler generates a `.js` file per activity module whose
//! exports forward to `scheduleActivity(JSON.stringify([S, fn]), args)`.
//! `wasmtime::Module::new` accepts WAT text directly, so the Rust/Wasm
//! analogue is to synthesize a `.wat` module with one export per function
//! that calls an imported `schedule_activity` host function — no separate
//! templating crate needed, matching the original's "generate a file, let
//! the bundler pick it up" shape.

use std::fmt::Write as _;

/// One activity module specifier and the function names it exports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActivityStubSpec {
    pub module_specifier: String,
    pub fn_names: Vec<String>,
}

impl ActivityStubSpec {
    pub fn new(module_specifier: impl Into<String>, fn_names: Vec<String>) -> Self {
        Self {
            module_specifier: module_specifier.into(),
            fn_names,
        }
    }
}

/// Synthesize the WAT source for one activity module's stub file.
///
/// Each exported function calls the imported `schedule_activity` with a
/// constant encoding `type = JSON.stringify([module, fn])` (the same
/// stringified pair as the original), attached as a custom section named
/// after the function — the Wasm analogue of the original's `.type`
/// property on each stub export.
pub fn synth_activity_stub_module(spec: &ActivityStubSpec) -> String {
    let mut wat = String::new();
    let _ = writeln!(wat, "(module");
    let _ = writeln!(
        wat,
        "  (import \"env\" \"schedule_activity\" (func $schedule_activity (param i32 i32 i32 i32) (result i32 i32)))"
    );
    let _ = writeln!(wat, "  (memory (export \"memory\") 1)");

    for fn_name in &spec.fn_names {
        let type_json = serde_json::to_string(&(spec.module_specifier.as_str(), fn_name.as_str()))
            .unwrap_or_else(|_| "[]".to_string());
        let escaped_name = escape_wat_string(fn_name);
        let _ = writeln!(
            wat,
            "  (func (export \"{escaped_name}\") (param $args_ptr i32) (param $args_len i32) (result i32 i32)\n    (call $schedule_activity (i32.const 0) (i32.const 0) (local.get $args_ptr) (local.get $args_len)))",
        );
        let _ = writeln!(
            wat,
            "  (@custom \"{escaped_name}.type\" (after func) \"{}\")",
            escape_wat_string(&type_json)
        );
    }

    wat.push_str(")\n");
    wat
}

/// Escape a string for embedding in a WAT string literal.
pub fn escape_wat_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out
}
