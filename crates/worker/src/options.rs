// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `WorkerOptions` (spec §6): a plain struct, not a parsed config file —
//! option parsing and defaulting beyond this struct's own `new` constructor
//! is explicitly out of scope.

use nix::sys::signal::Signal;
use worker_sandbox::{ActivityDefaults, DependencyBinding};

/// One isolate pool slot's worth of memory, used as the floor for
/// `max_isolate_memory_mb`'s default.
const MIN_ISOLATE_MEMORY_MB: usize = 1024;

#[derive(Clone)]
pub struct WorkerOptions {
    /// Required; no default (spec §6). Set via [`WorkerOptions::new`].
    pub task_queue: String,
    pub namespace: String,
    pub activity_defaults: ActivityDefaults,
    pub max_concurrent_activity_task_executions: usize,
    pub max_concurrent_workflow_task_executions: usize,
    pub max_concurrent_activity_task_polls: usize,
    pub max_concurrent_workflow_task_polls: usize,
    pub non_sticky_to_sticky_poll_ratio: f32,
    pub sticky_queue_schedule_to_start_timeout_ms: u64,
    pub shutdown_grace_time_ms: u64,
    pub shutdown_signals: Vec<Signal>,
    pub isolate_execution_timeout_ms: u64,
    pub max_isolate_memory_mb: usize,
    pub isolate_pool_size: usize,
    /// Worker option `interceptors.workflowModules` (spec §6).
    pub interceptor_modules: Vec<String>,
    /// Worker option `dependencies` (spec §6): see DESIGN.md's Open
    /// Question resolution for why this stays a plain `Vec` rather than a
    /// named-map config type.
    pub dependencies: Vec<DependencyBinding>,
}

impl WorkerOptions {
    /// Every other field defaulted per spec §6's table; `task_queue` has no
    /// default there, so it is the one required constructor argument.
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            namespace: "default".to_string(),
            activity_defaults: ActivityDefaults::default(),
            max_concurrent_activity_task_executions: 100,
            max_concurrent_workflow_task_executions: 100,
            max_concurrent_activity_task_polls: 5,
            max_concurrent_workflow_task_polls: 5,
            non_sticky_to_sticky_poll_ratio: 0.2,
            sticky_queue_schedule_to_start_timeout_ms: 10_000,
            shutdown_grace_time_ms: 5_000,
            shutdown_signals: vec![Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT],
            isolate_execution_timeout_ms: 1_000,
            max_isolate_memory_mb: MIN_ISOLATE_MEMORY_MB,
            isolate_pool_size: 8,
            interceptor_modules: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}
