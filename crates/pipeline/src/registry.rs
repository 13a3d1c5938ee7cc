// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The activity function registry (C5, spec §4.5). Resolving
//! `activityType = [modulePath, fnName]` to executable Rust code has no
//! counterpart in spec.md (the business logic of activities is explicitly
//! out of scope) but the runner needs *some* resolution mechanism to exist
//! at all; this registry is the minimal, natural Rust shape of that seam —
//! a trait object per registered function, not a business-logic engine.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use worker_core::{ActivityType, ActivityWorkflowContext, Failure};

/// Everything a registered activity function needs besides its arguments.
pub struct ActivityContext {
    pub activity_id: String,
    pub attempt: u32,
    pub heartbeat_timeout_ms: Option<u64>,
    pub workflow_context: ActivityWorkflowContext,
    /// Cancelled when a `cancel` task variant arrives for this token; the
    /// function is expected to observe it (spec §4.5, §5's cancellation
    /// model is documented, not enforced, by the runner).
    pub cancel: CancellationToken,
    /// The function's heartbeat callback: enqueue `{ taskToken, details }`
    /// onto the heartbeat channel (C8).
    pub heartbeat: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
}

pub struct ActivityInput {
    pub arguments: Vec<u8>,
    pub context: ActivityContext,
}

/// Resolution of a `run(input)` call, per §4.5.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    Completed(Vec<u8>),
    Failed(Failure),
    Cancelled,
}

#[async_trait]
pub trait ActivityFn: Send + Sync + 'static {
    async fn call(&self, input: ActivityInput) -> ActivityOutcome;
}

pub type RegisteredActivity = Arc<dyn ActivityFn>;

/// `HashMap<(modulePath, fnName), ActivityFn>`, supplied at worker
/// construction (the façade, C9) and shared read-only by every activity
/// group task.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    functions: HashMap<(String, String), RegisteredActivity>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module_path: impl Into<String>, fn_name: impl Into<String>, handler: RegisteredActivity) {
        self.functions.insert((module_path.into(), fn_name.into()), handler);
    }

    pub fn resolve(&self, activity_type: &ActivityType) -> Option<RegisteredActivity> {
        self.functions
            .get(&(activity_type.module_path.clone(), activity_type.fn_name.clone()))
            .cloned()
    }
}
