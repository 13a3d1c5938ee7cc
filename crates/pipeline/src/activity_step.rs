// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The activity processing step's `start` handling (spec §4.2): resolving
//! `activityType`, decoding arguments, and spawning the registered
//! function. `cancel` handling is a one-line signal and lives alongside
//! this in [`crate::group`], which owns the running handle.

use crate::heartbeat::{Heartbeat, HeartbeatSender};
use crate::registry::{ActivityContext, ActivityInput, ActivityOutcome, ActivityRegistry};
use base64::Engine as _;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use worker_bridge::DataConverter;
use worker_core::{ActivityStart, Failure, TaskToken};

/// A spawned, in-flight activity invocation, owned by its group task.
pub struct ActivityHandle {
    pub cancel: CancellationToken,
    pub join: JoinHandle<ActivityOutcome>,
}

pub struct ActivityStepDeps<D: DataConverter> {
    pub registry: Arc<ActivityRegistry>,
    pub converter: D,
    pub heartbeat_tx: HeartbeatSender,
}

pub enum StartOutcome {
    /// No handle was created; the caller should emit this completion and
    /// close the group immediately.
    Synthesized(Vec<u8>),
    Spawned(ActivityHandle),
}

/// `variant == start` (spec §4.2): resolve, decode, spawn — or synthesize
/// an immediate failure without ever creating a handle.
pub async fn process_start<D: DataConverter>(
    start: &ActivityStart,
    task_token: &TaskToken,
    deps: &ActivityStepDeps<D>,
) -> StartOutcome {
    let Some(func) = deps.registry.resolve(&start.activity_type) else {
        let failure = Failure::new(format!("Activity module not found: {}", start.activity_type.module_path));
        return StartOutcome::Synthesized(failed_completion(task_token, failure));
    };

    if let Err(err) = deps.converter.decode::<serde_json::Value>(&start.arguments).await {
        let failure = Failure::new(format!("failed to decode activity arguments: {err}"));
        return StartOutcome::Synthesized(failed_completion(task_token, failure));
    }

    let cancel = CancellationToken::new();
    let heartbeat_tx = deps.heartbeat_tx.clone();
    let token_for_heartbeat = task_token.clone();
    let context = ActivityContext {
        activity_id: start.activity_id.clone(),
        attempt: start.attempt,
        heartbeat_timeout_ms: start.heartbeat_timeout_ms,
        workflow_context: start.workflow_context.clone(),
        cancel: cancel.clone(),
        heartbeat: Arc::new(move |details| {
            let _ = heartbeat_tx.send(Heartbeat {
                task_token: token_for_heartbeat.clone(),
                details,
            });
        }),
    };
    let input = ActivityInput {
        arguments: start.arguments.clone(),
        context,
    };
    let join = tokio::spawn(async move { func.call(input).await });
    StartOutcome::Spawned(ActivityHandle { cancel, join })
}

/// `variant == cancel` with a live handle: signal the abort token. The
/// completion, if any, surfaces later through the in-progress run (spec
/// §4.2).
pub fn process_cancel(handle: &ActivityHandle) {
    handle.cancel.cancel();
}

pub fn completion_from_outcome(task_token: &TaskToken, outcome: ActivityOutcome) -> Vec<u8> {
    let body = match outcome {
        ActivityOutcome::Completed(bytes) => serde_json::json!({
            "taskToken": task_token.to_string(),
            "completed": { "result": base64::engine::general_purpose::STANDARD.encode(bytes) },
        }),
        ActivityOutcome::Failed(failure) => serde_json::json!({
            "taskToken": task_token.to_string(),
            "failed": { "failure": failure },
        }),
        ActivityOutcome::Cancelled => serde_json::json!({
            "taskToken": task_token.to_string(),
            "cancelled": {},
        }),
    };
    serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec())
}

fn failed_completion(task_token: &TaskToken, failure: Failure) -> Vec<u8> {
    let body = serde_json::json!({
        "taskToken": task_token.to_string(),
        "failed": { "failure": failure },
    });
    serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec())
}
