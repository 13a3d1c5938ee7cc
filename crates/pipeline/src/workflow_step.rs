// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workflow processing step (spec §4.2): given `(handle, activation)`,
//! drives a sandbox to an encoded completion.

use crate::error::PipelineError;
use std::sync::Arc;
use worker_core::{Failure, WorkflowActivation, WorkflowJob};
use worker_sandbox::{ActivityDefaults, CreateContext, DependencyBinding, PooledSandbox, SandboxPool, WorkflowInfo};

/// One workflow run's live sandbox handle, owned exclusively by its group
/// task. Dropping it releases the sandbox back to the pool (spec §4.3's
/// `dispose`).
pub struct WorkflowHandle {
    sandbox: PooledSandbox,
    ticks_per_timeout: u64,
}

/// Everything the step needs besides the evolving `(handle, activation)`
/// pair; constructed once by [`crate::pipeline::Pipeline`] and shared by
/// every workflow group task.
pub struct WorkflowStepDeps {
    pub sandbox_pool: Arc<SandboxPool>,
    pub activity_defaults: ActivityDefaults,
    pub interceptor_modules: Vec<String>,
    pub timeout_ms: u64,
    pub max_memory_bytes: usize,
    pub ticks_per_timeout: u64,
    pub task_queue: String,
    pub namespace: String,
    /// Worker option `dependencies` (spec §6), bound into every freshly
    /// created sandbox. Empty unless the caller registered any.
    pub dependencies: Vec<DependencyBinding>,
}

pub struct WorkflowStepOutput {
    /// Always `Some` unless the activation carried only a `notifyHasChange`
    /// stub with nothing else to report (§9's no-op resolution).
    pub completion: Option<Vec<u8>>,
    pub close: bool,
}

/// `step(handle, activation) -> (handle, output)`, per §4.2's exact
/// algorithm. Returns `Err` only for fatal invariant violations (§7); the
/// caller is responsible for surfacing those to the lifecycle controller.
pub async fn process(
    handle: Option<WorkflowHandle>,
    activation: &WorkflowActivation,
    deps: &WorkflowStepDeps,
) -> Result<(Option<WorkflowHandle>, WorkflowStepOutput), PipelineError> {
    let (rest, close) = activation.partition_jobs();

    if rest.is_empty() && !close {
        return Err(PipelineError::Core(worker_core::CoreError::EmptyActivation {
            run_id: activation.run_id.clone(),
        }));
    }

    let mut handle = handle;

    if handle.is_none() {
        let start = rest.iter().find_map(|job| match job {
            WorkflowJob::StartWorkflow {
                workflow_id,
                workflow_type,
                randomness_seed,
                ..
            } if !workflow_id.is_empty() && !workflow_type.is_empty() => {
                Some((workflow_id.clone(), workflow_type.clone(), *randomness_seed))
            }
            _ => None,
        });

        let (workflow_id, workflow_type, randomness_seed) = start.ok_or_else(|| {
            PipelineError::IllegalState(format!(
                "run {} has no handle and no valid startWorkflow job",
                activation.run_id
            ))
        })?;

        let ctx = CreateContext {
            info: WorkflowInfo {
                workflow_id,
                workflow_type,
                run_id: activation.run_id.to_string(),
                task_queue: deps.task_queue.clone(),
                namespace: deps.namespace.clone(),
            },
            activity_defaults: deps.activity_defaults.clone(),
            interceptor_modules: deps.interceptor_modules.clone(),
            randomness_seed,
            timeout_ms: deps.timeout_ms,
            max_memory_bytes: deps.max_memory_bytes,
            dependencies: deps.dependencies.clone(),
        };

        let sandbox = deps.sandbox_pool.acquire(ctx)?;
        handle = Some(WorkflowHandle {
            sandbox,
            ticks_per_timeout: deps.ticks_per_timeout,
        });
    }

    let live = handle.as_mut().unwrap_or_else(|| unreachable!("handle populated above"));
    let activate_result = live
        .sandbox
        .sandbox_mut()
        .activate(activation, live.ticks_per_timeout)
        .await;

    match activate_result {
        Ok(completion) => {
            if close {
                handle = None;
            }
            Ok((handle, WorkflowStepOutput { completion: Some(completion), close }))
        }
        Err(err) => {
            let failure = Failure::new(err.to_string());
            let body = serde_json::json!({
                "runId": activation.run_id.to_string(),
                "failed": { "failure": failure },
            });
            let completion = serde_json::to_vec(&body).map_err(|e| PipelineError::IllegalState(e.to_string()))?;
            Ok((None, WorkflowStepOutput { completion: Some(completion), close: true }))
        }
    }
}
