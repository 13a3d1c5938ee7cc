// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-group tasks (spec §4.2's "group task", see `SPEC_FULL.md`'s
//! glossary entry): one task per `runId` or `base64(taskToken)`, each
//! owning an `Option<Handle>` accumulator and processing its channel
//! strictly serially.

use crate::activity_step::{self, ActivityHandle, ActivityStepDeps, StartOutcome};
use crate::error::PipelineError;
use crate::registry::ActivityOutcome;
use crate::workflow_step::{self, WorkflowHandle, WorkflowStepDeps};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use worker_bridge::{Bridge, BridgeError, DataConverter};
use worker_core::{ActivityTask, ActivityTaskVariant, InFlightGauges, RunId, TaskToken, WorkflowActivation};

pub struct WorkflowGroupContext<B: Bridge> {
    pub bridge: Arc<B>,
    pub step_deps: Arc<WorkflowStepDeps>,
    pub semaphore: Arc<Semaphore>,
    pub gauges: Arc<InFlightGauges>,
    pub fatal_tx: mpsc::UnboundedSender<PipelineError>,
    pub reinject_tx: mpsc::UnboundedSender<WorkflowActivation>,
}

/// One run's lifetime: receives activations strictly serially until a
/// `close` output is produced, then the task ends and its `DashMap` entry
/// is reaped by [`crate::pipeline::Pipeline`].
pub async fn run_workflow_group<B: Bridge>(run_id: RunId, mut rx: mpsc::Receiver<WorkflowActivation>, ctx: WorkflowGroupContext<B>) {
    ctx.gauges.incr_running_workflows();
    let mut handle: Option<WorkflowHandle> = None;

    while let Some(activation) = rx.recv().await {
        ctx.gauges.incr_activations();
        let _permit = ctx.semaphore.clone().acquire_owned().await;

        let (next_handle, closed) = match workflow_step::process(handle.take(), &activation, &ctx.step_deps).await {
            Ok((next_handle, output)) => {
                if let Some(completion) = output.completion {
                    route_workflow_completion(&ctx, run_id.clone(), completion).await;
                }
                (next_handle, output.close)
            }
            Err(err) => {
                if err.is_fatal() {
                    let _ = ctx.fatal_tx.send(err);
                }
                (None, true)
            }
        };

        ctx.gauges.decr_activations();
        handle = next_handle;
        if closed {
            break;
        }
    }

    ctx.gauges.decr_running_workflows();
}

async fn route_workflow_completion<B: Bridge>(ctx: &WorkflowGroupContext<B>, run_id: RunId, completion: Vec<u8>) {
    match ctx.bridge.complete_workflow_activation(Bytes::from(completion)).await {
        Ok(()) => {}
        Err(BridgeError::Workflow { run_id, message }) => {
            tracing::warn!(%run_id, %message, "workflow completion rejected, re-injecting eviction");
            let _ = ctx.reinject_tx.send(WorkflowActivation::synthetic_eviction(run_id, message));
        }
        Err(err) => {
            let fatal = err.is_fatal();
            tracing::error!(%run_id, error = %err, fatal, "workflow completion submission failed");
            if fatal {
                let _ = ctx.fatal_tx.send(PipelineError::Bridge(err));
            }
        }
    }
}

pub struct ActivityGroupContext<B: Bridge, D: DataConverter> {
    pub bridge: Arc<B>,
    pub converter: D,
    pub registry: Arc<crate::registry::ActivityRegistry>,
    pub heartbeat_tx: crate::heartbeat::HeartbeatSender,
    pub semaphore: Arc<Semaphore>,
    pub gauges: Arc<InFlightGauges>,
}

/// One activity token's lifetime: at most one `start` followed by at most
/// one `cancel`, per §5's ordering guarantee. A `tokio::select!` lets a
/// `cancel` arriving while a `start` is still running reach the handle
/// without waiting for completion. `task_token` is the `DashMap` key this
/// group was spawned under (spec §4.2's grouping identity), passed in by
/// the router rather than re-derived from a task.
pub async fn run_activity_group<B: Bridge, D: DataConverter>(
    task_token: TaskToken,
    mut rx: mpsc::Receiver<ActivityTask>,
    ctx: ActivityGroupContext<B, D>,
) {
    let mut handle: Option<ActivityHandle> = None;

    loop {
        tokio::select! {
            maybe_task = rx.recv() => {
                let Some(task) = maybe_task else { break };
                match &task.variant {
                    ActivityTaskVariant::Start(start) => {
                        if handle.is_some() {
                            tracing::error!(task_token = %task.task_token, "duplicate start for in-flight activity token");
                            continue;
                        }
                        let _permit = ctx.semaphore.clone().acquire_owned().await;
                        let step_deps = ActivityStepDeps {
                            registry: ctx.registry.clone(),
                            converter: ctx.converter.clone(),
                            heartbeat_tx: ctx.heartbeat_tx.clone(),
                        };
                        match activity_step::process_start(start, &task.task_token, &step_deps).await {
                            StartOutcome::Synthesized(completion) => {
                                let _ = ctx.bridge.complete_activity_task(Bytes::from(completion)).await;
                                break;
                            }
                            StartOutcome::Spawned(new_handle) => {
                                ctx.gauges.incr_activities();
                                handle = Some(new_handle);
                            }
                        }
                    }
                    ActivityTaskVariant::Cancel { .. } => {
                        match &handle {
                            None => tracing::warn!(task_token = %task.task_token, found = false, "cancel for unknown activity token"),
                            Some(running) => activity_step::process_cancel(running),
                        }
                    }
                }
            }
            join_result = await_running(&mut handle), if handle.is_some() => {
                let outcome = match join_result {
                    Ok(outcome) => outcome,
                    Err(join_err) => ActivityOutcome::Failed(worker_core::Failure::new(join_err.to_string())),
                };
                let completion = activity_step::completion_from_outcome(&task_token, outcome);
                let _ = ctx.bridge.complete_activity_task(Bytes::from(completion)).await;
                ctx.gauges.decr_activities();
                handle = None;
                break;
            }
        }
    }
}

async fn await_running(handle: &mut Option<ActivityHandle>) -> Result<ActivityOutcome, tokio::task::JoinError> {
    match handle {
        Some(running) => (&mut running.join).await,
        None => std::future::pending().await,
    }
}
