// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Worker<B, D>` façade (C9, spec §4.7): wires the sandbox pool, the
//! pipeline, and the lifecycle controller into the single object an
//! embedding program constructs and runs.

use crate::error::WorkerError;
use crate::lifecycle::Lifecycle;
use crate::options::WorkerOptions;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use worker_bridge::{Bridge, DataConverter};
use worker_bundler::BundleArtifact;
use worker_core::{InFlightGauges, WorkerState};
use worker_pipeline::{heartbeat_channel, run_heartbeat_consumer, ActivityRegistry, Heartbeat, Pipeline, PipelineConfig};
use worker_sandbox::SandboxPool;

/// The engine epoch is incremented on this period; `isolateExecutionTimeoutMs`
/// is enforced in units of it (spec §4.3). Not named in spec §6 — an
/// implementation constant, not a worker option.
const EPOCH_TICK_PERIOD: Duration = Duration::from_millis(50);

/// Every concurrent workflow task execution holds a sandbox slot for its
/// duration (spec §4.3: "group concurrency is sized ≤ pool size"); a
/// configured execution limit higher than the pool would only mean the
/// excess runs fail with `PoolExhausted` instead of ever executing.
fn clamp_workflow_concurrency_to_pool(max_concurrent_workflow_task_executions: usize, isolate_pool_size: usize) -> usize {
    max_concurrent_workflow_task_executions.min(isolate_pool_size)
}

/// `run()` takes `&self`, not `&mut self`, so `shutdown`/`suspend_polling`/
/// `resume_polling`/`state` stay callable (e.g. from a signal handler task)
/// while it is in flight (spec §4.7). The pipeline and heartbeat receiver
/// are therefore one-shot values taken out of a lock rather than plain
/// fields, the same pattern `worker-bridge`'s `FakeBridge` uses for its
/// interior state.
pub struct Worker<B: Bridge, D: DataConverter> {
    bridge: Arc<B>,
    converter: D,
    sandbox_pool: Arc<SandboxPool>,
    gauges: Arc<InFlightGauges>,
    lifecycle: Arc<Lifecycle>,
    pipeline: Mutex<Option<Pipeline<B, D>>>,
    heartbeat_rx: Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<Heartbeat>>>,
}

impl<B: Bridge, D: DataConverter> Worker<B, D> {
    /// Compiles `artifact`'s entry module once, builds the sandbox pool and
    /// pipeline, and parks the worker in `INITIALIZED`. Fallible because
    /// compiling the entry module and building the wasmtime engine can both
    /// fail (spec §4.4/§4.3's boundary).
    pub fn new(
        options: WorkerOptions,
        bridge: Arc<B>,
        converter: D,
        registry: ActivityRegistry,
        artifact: &BundleArtifact,
    ) -> Result<(Self, watch::Receiver<WorkerState>), WorkerError> {
        let mut config = wasmtime::Config::new();
        config.epoch_interruption(true);
        config.async_support(true);
        let engine = Arc::new(wasmtime::Engine::new(&config).map_err(|e| WorkerError::IllegalState(e.to_string()))?);
        let entry_module = worker_sandbox::compile_entry_module(&engine, artifact)?;

        let sandbox_pool = Arc::new(SandboxPool::new(
            engine,
            entry_module,
            options.isolate_pool_size,
            EPOCH_TICK_PERIOD,
        ));

        let ticks_per_timeout = SandboxPool::ticks_for_timeout(EPOCH_TICK_PERIOD, options.isolate_execution_timeout_ms);
        let max_memory_bytes = options.max_isolate_memory_mb.saturating_mul(1024 * 1024);

        let gauges = Arc::new(InFlightGauges::new());
        let (heartbeat_tx, heartbeat_rx) = heartbeat_channel();

        let workflow_step_deps = worker_pipeline::WorkflowStepDeps {
            sandbox_pool: sandbox_pool.clone(),
            activity_defaults: options.activity_defaults.clone(),
            interceptor_modules: options.interceptor_modules.clone(),
            timeout_ms: options.isolate_execution_timeout_ms,
            max_memory_bytes,
            ticks_per_timeout,
            task_queue: options.task_queue.clone(),
            namespace: options.namespace.clone(),
            dependencies: options.dependencies.clone(),
        };

        let max_concurrent_workflow_task_executions =
            clamp_workflow_concurrency_to_pool(options.max_concurrent_workflow_task_executions, options.isolate_pool_size);

        let pipeline_config = PipelineConfig {
            max_concurrent_workflow_task_executions,
            max_concurrent_activity_task_executions: options.max_concurrent_activity_task_executions,
            max_concurrent_workflow_task_polls: options.max_concurrent_workflow_task_polls,
            max_concurrent_activity_task_polls: options.max_concurrent_activity_task_polls,
            ..PipelineConfig::default()
        };

        let (pipeline, mut fatal_rx) = Pipeline::new(
            bridge.clone(),
            converter.clone(),
            pipeline_config,
            workflow_step_deps,
            registry,
            heartbeat_tx,
            gauges.clone(),
        );

        let (lifecycle, state_rx) = Lifecycle::new(options.shutdown_signals.clone());

        // Any fatal pipeline error fails the whole worker (§7's propagation
        // policy); forwarded onto the lifecycle from a detached task since
        // `Pipeline::new` hands back the receiver before `spawn` exists.
        let fail_lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            if let Some(err) = fatal_rx.recv().await {
                if err.is_fatal() {
                    fail_lifecycle.fail(err);
                }
            }
        });

        let worker = Self {
            bridge,
            converter,
            sandbox_pool,
            gauges,
            lifecycle,
            pipeline: Mutex::new(Some(pipeline)),
            heartbeat_rx: Mutex::new(Some(heartbeat_rx)),
        };
        Ok((worker, state_rx))
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.lifecycle.subscribe()
    }

    /// `STOPPING` request; idempotent no-op if already stopping/terminal.
    pub fn shutdown(&self) {
        self.lifecycle.request_shutdown();
    }

    pub fn suspend_polling(&self) -> Result<(), WorkerError> {
        self.lifecycle.suspend_polling()
    }

    pub fn resume_polling(&self) -> Result<(), WorkerError> {
        self.lifecycle.resume_polling()
    }

    /// Drives the worker through its whole lifecycle: `INITIALIZED ->
    /// RUNNING`, spawns the pipeline, signal watchers, and heartbeat
    /// consumer, then awaits a shutdown request and drains (spec §4.1,
    /// §4.7). Returns once `STOPPED` (or fails into `FAILED`). Only
    /// callable once; the pipeline and heartbeat receiver are consumed on
    /// the first call. Takes `&self`, not `&mut self`, so `shutdown`,
    /// `suspend_polling`, `resume_polling`, and `state` stay callable from
    /// another task while a call to `run` is in flight.
    pub async fn run(&self, grace_time: Duration) -> Result<(), WorkerError> {
        self.lifecycle.transition(WorkerState::Running)?;

        let pipeline = self
            .pipeline
            .lock()
            .take()
            .ok_or_else(|| WorkerError::IllegalState("worker already run".to_string()))?;
        let heartbeat_rx = self
            .heartbeat_rx
            .lock()
            .take()
            .ok_or_else(|| WorkerError::IllegalState("worker already run".to_string()))?;

        let state_rx = self.lifecycle.subscribe();
        let (pipeline_handles, pipeline_handle) = pipeline.spawn(state_rx);
        let signal_handles = self.lifecycle.spawn_signal_watchers();
        let heartbeat_handle = tokio::spawn(run_heartbeat_consumer(heartbeat_rx, self.bridge.clone(), self.converter.clone()));

        let mut state_rx = self.lifecycle.subscribe();
        loop {
            if *state_rx.borrow_and_update() == WorkerState::Stopping {
                break;
            }
            if state_rx.changed().await.is_err() {
                break;
            }
        }

        let drain_result = self.lifecycle.drain(grace_time, self.gauges.clone(), pipeline_handle).await;

        for handle in pipeline_handles {
            handle.abort();
        }
        for handle in signal_handles {
            handle.abort();
        }
        self.sandbox_pool.destroy();

        if let Err(err) = self.bridge.worker_shutdown().await {
            tracing::warn!(error = %err, "worker_shutdown call failed");
        }
        heartbeat_handle.abort();
        if let Err(err) = self.bridge.complete_shutdown().await {
            tracing::warn!(error = %err, "complete_shutdown call failed");
        }

        drain_result?;
        self.lifecycle.transition(WorkerState::Stopped)?;
        Ok(())
    }
}
