// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lifecycle controller (C7, spec §4.1): owns the state broadcast,
//! signal registration, and the graceful-drain watchdog. The only writer
//! of `WorkerState` in the whole workspace — `worker-pipeline` only ever
//! reads it.

use crate::error::WorkerError;
use nix::sys::signal::Signal;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use worker_core::{InFlightGauges, WorkerState};
use worker_pipeline::PipelineHandle;

/// How often the idle-detection sweep re-checks the in-flight gauges while
/// `DRAINING`. Not named in spec §6; a sweep, not a notification, because
/// [`InFlightGauges`] is a plain atomic counter, not a broadcast channel.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_millis(25);

pub struct Lifecycle {
    state_tx: watch::Sender<WorkerState>,
    shutdown_signals: Vec<Signal>,
    drain_cancel: CancellationToken,
}

impl Lifecycle {
    pub fn new(shutdown_signals: Vec<Signal>) -> (Arc<Self>, watch::Receiver<WorkerState>) {
        let (state_tx, state_rx) = watch::channel(WorkerState::Initialized);
        let lifecycle = Arc::new(Self {
            state_tx,
            shutdown_signals,
            drain_cancel: CancellationToken::new(),
        });
        (lifecycle, state_rx)
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    /// Applies `self.state() -> next` iff legal per
    /// `WorkerState::can_transition_to`, broadcasting on success.
    pub fn transition(&self, next: WorkerState) -> Result<(), WorkerError> {
        let mut applied = false;
        let from = self.state();
        self.state_tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                applied = true;
                true
            } else {
                false
            }
        });
        if applied {
            tracing::info!(%from, to = %next, "worker state transition");
            Ok(())
        } else {
            Err(WorkerError::IllegalState(format!("cannot transition from {from} to {next}")))
        }
    }

    /// Unconditional transition to `FAILED` (legal from any non-terminal
    /// state per §4.1); used for fatal errors surfaced from the pipeline or
    /// bridge, and for a blown graceful-shutdown watchdog.
    pub fn fail(&self, reason: impl std::fmt::Display) {
        let from = self.state();
        let applied = self.state_tx.send_if_modified(|current| {
            if current.can_transition_to(WorkerState::Failed) {
                *current = WorkerState::Failed;
                true
            } else {
                false
            }
        });
        if applied {
            tracing::error!(%from, %reason, "worker transitioning to FAILED");
        }
    }

    /// One `tokio::signal::unix::signal` task per configured signal;
    /// receipt of any requests a drain-to-shutdown. Cancelled once the
    /// drain cycle these watchers belong to ends (`Lifecycle::drain`
    /// cancels its token on return), so they don't outlive the worker.
    pub fn spawn_signal_watchers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.shutdown_signals
            .iter()
            .copied()
            .filter_map(|signal| {
                let kind = signal_kind(signal);
                match tokio::signal::unix::signal(kind) {
                    Ok(mut stream) => {
                        let lifecycle = self.clone();
                        let cancel = self.drain_cancel.clone();
                        Some(tokio::spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = stream.recv() => {
                                    tracing::info!(?signal, "received shutdown signal");
                                    lifecycle.request_shutdown();
                                }
                            }
                        }))
                    }
                    Err(err) => {
                        tracing::warn!(?signal, error = %err, "failed to register signal handler");
                        None
                    }
                }
            })
            .collect()
    }

    /// `RUNNING|SUSPENDED -> STOPPING`. Logged and ignored, not panicking,
    /// if called from a state that doesn't admit it (e.g. a second signal
    /// arriving mid-drain).
    pub fn request_shutdown(&self) {
        if self.transition(WorkerState::Stopping).is_err() {
            tracing::debug!(state = %self.state(), "shutdown requested from a state that does not admit it");
        }
    }

    pub fn suspend_polling(&self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Suspended)
    }

    pub fn resume_polling(&self) -> Result<(), WorkerError> {
        self.transition(WorkerState::Running)
    }

    /// `STOPPING -> DRAINING`, then races `grace_time` against the
    /// idle-detection sweep reaching `DRAINED` (§4.1's watchdog). On
    /// timeout the worker is failed and `GracefulShutdownPeriodExpired` is
    /// returned; on success the idle sweep has already set `DRAINED`.
    pub async fn drain(
        self: &Arc<Self>,
        grace_time: Duration,
        gauges: Arc<InFlightGauges>,
        pipeline: PipelineHandle,
    ) -> Result<(), WorkerError> {
        self.transition(WorkerState::Draining)?;

        let sweep = tokio::spawn(run_idle_sweep(self.clone(), gauges, pipeline));
        let mut rx = self.subscribe();
        let wait_drained = async {
            loop {
                if *rx.borrow_and_update() == WorkerState::Drained {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };

        let result = tokio::select! {
            _ = wait_drained => Ok(()),
            _ = tokio::time::sleep(grace_time) => Err(WorkerError::GracefulShutdownPeriodExpired(grace_time)),
        };

        self.drain_cancel.cancel();
        sweep.abort();

        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }
}

fn signal_kind(signal: Signal) -> SignalKind {
    match signal {
        Signal::SIGINT => SignalKind::interrupt(),
        Signal::SIGTERM => SignalKind::terminate(),
        Signal::SIGQUIT => SignalKind::quit(),
        Signal::SIGHUP => SignalKind::hangup(),
        other => SignalKind::from_raw(other as i32),
    }
}

/// §4.1's idle-detection sweep: once every in-flight activation drains
/// while still `DRAINING`, synthesize a terminal eviction for every live
/// workflow group, then wait for those groups to actually close before
/// declaring `DRAINED`.
async fn run_idle_sweep(lifecycle: Arc<Lifecycle>, gauges: Arc<InFlightGauges>, pipeline: PipelineHandle) {
    let mut interval = tokio::time::interval(IDLE_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        if lifecycle.state() != WorkerState::Draining {
            return;
        }
        if gauges.is_idle() {
            break;
        }
    }

    for run_id in pipeline.live_run_ids() {
        tracing::debug!(%run_id, "idle sweep: synthesizing terminal eviction");
        pipeline.evict(run_id, "worker draining");
    }

    loop {
        interval.tick().await;
        if lifecycle.state() != WorkerState::Draining {
            return;
        }
        if gauges.running_workflows() == 0 {
            let _ = lifecycle.transition(WorkerState::Drained);
            return;
        }
    }
}
