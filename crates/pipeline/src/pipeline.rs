// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Pipeline<B, D>` engine (C6, spec §4.2): poll-fan-out tasks feeding
//! `DashMap` routers of lazily-spawned, per-group worker tasks. The moral
//! equivalent of the teacher's `Runtime<S, A, N, C>`, generalized from "one
//! handler module per domain" to "one handler module per pipeline stage".

use crate::error::PipelineError;
use crate::group::{self, ActivityGroupContext, WorkflowGroupContext};
use crate::heartbeat::HeartbeatSender;
use crate::registry::ActivityRegistry;
use crate::workflow_step::WorkflowStepDeps;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_stream::{Stream, StreamExt};
use worker_bridge::{Bridge, BridgeError, DataConverter};
use worker_core::{ActivityTask, InFlightGauges, RunId, TaskToken, WorkerState, WorkflowActivation};

/// Numeric knobs from spec §6 relevant to pipeline construction. Everything
/// else in that table (timeouts, pool sizing) belongs to
/// [`crate::workflow_step::WorkflowStepDeps`] or `durable-worker`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrent_workflow_task_executions: usize,
    pub max_concurrent_activity_task_executions: usize,
    pub max_concurrent_workflow_task_polls: usize,
    pub max_concurrent_activity_task_polls: usize,
    /// Bound on each group's inbound channel. Not named in spec §6; chosen
    /// small since a group processes strictly serially and a deep queue
    /// only delays backpressure reaching the poll loop.
    pub group_channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflow_task_executions: 100,
            max_concurrent_activity_task_executions: 100,
            max_concurrent_workflow_task_polls: 5,
            max_concurrent_activity_task_polls: 5,
            group_channel_capacity: 16,
        }
    }
}

type WorkflowRouter = DashMap<RunId, mpsc::Sender<WorkflowActivation>>;
type ActivityRouter = DashMap<TaskToken, mpsc::Sender<ActivityTask>>;

/// A handle to a spawned [`Pipeline`] retained by the façade after
/// [`Pipeline::spawn`] consumes the engine itself: enough to enumerate
/// still-live workflow groups and re-inject a synthetic eviction into one,
/// which is exactly what idle-detection sweeps need (spec §4.1).
#[derive(Clone)]
pub struct PipelineHandle {
    workflow_groups: Arc<WorkflowRouter>,
    reinject_tx: mpsc::UnboundedSender<WorkflowActivation>,
}

impl PipelineHandle {
    pub fn live_run_ids(&self) -> Vec<RunId> {
        self.workflow_groups.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Re-inject a synthetic `removeFromCache` activation for `run_id`,
    /// routed exactly like a `WorkflowError` re-injection would be.
    pub fn evict(&self, run_id: RunId, reason: impl Into<String>) {
        let _ = self.reinject_tx.send(WorkflowActivation::synthetic_eviction(run_id, reason.into()));
    }
}

/// Owns the group routers, semaphores, and gauges shared by every group task
/// it spawns. Constructed once by the façade and driven by [`Pipeline::spawn`].
pub struct Pipeline<B: Bridge, D: DataConverter> {
    bridge: Arc<B>,
    converter: D,
    config: PipelineConfig,
    workflow_step_deps: Arc<WorkflowStepDeps>,
    registry: Arc<ActivityRegistry>,
    heartbeat_tx: HeartbeatSender,
    gauges: Arc<InFlightGauges>,
    workflow_semaphore: Arc<Semaphore>,
    activity_semaphore: Arc<Semaphore>,
    workflow_groups: Arc<WorkflowRouter>,
    activity_groups: Arc<ActivityRouter>,
    fatal_tx: mpsc::UnboundedSender<PipelineError>,
    reinject_tx: mpsc::UnboundedSender<WorkflowActivation>,
    reinject_rx: mpsc::UnboundedReceiver<WorkflowActivation>,
}

impl<B: Bridge, D: DataConverter> Pipeline<B, D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bridge: Arc<B>,
        converter: D,
        config: PipelineConfig,
        workflow_step_deps: WorkflowStepDeps,
        registry: ActivityRegistry,
        heartbeat_tx: HeartbeatSender,
        gauges: Arc<InFlightGauges>,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineError>) {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let (reinject_tx, reinject_rx) = mpsc::unbounded_channel();
        let pipeline = Self {
            bridge,
            converter,
            workflow_semaphore: Arc::new(Semaphore::new(config.max_concurrent_workflow_task_executions)),
            activity_semaphore: Arc::new(Semaphore::new(config.max_concurrent_activity_task_executions)),
            config,
            workflow_step_deps: Arc::new(workflow_step_deps),
            registry: Arc::new(registry),
            heartbeat_tx,
            gauges,
            workflow_groups: Arc::new(DashMap::new()),
            activity_groups: Arc::new(DashMap::new()),
            fatal_tx,
            reinject_tx,
            reinject_rx,
        };
        (pipeline, fatal_rx)
    }

    /// Spawns every poll, route, and (lazily, per group) worker task and
    /// returns their handles. Polling is gated on `state_rx` per §4.1's
    /// polling gate (`RUNNING | STOPPING | DRAINING`); the caller tears this
    /// down by aborting the returned handles once `state_rx` reaches
    /// `STOPPED`/`FAILED`.
    pub fn spawn(self, state_rx: watch::Receiver<WorkerState>) -> (Vec<JoinHandle<()>>, PipelineHandle) {
        let mut handles = Vec::new();

        let Pipeline {
            bridge,
            converter,
            config,
            workflow_step_deps,
            registry,
            heartbeat_tx,
            gauges,
            workflow_semaphore,
            activity_semaphore,
            workflow_groups,
            activity_groups,
            fatal_tx,
            reinject_tx,
            reinject_rx,
        } = self;

        let pipeline_handle = PipelineHandle {
            workflow_groups: workflow_groups.clone(),
            reinject_tx: reinject_tx.clone(),
        };

        let (poll_tx, poll_rx) = mpsc::channel::<WorkflowActivation>(1);
        for _ in 0..config.max_concurrent_workflow_task_polls.max(1) {
            handles.push(tokio::spawn(poll_workflow_loop(bridge.clone(), poll_tx.clone(), state_rx.clone())));
        }
        drop(poll_tx);

        let merged = ReceiverStream::new(poll_rx).merge(UnboundedReceiverStream::new(reinject_rx));
        handles.push(tokio::spawn(route_workflow_loop(
            merged,
            workflow_groups,
            bridge.clone(),
            workflow_step_deps,
            workflow_semaphore,
            gauges.clone(),
            fatal_tx.clone(),
            reinject_tx,
            config.group_channel_capacity,
        )));

        let (activity_poll_tx, activity_poll_rx) = mpsc::channel::<ActivityTask>(1);
        for _ in 0..config.max_concurrent_activity_task_polls.max(1) {
            handles.push(tokio::spawn(poll_activity_loop(
                bridge.clone(),
                activity_poll_tx.clone(),
                state_rx.clone(),
            )));
        }
        drop(activity_poll_tx);

        handles.push(tokio::spawn(route_activity_loop(
            activity_poll_rx,
            activity_groups,
            bridge,
            converter,
            registry,
            heartbeat_tx,
            activity_semaphore,
            gauges,
            config.group_channel_capacity,
        )));

        (handles, pipeline_handle)
    }
}

async fn poll_workflow_loop<B: Bridge>(bridge: Arc<B>, tx: mpsc::Sender<WorkflowActivation>, mut state_rx: watch::Receiver<WorkerState>) {
    loop {
        let state = *state_rx.borrow_and_update();
        if state.is_terminal() {
            return;
        }
        if !state.should_poll() {
            if state_rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        match bridge.poll_workflow_activation().await {
            Ok(bytes) => match decode::<WorkflowActivation>(&bytes) {
                Ok(activation) => {
                    if tx.send(activation).await.is_err() {
                        return;
                    }
                }
                Err(err) => tracing::error!(error = %err, "failed to decode workflow activation"),
            },
            Err(BridgeError::Shutdown) => {
                tracing::debug!("workflow poll returned shutdown");
                return;
            }
            Err(err) => tracing::error!(error = %err, "workflow poll failed"),
        }
    }
}

async fn poll_activity_loop<B: Bridge>(bridge: Arc<B>, tx: mpsc::Sender<ActivityTask>, mut state_rx: watch::Receiver<WorkerState>) {
    loop {
        let state = *state_rx.borrow_and_update();
        if state.is_terminal() {
            return;
        }
        if !state.should_poll() {
            if state_rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        match bridge.poll_activity_task().await {
            Ok(bytes) => match decode::<ActivityTask>(&bytes) {
                Ok(task) => {
                    if tx.send(task).await.is_err() {
                        return;
                    }
                }
                Err(err) => tracing::error!(error = %err, "failed to decode activity task"),
            },
            Err(BridgeError::Shutdown) => {
                tracing::debug!("activity poll returned shutdown");
                return;
            }
            Err(err) => tracing::error!(error = %err, "activity poll failed"),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[allow(clippy::too_many_arguments)]
async fn route_workflow_loop<B: Bridge>(
    mut activations: impl Stream<Item = WorkflowActivation> + Unpin,
    groups: Arc<WorkflowRouter>,
    bridge: Arc<B>,
    step_deps: Arc<WorkflowStepDeps>,
    semaphore: Arc<Semaphore>,
    gauges: Arc<InFlightGauges>,
    fatal_tx: mpsc::UnboundedSender<PipelineError>,
    reinject_tx: mpsc::UnboundedSender<WorkflowActivation>,
    capacity: usize,
) {
    while let Some(activation) = activations.next().await {
        let run_id = activation.run_id.clone();
        let sender = match groups.get(&run_id) {
            Some(entry) => entry.clone(),
            None => spawn_workflow_group(
                run_id.clone(),
                &groups,
                bridge.clone(),
                step_deps.clone(),
                semaphore.clone(),
                gauges.clone(),
                fatal_tx.clone(),
                reinject_tx.clone(),
                capacity,
            ),
        };
        if sender.send(activation).await.is_err() {
            tracing::warn!(run_id = %run_id, "workflow group channel closed before send");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_workflow_group<B: Bridge>(
    run_id: RunId,
    groups: &Arc<WorkflowRouter>,
    bridge: Arc<B>,
    step_deps: Arc<WorkflowStepDeps>,
    semaphore: Arc<Semaphore>,
    gauges: Arc<InFlightGauges>,
    fatal_tx: mpsc::UnboundedSender<PipelineError>,
    reinject_tx: mpsc::UnboundedSender<WorkflowActivation>,
    capacity: usize,
) -> mpsc::Sender<WorkflowActivation> {
    let (tx, rx) = mpsc::channel(capacity);
    groups.insert(run_id.clone(), tx.clone());
    let groups = groups.clone();
    let reaper_key = run_id.clone();
    tokio::spawn(async move {
        let ctx = WorkflowGroupContext {
            bridge,
            step_deps,
            semaphore,
            gauges,
            fatal_tx,
            reinject_tx,
        };
        group::run_workflow_group(run_id, rx, ctx).await;
        groups.remove(&reaper_key);
    });
    tx
}

#[allow(clippy::too_many_arguments)]
async fn route_activity_loop<B: Bridge, D: DataConverter>(
    mut tasks: mpsc::Receiver<ActivityTask>,
    groups: Arc<ActivityRouter>,
    bridge: Arc<B>,
    converter: D,
    registry: Arc<ActivityRegistry>,
    heartbeat_tx: HeartbeatSender,
    semaphore: Arc<Semaphore>,
    gauges: Arc<InFlightGauges>,
    capacity: usize,
) {
    while let Some(task) = tasks.recv().await {
        let token = task.task_token.clone();
        let sender = match groups.get(&token) {
            Some(entry) => entry.clone(),
            None => spawn_activity_group(
                token.clone(),
                &groups,
                bridge.clone(),
                converter.clone(),
                registry.clone(),
                heartbeat_tx.clone(),
                semaphore.clone(),
                gauges.clone(),
                capacity,
            ),
        };
        if sender.send(task).await.is_err() {
            tracing::warn!(task_token = %token, "activity group channel closed before send");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_activity_group<B: Bridge, D: DataConverter>(
    task_token: TaskToken,
    groups: &Arc<ActivityRouter>,
    bridge: Arc<B>,
    converter: D,
    registry: Arc<ActivityRegistry>,
    heartbeat_tx: HeartbeatSender,
    semaphore: Arc<Semaphore>,
    gauges: Arc<InFlightGauges>,
    capacity: usize,
) -> mpsc::Sender<ActivityTask> {
    let (tx, rx) = mpsc::channel(capacity);
    groups.insert(task_token.clone(), tx.clone());
    let groups = groups.clone();
    let reaper_key = task_token.clone();
    tokio::spawn(async move {
        let ctx = ActivityGroupContext {
            bridge,
            converter,
            registry,
            heartbeat_tx,
            semaphore,
            gauges,
        };
        group::run_activity_group(task_token, rx, ctx).await;
        groups.remove(&reaper_key);
    });
    tx
}

/// How long integration tests wait for a pipeline's effects to surface
/// before declaring failure, since the poll/route tasks run on their own
/// schedule rather than being driven synchronously.
#[cfg(test)]
const TEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);


/// Grouping/serialization invariants and gauge non-negativity from §8,
/// checked against arbitrary inputs rather than fixed examples.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use worker_core::{TaskToken, WorkflowJob};

    proptest! {
        /// Routing groups workflow activations by `RunId` equality; the
        /// router is keyed on the struct itself, so any two activations
        /// carrying the same run id string must hash/compare equal as
        /// routing keys regardless of what else differs between them.
        #[test]
        fn same_run_id_is_always_the_same_routing_key(run_id in "[a-zA-Z0-9_-]{1,32}", seed_a: u32, seed_b: u32) {
            let a = WorkflowActivation {
                run_id: RunId::new(run_id.clone()),
                jobs: vec![WorkflowJob::FireTimer { seq: seed_a }],
                is_replaying: false,
                headers: Default::default(),
                arguments: Vec::new(),
                now_ms: 0,
            };
            let b = WorkflowActivation {
                run_id: RunId::new(run_id),
                jobs: vec![WorkflowJob::FireTimer { seq: seed_b }],
                is_replaying: false,
                headers: Default::default(),
                arguments: Vec::new(),
                now_ms: 0,
            };
            prop_assert_eq!(a.run_id, b.run_id);
        }

        /// The activity router is keyed on `TaskToken`'s raw bytes, not its
        /// base64 rendering; any two tokens built from the same bytes must
        /// be equal, and tokens built from different bytes must not be
        /// (modulo the astronomically unlikely equal-bytes case proptest
        /// won't hit in practice).
        #[test]
        fn task_token_identity_follows_its_bytes(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let a = TaskToken::new(bytes.clone());
            let b = TaskToken::new(bytes);
            prop_assert_eq!(a, b);
        }

        /// `TaskToken`'s `group_key` is its wire encoding (spec §4.2); it
        /// must round-trip through JSON for arbitrary byte payloads, not
        /// just the fixed example in `ids.rs`'s unit test.
        #[test]
        fn task_token_round_trips_through_json_for_any_bytes(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let token = TaskToken::new(bytes);
            let json = serde_json::to_vec(&token).expect("serialize");
            let back: TaskToken = serde_json::from_slice(&json).expect("deserialize");
            prop_assert_eq!(token, back);
        }

        /// A `WorkflowActivation` decoded straight off the bridge's raw
        /// bytes (spec §4.2: no `DataConverter` in the envelope) round-trips
        /// for arbitrary run ids and job counts.
        #[test]
        fn workflow_activation_decode_round_trips(
            run_id in "[a-zA-Z0-9_-]{1,32}",
            timer_seqs in prop::collection::vec(any::<u32>(), 0..8),
        ) {
            let activation = WorkflowActivation {
                run_id: RunId::new(run_id),
                jobs: timer_seqs.into_iter().map(|seq| WorkflowJob::FireTimer { seq }).collect(),
                is_replaying: false,
                headers: Default::default(),
                arguments: Vec::new(),
                now_ms: 0,
            };
            let bytes = Bytes::from(serde_json::to_vec(&activation).expect("encode"));
            let decoded: WorkflowActivation = decode(&bytes).expect("decode");
            prop_assert_eq!(decoded.run_id, activation.run_id);
            prop_assert_eq!(decoded.jobs.len(), activation.jobs.len());
        }

        /// `InFlightGauges`' counters never drift from the net of however
        /// many increments and decrements were applied, for any
        /// interleaving (spec §8: gauge non-negativity/consistency). Going
        /// negative on a double-decrement is the documented bug signal, not
        /// something this property forbids — it only checks the counter
        /// matches arithmetic.
        #[test]
        fn gauge_matches_net_of_arbitrary_increment_decrement_sequence(ops in prop::collection::vec(any::<bool>(), 0..64)) {
            let gauges = InFlightGauges::new();
            let mut expected: i64 = 0;
            for incr in ops {
                if incr {
                    gauges.incr_activations();
                    expected += 1;
                } else {
                    gauges.decr_activations();
                    expected -= 1;
                }
            }
            prop_assert_eq!(gauges.activations(), expected);
        }
    }
}
