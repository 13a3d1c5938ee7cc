// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Bridge` trait: the seven-call contract to the external orchestration
//! service transport (spec §6). Never interprets payload contents — every
//! call here moves opaque length-delimited byte buffers.

use crate::error::BridgeError;
use async_trait::async_trait;
use bytes::Bytes;

/// Thin async wrapper over the external native bridge (C1).
///
/// Implementors own the actual wire transport; this crate ships one,
/// [`crate::FramedBridge`], for any `AsyncRead + AsyncWrite` stream.
#[async_trait]
pub trait Bridge: Send + Sync + 'static {
    /// Long-poll for the next workflow activation. Returns
    /// `BridgeError::Shutdown` once the bridge is draining.
    async fn poll_workflow_activation(&self) -> Result<Bytes, BridgeError>;

    /// Long-poll for the next activity task. Same shutdown semantics as
    /// [`Bridge::poll_workflow_activation`].
    async fn poll_activity_task(&self) -> Result<Bytes, BridgeError>;

    /// Submit an encoded workflow activation completion. May fail with
    /// `BridgeError::Workflow { run_id, .. }`.
    async fn complete_workflow_activation(&self, completion: Bytes) -> Result<(), BridgeError>;

    /// Submit an encoded activity task completion.
    async fn complete_activity_task(&self, completion: Bytes) -> Result<(), BridgeError>;

    /// Fire-and-forget heartbeat recording; callers should log on error but
    /// never treat it as fatal.
    async fn record_activity_heartbeat(&self, heartbeat: Bytes) -> Result<(), BridgeError>;

    /// Signal server-side drain; the bridge will thereafter return
    /// `BridgeError::Shutdown` from polls.
    async fn worker_shutdown(&self) -> Result<(), BridgeError>;

    /// De-register this worker from the native bridge.
    async fn complete_shutdown(&self) -> Result<(), BridgeError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedCall {
        PollWorkflowActivation,
        PollActivityTask,
        CompleteWorkflowActivation(Bytes),
        CompleteActivityTask(Bytes),
        RecordActivityHeartbeat(Bytes),
        WorkerShutdown,
        CompleteShutdown,
    }

    struct FakeState {
        workflow_activations: VecDeque<Result<Bytes, BridgeError>>,
        activity_tasks: VecDeque<Result<Bytes, BridgeError>>,
        completion_result: Result<(), BridgeError>,
        calls: Vec<RecordedCall>,
    }

    /// In-memory bridge for pipeline/worker tests; queues up canned
    /// responses and records every call made.
    #[derive(Clone)]
    pub struct FakeBridge {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeBridge {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    workflow_activations: VecDeque::new(),
                    activity_tasks: VecDeque::new(),
                    completion_result: Ok(()),
                    calls: Vec::new(),
                })),
            }
        }
    }

    impl FakeBridge {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_workflow_activation(&self, bytes: Bytes) {
            self.inner.lock().workflow_activations.push_back(Ok(bytes));
        }

        pub fn push_activity_task(&self, bytes: Bytes) {
            self.inner.lock().activity_tasks.push_back(Ok(bytes));
        }

        pub fn fail_next_completion(&self, err: BridgeError) {
            self.inner.lock().completion_result = Err(err);
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl Bridge for FakeBridge {
        async fn poll_workflow_activation(&self) -> Result<Bytes, BridgeError> {
            let mut state = self.inner.lock();
            state.calls.push(RecordedCall::PollWorkflowActivation);
            state
                .workflow_activations
                .pop_front()
                .unwrap_or(Err(BridgeError::Shutdown))
        }

        async fn poll_activity_task(&self) -> Result<Bytes, BridgeError> {
            let mut state = self.inner.lock();
            state.calls.push(RecordedCall::PollActivityTask);
            state
                .activity_tasks
                .pop_front()
                .unwrap_or(Err(BridgeError::Shutdown))
        }

        async fn complete_workflow_activation(&self, completion: Bytes) -> Result<(), BridgeError> {
            let mut state = self.inner.lock();
            state.calls.push(RecordedCall::CompleteWorkflowActivation(completion));
            std::mem::replace(&mut state.completion_result, Ok(()))
        }

        async fn complete_activity_task(&self, completion: Bytes) -> Result<(), BridgeError> {
            self.inner.lock().calls.push(RecordedCall::CompleteActivityTask(completion));
            Ok(())
        }

        async fn record_activity_heartbeat(&self, heartbeat: Bytes) -> Result<(), BridgeError> {
            self.inner.lock().calls.push(RecordedCall::RecordActivityHeartbeat(heartbeat));
            Ok(())
        }

        async fn worker_shutdown(&self) -> Result<(), BridgeError> {
            self.inner.lock().calls.push(RecordedCall::WorkerShutdown);
            Ok(())
        }

        async fn complete_shutdown(&self) -> Result<(), BridgeError> {
            self.inner.lock().calls.push(RecordedCall::CompleteShutdown);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBridge;

#[cfg(test)]
mod tests {
    use super::fake::FakeBridge;
    use super::*;

    #[tokio::test]
    async fn fake_bridge_returns_shutdown_once_queue_drains() {
        let bridge = FakeBridge::new();
        bridge.push_workflow_activation(Bytes::from_static(b"one"));
        assert_eq!(bridge.poll_workflow_activation().await.unwrap(), Bytes::from_static(b"one"));
        assert!(matches!(
            bridge.poll_workflow_activation().await,
            Err(BridgeError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn fake_bridge_records_calls_in_order() {
        let bridge = FakeBridge::new();
        let _ = bridge.complete_activity_task(Bytes::from_static(b"a")).await;
        let _ = bridge.worker_shutdown().await;
        assert_eq!(
            bridge.calls(),
            vec![
                super::fake::RecordedCall::CompleteActivityTask(Bytes::from_static(b"a")),
                super::fake::RecordedCall::WorkerShutdown,
            ]
        );
    }
}
