// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The heartbeat channel (C8, spec §4.6): a single unbounded queue,
//! consumed by one task, forwarding to the bridge's fire-and-forget
//! `recordActivityHeartbeat`.

use bytes::Bytes;
use tokio::sync::mpsc;
use worker_bridge::{Bridge, DataConverter};
use worker_core::TaskToken;

#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub task_token: TaskToken,
    pub details: Vec<u8>,
}

/// Sender half handed to every running activity's [`crate::registry::ActivityContext`].
pub type HeartbeatSender = mpsc::UnboundedSender<Heartbeat>;

pub fn heartbeat_channel() -> (HeartbeatSender, mpsc::UnboundedReceiver<Heartbeat>) {
    mpsc::unbounded_channel()
}

/// The single consumer task, started by the façade at `RUNNING` entry and
/// joined at `DRAINED` (the in-flight activity gauge is guaranteed zero by
/// then, so the queue is guaranteed empty; see spec §4.6).
pub async fn run_heartbeat_consumer<B, D>(mut rx: mpsc::UnboundedReceiver<Heartbeat>, bridge: std::sync::Arc<B>, converter: D)
where
    B: Bridge,
    D: DataConverter,
{
    while let Some(heartbeat) = rx.recv().await {
        let payload = match converter.encode(&heartbeat.details).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(task_token = %heartbeat.task_token, error = %err, "failed to encode heartbeat");
                continue;
            }
        };
        if let Err(err) = bridge.record_activity_heartbeat(Bytes::from(payload)).await {
            tracing::warn!(task_token = %heartbeat.task_token, error = %err, "heartbeat delivery failed");
        }
    }
}
