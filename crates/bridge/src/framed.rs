// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A concrete [`crate::Bridge`] over any `AsyncRead + AsyncWrite` stream,
//! using a length-delimited frame for each message — the ecosystem-standard
//! generalization of the teacher's own hand-rolled "4-byte length prefix +
//! payload" wire format.

use crate::bridge::Bridge;
use crate::error::BridgeError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// One call kind, tagged so a single framed duplex stream can multiplex all
/// seven of the bridge's calls without interpreting their payloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
enum CallKind {
    PollWorkflowActivation,
    PollActivityTask,
    CompleteWorkflowActivation,
    CompleteActivityTask,
    RecordActivityHeartbeat,
    WorkerShutdown,
    CompleteShutdown,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    call: CallKind,
    #[serde(with = "serde_bytes_compat")]
    payload: Vec<u8>,
}

mod serde_bytes_compat {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        serde::de::Deserialize::deserialize(deserializer)
    }
}

/// Adapts a duplex byte stream into a [`Bridge`] using
/// [`LengthDelimitedCodec`] framing. Each call sends one frame (a JSON
/// envelope naming the call plus its opaque payload bytes) and, for calls
/// that expect a reply, awaits exactly one frame back. Calls are serialized
/// over the shared stream by an internal mutex — concurrent callers queue,
/// matching the spec's framing of the bridge handle as "shared" (§5).
pub struct FramedBridge<T> {
    framed: Mutex<Framed<T, LengthDelimitedCodec>>,
}

impl<T> FramedBridge<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(io: T) -> Self {
        Self {
            framed: Mutex::new(Framed::new(io, LengthDelimitedCodec::new())),
        }
    }

    async fn call(&self, kind: CallKind, payload: Vec<u8>) -> Result<Vec<u8>, BridgeError> {
        let envelope = Envelope { call: kind, payload };
        let encoded = serde_json::to_vec(&envelope)
            .map_err(|e| BridgeError::Transport(format!("envelope encode failed: {e}")))?;

        let mut framed = self.framed.lock().await;
        framed
            .send(Bytes::from(encoded))
            .await
            .map_err(|e| BridgeError::Transport(format!("frame send failed: {e}")))?;

        let response = framed
            .next()
            .await
            .ok_or(BridgeError::Shutdown)?
            .map_err(|e| BridgeError::Transport(format!("frame read failed: {e}")))?;

        decode_reply(&response)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum Reply {
    Ok {
        #[serde(with = "serde_bytes_compat", default)]
        payload: Vec<u8>,
    },
    Shutdown,
    WorkflowError {
        run_id: String,
        message: String,
    },
    Error {
        message: String,
    },
}

fn decode_reply(bytes: &[u8]) -> Result<Vec<u8>, BridgeError> {
    let reply: Reply = serde_json::from_slice(bytes)
        .map_err(|e| BridgeError::Transport(format!("reply decode failed: {e}")))?;
    match reply {
        Reply::Ok { payload } => Ok(payload),
        Reply::Shutdown => Err(BridgeError::Shutdown),
        Reply::WorkflowError { run_id, message } => {
            Err(BridgeError::Workflow { run_id: worker_core::RunId::new(run_id), message })
        }
        Reply::Error { message } => Err(BridgeError::Transport(message)),
    }
}

#[async_trait]
impl<T> Bridge for FramedBridge<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn poll_workflow_activation(&self) -> Result<Bytes, BridgeError> {
        self.call(CallKind::PollWorkflowActivation, Vec::new())
            .await
            .map(Bytes::from)
    }

    async fn poll_activity_task(&self) -> Result<Bytes, BridgeError> {
        self.call(CallKind::PollActivityTask, Vec::new()).await.map(Bytes::from)
    }

    async fn complete_workflow_activation(&self, completion: Bytes) -> Result<(), BridgeError> {
        self.call(CallKind::CompleteWorkflowActivation, completion.to_vec())
            .await
            .map(|_| ())
    }

    async fn complete_activity_task(&self, completion: Bytes) -> Result<(), BridgeError> {
        self.call(CallKind::CompleteActivityTask, completion.to_vec())
            .await
            .map(|_| ())
    }

    async fn record_activity_heartbeat(&self, heartbeat: Bytes) -> Result<(), BridgeError> {
        self.call(CallKind::RecordActivityHeartbeat, heartbeat.to_vec())
            .await
            .map(|_| ())
    }

    async fn worker_shutdown(&self) -> Result<(), BridgeError> {
        self.call(CallKind::WorkerShutdown, Vec::new()).await.map(|_| ())
    }

    async fn complete_shutdown(&self) -> Result<(), BridgeError> {
        self.call(CallKind::CompleteShutdown, Vec::new()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A bare-bones peer that decodes one envelope and writes back a
    /// canned reply, enough to exercise the framing without a real bridge.
    async fn respond_once(io: tokio::io::DuplexStream, reply: Reply) {
        let mut framed = Framed::new(io, LengthDelimitedCodec::new());
        let frame = framed.next().await.expect("frame").expect("valid frame");
        let _: Envelope = serde_json::from_slice(&frame).expect("envelope");
        let encoded = serde_json::to_vec(&reply).expect("encode reply");
        framed.send(Bytes::from(encoded)).await.expect("send reply");
    }

    #[tokio::test]
    async fn poll_workflow_activation_round_trips_payload() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(respond_once(
            server,
            Reply::Ok { payload: b"activation-bytes".to_vec() },
        ));

        let bridge = FramedBridge::new(client);
        let result = bridge.poll_workflow_activation().await.expect("poll");
        assert_eq!(result, Bytes::from_static(b"activation-bytes"));
    }

    #[tokio::test]
    async fn shutdown_reply_becomes_shutdown_error() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(respond_once(server, Reply::Shutdown));

        let bridge = FramedBridge::new(client);
        let err = bridge.poll_activity_task().await.unwrap_err();
        assert!(matches!(err, BridgeError::Shutdown));
    }

    #[tokio::test]
    async fn workflow_error_reply_carries_run_id() {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(respond_once(
            server,
            Reply::WorkflowError { run_id: "r1".into(), message: "rejected".into() },
        ));

        let bridge = FramedBridge::new(client);
        let err = bridge
            .complete_workflow_activation(Bytes::from_static(b"completion"))
            .await
            .unwrap_err();
        match err {
            BridgeError::Workflow { run_id, message } => {
                assert_eq!(run_id, "r1");
                assert_eq!(message, "rejected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
