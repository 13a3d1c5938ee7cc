// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers used throughout the worker core.

use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Stable identifier for a single workflow run, assigned by the
    /// orchestration service. Used as the grouping identity for the
    /// workflow pipeline (spec §4.2).
    pub struct RunId;
}

crate::define_id! {
    /// Identifies a worker instance to the bridge.
    pub struct WorkerId;
}

/// Opaque, server-assigned token identifying a single scheduled activity
/// attempt. Unlike [`RunId`] this is not human-readable; it is carried
/// as raw bytes end-to-end and only ever compared for equality or used to
/// derive a grouping key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaskToken(pub Bytes);

impl TaskToken {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The grouping identity for the activity pipeline: `base64(taskToken)`,
    /// per spec §4.2.
    pub fn group_key(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }
}

impl fmt::Debug for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskToken({})", self.group_key())
    }
}

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.group_key())
    }
}

impl Serialize for TaskToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.group_key())
    }
}

impl<'de> Deserialize<'de> for TaskToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(TaskToken(Bytes::from(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_token_group_key_is_stable_base64() {
        let token = TaskToken::new(Bytes::from_static(b"\x01\x02\x03"));
        assert_eq!(token.group_key(), "AQID");
        assert_eq!(token.to_string(), "AQID");
    }

    #[test]
    fn task_token_round_trips_through_serde() {
        let token = TaskToken::new(Bytes::from_static(b"hello-token"));
        let json = serde_json::to_string(&token).expect("serialize");
        let back: TaskToken = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(token, back);
    }

    #[test]
    fn run_id_equals_str() {
        let id = RunId::new("r1");
        assert_eq!(id, "r1");
        assert_eq!(id.to_string(), "r1");
    }
}
