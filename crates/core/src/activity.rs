// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity tasks and the per-task state they carry.

use crate::ids::TaskToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `activityType = [modulePath, fnName]`, the resolution key used by the
/// activity runner (§4.5) to find a registered Rust function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityType {
    pub module_path: String,
    pub fn_name: String,
}

impl ActivityType {
    pub fn new(module_path: impl Into<String>, fn_name: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            fn_name: fn_name.into(),
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.module_path, self.fn_name)
    }
}

/// Workflow context carried alongside a `start` variant, enough for the
/// activity runner to build an `ActivityInfo` (§4.5) without depending on
/// the pipeline or sandbox crates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityWorkflowContext {
    pub run_id: String,
    pub workflow_type: String,
    pub task_queue: String,
}

/// The `start` variant's payload (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStart {
    pub activity_id: String,
    pub activity_type: ActivityType,
    #[serde(default)]
    pub arguments: Vec<u8>,
    pub schedule_to_close_timeout_ms: Option<u64>,
    pub start_to_close_timeout_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
    pub attempt: u32,
    pub workflow_context: ActivityWorkflowContext,
}

/// Either a `start` or a `cancel` task for a given [`TaskToken`] (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "camelCase")]
pub enum ActivityTaskVariant {
    Start(ActivityStart),
    Cancel {
        #[serde(default)]
        details: HashMap<String, String>,
    },
}

/// A decoded activity task, grouped by `base64(taskToken)` (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTask {
    pub task_token: TaskToken,
    pub activity_id: String,
    pub variant: ActivityTaskVariant,
}

impl ActivityTask {
    pub fn is_start(&self) -> bool {
        matches!(self.variant, ActivityTaskVariant::Start(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn activity_type_displays_as_bracket_pair() {
        let ty = ActivityType::new("bad", "f");
        assert_eq!(ty.to_string(), "[bad, f]");
    }

    #[test]
    fn task_round_trips_through_json() {
        let task = ActivityTask {
            task_token: TaskToken::new(Bytes::from_static(b"tok")),
            activity_id: "a1".into(),
            variant: ActivityTaskVariant::Cancel {
                details: HashMap::new(),
            },
        };
        let json = serde_json::to_string(&task).expect("serialize");
        let back: ActivityTask = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(task, back);
    }
}
