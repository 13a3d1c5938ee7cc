// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow activations and the job variants they carry.

use crate::ids::RunId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single job inside a [`WorkflowActivation`]. The ten variants named in
/// spec §3, plus `Unknown` for forward compatibility with job kinds a newer
/// server may send: decoding an `Unknown` job is never itself an error, it
/// only counts as a non-eviction job for the purposes of §4.2 step 2's
/// "job list empty" rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowJob {
    StartWorkflow {
        workflow_id: String,
        workflow_type: String,
        randomness_seed: u64,
        #[serde(default)]
        arguments: Vec<u8>,
    },
    FireTimer {
        seq: u32,
    },
    ResolveActivity {
        seq: u32,
        #[serde(default)]
        result: Vec<u8>,
    },
    SignalWorkflow {
        signal_name: String,
        #[serde(default)]
        input: Vec<u8>,
    },
    QueryWorkflow {
        query_id: String,
        query_type: String,
        #[serde(default)]
        arguments: Vec<u8>,
    },
    CancelWorkflow {
        #[serde(default)]
        details: Vec<u8>,
    },
    UpdateRandomSeed {
        randomness_seed: u64,
    },
    NotifyHasChange {},
    RemoveFromCache {
        #[serde(default)]
        reason: String,
    },
    #[serde(other)]
    Unknown,
}

impl WorkflowJob {
    pub fn is_remove_from_cache(&self) -> bool {
        matches!(self, WorkflowJob::RemoveFromCache { .. })
    }

    pub fn is_start_workflow(&self) -> bool {
        matches!(self, WorkflowJob::StartWorkflow { .. })
    }
}

/// A decoded protobuf activation — the unit of work delivered to the
/// workflow pipeline, grouped by [`RunId`] (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowActivation {
    pub run_id: RunId,
    pub jobs: Vec<WorkflowJob>,
    #[serde(default)]
    pub is_replaying: bool,
    #[serde(default)]
    pub headers: HashMap<String, Vec<u8>>,
    #[serde(default)]
    pub arguments: Vec<u8>,
    /// Wall-clock timestamp, milliseconds since the epoch, fixed for the
    /// whole activation (spec §3's `now`): the only source of time the
    /// sandbox exposes to sandboxed code.
    #[serde(default)]
    pub now_ms: i64,
}

impl WorkflowActivation {
    /// Build the synthetic terminal activation used by idle-detection
    /// sweeps and by the `WorkflowError` feedback channel (§4.1, §4.2).
    pub fn synthetic_eviction(run_id: RunId, reason: impl Into<String>) -> Self {
        WorkflowActivation {
            run_id,
            jobs: vec![WorkflowJob::RemoveFromCache { reason: reason.into() }],
            is_replaying: false,
            headers: HashMap::new(),
            arguments: Vec::new(),
            now_ms: 0,
        }
    }

    /// Splits `jobs` into `(non_eviction, close)` per §4.2 step 1.
    ///
    /// `close` is true iff a `removeFromCache` job is present; the spec's
    /// invariant that at most one such job exists per activation is an
    /// input precondition, not re-validated here.
    pub fn partition_jobs(&self) -> (Vec<&WorkflowJob>, bool) {
        let close = self.jobs.iter().any(WorkflowJob::is_remove_from_cache);
        let rest = self
            .jobs
            .iter()
            .filter(|job| !job.is_remove_from_cache())
            .collect();
        (rest, close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_jobs_separates_eviction() {
        let activation = WorkflowActivation {
            run_id: RunId::new("r1"),
            jobs: vec![
                WorkflowJob::FireTimer { seq: 1 },
                WorkflowJob::RemoveFromCache { reason: "evict".into() },
            ],
            is_replaying: false,
            headers: HashMap::new(),
            arguments: Vec::new(),
            now_ms: 0,
        };
        let (rest, close) = activation.partition_jobs();
        assert!(close);
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn unknown_job_decodes_without_error() {
        let json = r#"{"type":"someFutureJobKind"}"#;
        let job: WorkflowJob = serde_json::from_str(json).expect("decode");
        assert_eq!(job, WorkflowJob::Unknown);
    }

    #[test]
    fn synthetic_eviction_carries_only_remove_from_cache() {
        let activation = WorkflowActivation::synthetic_eviction(RunId::new("r1"), "workflow-error");
        assert_eq!(activation.jobs.len(), 1);
        assert!(activation.jobs[0].is_remove_from_cache());
    }
}
