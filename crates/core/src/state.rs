// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker lifecycle state machine's states and legal transitions.

use crate::simple_display;

/// The worker's lifecycle state, per the eight-state machine.
///
/// Every transition is broadcast to observers; see
/// `durable_worker::lifecycle::Lifecycle`, which is the only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum WorkerState {
    Initialized,
    Running,
    Suspended,
    Stopping,
    Draining,
    Drained,
    Stopped,
    Failed,
}

simple_display!(WorkerState {
    Initialized => "INITIALIZED",
    Running => "RUNNING",
    Suspended => "SUSPENDED",
    Stopping => "STOPPING",
    Draining => "DRAINING",
    Drained => "DRAINED",
    Stopped => "STOPPED",
    Failed => "FAILED",
});

impl WorkerState {
    /// Whether `self -> next` is one of the legal transitions in §4.1's
    /// table. `Failed` is reachable from any state; `Stopped`/`Failed`
    /// are terminal.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        if matches!(self, Stopped | Failed) {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Initialized, Running)
                | (Running, Suspended)
                | (Suspended, Running)
                | (Running, Stopping)
                | (Suspended, Stopping)
                | (Stopping, Draining)
                | (Draining, Drained)
                | (Drained, Stopped)
        )
    }

    /// Whether the poll loop should keep calling `poll` in this state
    /// (per §4.1's polling gate: `RUNNING | STOPPING | DRAINING`).
    pub fn should_poll(self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::Stopping | WorkerState::Draining)
    }

    /// Whether the poll loop should park, awaiting an exit from `SUSPENDED`.
    pub fn is_suspended(self) -> bool {
        matches!(self, WorkerState::Suspended)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        init_to_running = { WorkerState::Initialized, WorkerState::Running, true },
        running_to_suspended = { WorkerState::Running, WorkerState::Suspended, true },
        suspended_to_running = { WorkerState::Suspended, WorkerState::Running, true },
        running_to_stopping = { WorkerState::Running, WorkerState::Stopping, true },
        stopping_to_draining = { WorkerState::Stopping, WorkerState::Draining, true },
        draining_to_drained = { WorkerState::Draining, WorkerState::Drained, true },
        drained_to_stopped = { WorkerState::Drained, WorkerState::Stopped, true },
        any_to_failed = { WorkerState::Draining, WorkerState::Failed, true },
        init_to_draining_illegal = { WorkerState::Initialized, WorkerState::Draining, false },
        stopped_is_terminal = { WorkerState::Stopped, WorkerState::Running, false },
        failed_is_terminal = { WorkerState::Failed, WorkerState::Initialized, false },
        running_to_drained_skips_steps = { WorkerState::Running, WorkerState::Drained, false },
    )]
    fn transition_legality(from: WorkerState, to: WorkerState, expected: bool) {
        assert_eq!(from.can_transition_to(to), expected);
    }

    #[test]
    fn display_matches_protocol_names() {
        assert_eq!(WorkerState::Initialized.to_string(), "INITIALIZED");
        assert_eq!(WorkerState::Failed.to_string(), "FAILED");
    }
}
