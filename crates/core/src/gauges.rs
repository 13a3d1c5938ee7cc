// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-flight counters used for drain detection (spec §3, §4.1, §8).

use std::sync::atomic::{AtomicI64, Ordering};

/// Three monotonic-ish gauges: in-flight activations, in-flight activities,
/// running workflow instances. `AtomicI64`, never `AtomicUsize` or
/// `AtomicU64` — a logic bug that double-decrements becomes visible as a
/// negative value in tests/metrics instead of silently wrapping.
#[derive(Debug, Default)]
pub struct InFlightGauges {
    activations: AtomicI64,
    activities: AtomicI64,
    running_workflows: AtomicI64,
}

impl InFlightGauges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activations(&self) -> i64 {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn activities(&self) -> i64 {
        self.activities.load(Ordering::SeqCst)
    }

    pub fn running_workflows(&self) -> i64 {
        self.running_workflows.load(Ordering::SeqCst)
    }

    pub fn incr_activations(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decr_activations(&self) {
        self.activations.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn incr_activities(&self) {
        self.activities.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decr_activities(&self) {
        self.activities.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn incr_running_workflows(&self) {
        self.running_workflows.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decr_running_workflows(&self) {
        self.running_workflows.fetch_sub(1, Ordering::SeqCst);
    }

    /// `state == DRAINING && inFlightActivations == 0`, the idle-detection
    /// predicate from §4.1.
    pub fn is_idle(&self) -> bool {
        self.activations() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_start_at_zero() {
        let gauges = InFlightGauges::new();
        assert_eq!(gauges.activations(), 0);
        assert_eq!(gauges.activities(), 0);
        assert_eq!(gauges.running_workflows(), 0);
        assert!(gauges.is_idle());
    }

    #[test]
    fn incr_decr_round_trips() {
        let gauges = InFlightGauges::new();
        gauges.incr_activations();
        gauges.incr_activations();
        assert_eq!(gauges.activations(), 2);
        assert!(!gauges.is_idle());
        gauges.decr_activations();
        gauges.decr_activations();
        assert!(gauges.is_idle());
    }

    #[test]
    fn double_decrement_goes_negative_instead_of_wrapping() {
        let gauges = InFlightGauges::new();
        gauges.decr_activities();
        gauges.decr_activities();
        assert_eq!(gauges.activities(), -2);
    }
}
