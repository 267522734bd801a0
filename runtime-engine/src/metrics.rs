//! Pluggable, counter-keyed metrics for the controller engine.
//!
//! Grounded on `kube-runtime/src/metrics.rs`'s shape (a plain struct of
//! shared counters behind a lock), generalized from a single scheduler
//! gauge to per-controller counters.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

/// Counters tracked for a single registered controller.
#[derive(Default, Debug, Clone, Copy)]
pub struct ControllerCounters {
    /// Number of completed reconcile cycles.
    pub reconcile_cycles: u64,
    /// Number of input items reconciled across all cycles.
    pub input_items_reconciled: u64,
    /// Cumulative time spent actively reconciling, in seconds.
    pub busy_seconds: f64,
    /// Number of times the controller's adapter was woken.
    pub wake_ups: u64,
}

/// Shared metrics surface for a `ControllerEngine`.
///
/// Cloning an `EngineMetrics` shares the same underlying counters; this is
/// the handle a `ControllerEngine` and every controller adapter hold.
#[derive(Default, Clone)]
pub struct EngineMetrics {
    inner: Arc<RwLock<HashMap<String, ControllerCounters>>>,
}

impl EngineMetrics {
    /// Fetch a point-in-time copy of one controller's counters.
    #[must_use]
    pub fn snapshot(&self, controller: &str) -> ControllerCounters {
        self.inner.read().get(controller).copied().unwrap_or_default()
    }

    /// Record a wake-up (the adapter's `EventCh` fired).
    pub fn record_wake_up(&self, controller: &str) {
        self.inner.write().entry(controller.to_string()).or_default().wake_ups += 1;
    }

    /// Record a completed reconcile cycle.
    pub fn record_cycle(&self, controller: &str, items_reconciled: u64, busy_seconds: f64) {
        let mut guard = self.inner.write();
        let entry = guard.entry(controller.to_string()).or_default();
        entry.reconcile_cycles += 1;
        entry.input_items_reconciled += items_reconciled;
        entry.busy_seconds += busy_seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::EngineMetrics;

    #[test]
    fn counters_accumulate_per_controller() {
        let metrics = EngineMetrics::default();
        metrics.record_wake_up("a");
        metrics.record_cycle("a", 3, 0.5);
        metrics.record_cycle("a", 2, 0.25);
        metrics.record_wake_up("b");

        let a = metrics.snapshot("a");
        assert_eq!(a.wake_ups, 1);
        assert_eq!(a.reconcile_cycles, 2);
        assert_eq!(a.input_items_reconciled, 5);
        assert!((a.busy_seconds - 0.75).abs() < f64::EPSILON);

        let b = metrics.snapshot("b");
        assert_eq!(b.wake_ups, 1);
        assert_eq!(b.reconcile_cycles, 0);
    }
}
