//! Turn-level metrics: plain atomics, no exporter, no labels — just
//! counters a health endpoint could read.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    turns_processed: AtomicU64,
    flows_started: AtomicU64,
    flows_completed: AtomicU64,
    flows_errored: AtomicU64,
    flows_cancelled: AtomicU64,
    subgraph_iterations_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_turn(&self) {
        self.turns_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flow_started(&self) {
        self.flows_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flow_outcome(&self, outcome: dialogue_core::FlowOutcome) {
        use dialogue_core::FlowOutcome;
        let counter = match outcome {
            FlowOutcome::Completed => &self.flows_completed,
            FlowOutcome::Error => &self.flows_errored,
            FlowOutcome::Cancelled => &self.flows_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subgraph_iterations(&self, count: u64) {
        self.subgraph_iterations_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            turns_processed: self.turns_processed.load(Ordering::Relaxed),
            flows_started: self.flows_started.load(Ordering::Relaxed),
            flows_completed: self.flows_completed.load(Ordering::Relaxed),
            flows_errored: self.flows_errored.load(Ordering::Relaxed),
            flows_cancelled: self.flows_cancelled.load(Ordering::Relaxed),
            subgraph_iterations_total: self.subgraph_iterations_total.load(Ordering::Relaxed),
        }
    }
}

/// Wires this counter set into `dialogue-core`'s flow-lifecycle hooks
/// (`Orchestrator::with_observer`) so `record_flow_started`/
/// `record_flow_outcome`/`record_subgraph_iterations` get called from the
/// turn pipeline instead of sitting dead.
impl dialogue_core::TurnObserver for Metrics {
    fn flow_started(&self) {
        self.record_flow_started();
    }

    fn flow_outcome(&self, outcome: dialogue_core::FlowOutcome) {
        self.record_flow_outcome(outcome);
    }

    fn subgraph_iterations(&self, count: u64) {
        self.record_subgraph_iterations(count);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub turns_processed: u64,
    pub flows_started: u64,
    pub flows_completed: u64,
    pub flows_errored: u64,
    pub flows_cancelled: u64,
    pub subgraph_iterations_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialogue_core::FlowOutcome;

    #[test]
    fn counters_start_at_zero() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.turns_processed, 0);
    }

    #[test]
    fn recording_increments_the_right_counters() {
        let metrics = Metrics::new();
        metrics.record_turn();
        metrics.record_turn();
        metrics.record_flow_started();
        metrics.record_flow_outcome(FlowOutcome::Completed);
        metrics.record_flow_outcome(FlowOutcome::Error);
        metrics.record_subgraph_iterations(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.turns_processed, 2);
        assert_eq!(snapshot.flows_started, 1);
        assert_eq!(snapshot.flows_completed, 1);
        assert_eq!(snapshot.flows_errored, 1);
        assert_eq!(snapshot.subgraph_iterations_total, 4);
    }
}
