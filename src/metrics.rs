//! Per-operation measurement collection.
//!
//! Handlers report one [`OperationRecord`] per operation, whatever its
//! fate. The sink is fire-and-forget: recording never blocks the handler
//! behind anything slower than a short mutex and never fails. Swap in
//! [`NullMetrics`] to measure nothing, or [`InMemoryMetrics`] for the
//! aggregate counters the run report is built from.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::time::Time;
use crate::workload::OperationType;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// What ultimately happened to one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    /// Executed and returned success.
    Succeeded,
    /// Executed and returned an error.
    Failed,
    /// Never executed: a gate failed or the run shut down first.
    NotExecuted,
}

/// One operation's measured lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// The operation's type code.
    pub op_type: OperationType,
    /// When the workload wanted it to start.
    pub scheduled_start: Time,
    /// When execution actually began, when it did.
    pub actual_start: Option<Time>,
    /// When execution finished, when it did.
    pub finished: Option<Time>,
    /// Final outcome.
    pub outcome: OperationOutcome,
}

/// Sink for operation records. Implementations must not block or panic.
pub trait MetricsSink: Send + Sync {
    /// Accepts one finished operation's record.
    fn record(&self, record: OperationRecord);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn record(&self, _record: OperationRecord) {}
}

// ---------------------------------------------------------------------------
// In-memory aggregation
// ---------------------------------------------------------------------------

/// Aggregating sink: outcome counts, latency sum and max, worst start
/// delay, and per-type counts.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    succeeded: AtomicU64,
    failed: AtomicU64,
    not_executed: AtomicU64,
    latency_samples: AtomicU64,
    latency_sum_nanos: AtomicU64,
    latency_max_nanos: AtomicU64,
    start_delay_max_nanos: AtomicU64,
    per_type: Mutex<BTreeMap<OperationType, u64>>,
}

impl InMemoryMetrics {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the aggregates.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            not_executed: self.not_executed.load(Ordering::Relaxed),
            latency_samples: self.latency_samples.load(Ordering::Relaxed),
            latency_sum_nanos: self.latency_sum_nanos.load(Ordering::Relaxed),
            latency_max_nanos: self.latency_max_nanos.load(Ordering::Relaxed),
            start_delay_max_nanos: self.start_delay_max_nanos.load(Ordering::Relaxed),
            per_type: self.per_type.lock().clone(),
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, record: OperationRecord) {
        let counter = match record.outcome {
            OperationOutcome::Succeeded => &self.succeeded,
            OperationOutcome::Failed => &self.failed,
            OperationOutcome::NotExecuted => &self.not_executed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let (Some(start), Some(end)) = (record.actual_start, record.finished) {
            let nanos = end.as_nanos().saturating_sub(start.as_nanos());
            self.latency_samples.fetch_add(1, Ordering::Relaxed);
            self.latency_sum_nanos.fetch_add(nanos, Ordering::Relaxed);
            self.latency_max_nanos.fetch_max(nanos, Ordering::Relaxed);
        }
        if let Some(start) = record.actual_start {
            let delay = start
                .as_nanos()
                .saturating_sub(record.scheduled_start.as_nanos());
            self.start_delay_max_nanos.fetch_max(delay, Ordering::Relaxed);
        }

        *self.per_type.lock().entry(record.op_type).or_insert(0) += 1;
    }
}

/// Copy of [`InMemoryMetrics`]' aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Operations that executed and succeeded.
    pub succeeded: u64,
    /// Operations that executed and failed.
    pub failed: u64,
    /// Operations that never executed.
    pub not_executed: u64,
    /// Records carrying both a start and a finish time.
    pub latency_samples: u64,
    /// Summed execution latency over those samples, in nanoseconds.
    pub latency_sum_nanos: u64,
    /// Worst execution latency, in nanoseconds.
    pub latency_max_nanos: u64,
    /// Worst delay between scheduled and actual start, in nanoseconds.
    pub start_delay_max_nanos: u64,
    /// Records per operation type, whatever the outcome.
    pub per_type: BTreeMap<OperationType, u64>,
}

impl MetricsSnapshot {
    /// Records seen in total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed + self.not_executed
    }

    /// Mean execution latency in nanoseconds, `None` before any sample.
    #[must_use]
    pub fn mean_latency_nanos(&self) -> Option<u64> {
        (self.latency_samples > 0).then(|| self.latency_sum_nanos / self.latency_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        op_type: u32,
        scheduled: u64,
        started: Option<u64>,
        finished: Option<u64>,
        outcome: OperationOutcome,
    ) -> OperationRecord {
        OperationRecord {
            op_type: OperationType::new(op_type),
            scheduled_start: Time::from_nanos(scheduled),
            actual_start: started.map(Time::from_nanos),
            finished: finished.map(Time::from_nanos),
            outcome,
        }
    }

    #[test]
    fn aggregates_outcomes_and_latencies() {
        let metrics = InMemoryMetrics::new();
        metrics.record(record(1, 100, Some(110), Some(130), OperationOutcome::Succeeded));
        metrics.record(record(1, 200, Some(200), Some(260), OperationOutcome::Failed));
        metrics.record(record(2, 300, None, None, OperationOutcome::NotExecuted));

        let snap = metrics.snapshot();
        assert_eq!(snap.succeeded, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.not_executed, 1);
        assert_eq!(snap.total(), 3);
        assert_eq!(snap.latency_samples, 2);
        assert_eq!(snap.latency_sum_nanos, 20 + 60);
        assert_eq!(snap.latency_max_nanos, 60);
        assert_eq!(snap.start_delay_max_nanos, 10);
        assert_eq!(snap.mean_latency_nanos(), Some(40));
        assert_eq!(snap.per_type[&OperationType::new(1)], 2);
        assert_eq!(snap.per_type[&OperationType::new(2)], 1);
    }

    #[test]
    fn empty_sink_has_no_mean() {
        let snap = InMemoryMetrics::new().snapshot();
        assert_eq!(snap.total(), 0);
        assert_eq!(snap.mean_latency_nanos(), None);
    }

    #[test]
    fn early_start_is_not_a_delay() {
        let metrics = InMemoryMetrics::new();
        // Started ahead of schedule (within tolerance): delay clamps to zero.
        metrics.record(record(1, 100, Some(90), Some(95), OperationOutcome::Succeeded));
        assert_eq!(metrics.snapshot().start_delay_max_nanos, 0);
    }

    #[test]
    fn null_sink_accepts_everything() {
        NullMetrics.record(record(1, 0, None, None, OperationOutcome::NotExecuted));
    }
}
