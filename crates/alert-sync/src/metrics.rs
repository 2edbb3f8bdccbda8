//! Operational counters.
//!
//! Components receive an `Arc<dyn MetricsRecorder>` at construction, so
//! tests get isolated counters and there is no process-global state.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything we count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    /// Inbound alert events accepted for processing
    AlertsReceived,
    /// Chat messages created for new alerts
    MessagesCreated,
    /// Chat messages updated in place
    MessagesUpdated,
    /// Re-fires of an already tracked alert
    AlertsRefired,
    /// Alerts resolved and untracked
    AlertsResolved,
    /// Resolve events for alerts we never tracked
    ResolvesIgnored,
    /// Backend lookups that failed and were skipped
    EnrichmentLookupFailures,
    /// Assignee lookups that had to be retried
    AssigneeRetries,
    /// Button presses accepted
    CallbacksAccepted,
    /// Button presses rejected in the immediate phase
    CallbacksRejected,
    /// Background phases that finished
    CallbacksCompleted,
    /// Background phases that hit the time limit
    CallbacksTimedOut,
    /// Individual background sub-steps that failed
    CallbackStepFailures,
    /// Reconciler cycles run
    PollCycles,
    /// Assignee drifts repaired by the reconciler
    DriftsRepaired,
    /// Tracked posts the reconciler failed to process
    PollFailures,
}

/// Sink for counters.
pub trait MetricsRecorder: Send + Sync {
    /// Add one to `counter`.
    fn increment(&self, counter: Counter);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn increment(&self, _counter: Counter) {}
}

/// Thread-safe in-memory counters, exposed on `/metrics`.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: DashMap<Counter, u64>,
}

impl InMemoryMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `counter`.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters.get(&counter).map_or(0, |v| *v)
    }

    /// Ordered copy of all non-zero counters.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Counter, u64> {
        self.counters
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn increment(&self, counter: Counter) {
        *self.counters.entry(counter).or_insert(0) += 1;
    }
}
