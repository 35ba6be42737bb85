//! Per-operation latency tracking.

use crate::events::SlowOperation;
use serde::Serialize;
use statebridge_bus::EventBus;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Default)]
struct OperationWindow {
    samples: VecDeque<Duration>,
    total: u64,
    slow: u64,
}

/// Summary of one operation's recent latencies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    /// Calls recorded since the tracker was created.
    pub count: u64,
    /// Calls above the slow threshold since the tracker was created.
    pub slow_count: u64,
    /// Mean over the window.
    pub avg_ms: f64,
    /// Maximum over the window.
    pub max_ms: f64,
    pub last_ms: f64,
}

/// Rolling latency window per operation name. Calls slower than the
/// threshold are logged and published as `bridge:slowOperation`.
pub struct PerfTracker {
    operations: Mutex<HashMap<String, OperationWindow>>,
    window: usize,
    threshold: Duration,
    bus: EventBus,
}

impl PerfTracker {
    /// Keeps the last `window` latencies per operation and warns above
    /// `threshold`.
    #[must_use]
    pub fn new(window: usize, threshold: Duration, bus: EventBus) -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            window: window.max(1),
            threshold,
            bus,
        }
    }

    /// Records one call.
    pub fn record(&self, operation: &str, elapsed: Duration) {
        {
            let mut operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = operations.entry(operation.to_string()).or_default();
            while entry.samples.len() >= self.window {
                entry.samples.pop_front();
            }
            entry.samples.push_back(elapsed);
            entry.total += 1;
            if elapsed > self.threshold {
                entry.slow += 1;
            }
        }

        if elapsed > self.threshold {
            let duration_ms = elapsed.as_millis() as u64;
            let threshold_ms = self.threshold.as_millis() as u64;
            warn!(operation, duration_ms, threshold_ms, "slow operation");
            self.bus.emit(SlowOperation {
                operation: operation.to_string(),
                duration_ms,
                threshold_ms,
            });
        }
    }

    /// Awaits `fut` and records how long it took.
    pub async fn measure<F, T>(&self, operation: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        self.record(operation, started.elapsed());
        output
    }

    /// Window statistics for one operation.
    #[must_use]
    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        let operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
        operations.get(operation).map(summarize)
    }

    /// Stats for every recorded operation, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
        let operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
        operations
            .iter()
            .map(|(name, window)| (name.clone(), summarize(window)))
            .collect()
    }

    /// The slow-operation threshold.
    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Forgets every recorded latency.
    pub fn clear(&self) {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn summarize(window: &OperationWindow) -> OperationStats {
    let ms = |d: &Duration| d.as_secs_f64() * 1000.0;
    let n = window.samples.len();
    let sum: f64 = window.samples.iter().map(ms).sum();
    OperationStats {
        count: window.total,
        slow_count: window.slow,
        avg_ms: if n == 0 { 0.0 } else { sum / n as f64 },
        max_ms: window.samples.iter().map(ms).fold(0.0, f64::max),
        last_ms: window.samples.back().map(ms).unwrap_or(0.0),
    }
}
