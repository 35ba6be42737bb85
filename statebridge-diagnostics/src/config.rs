//! Diagnostics configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for health checks, memory sampling and performance tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Interval (ms) between aggregate health reports.
    pub health_check_interval_ms: u64,
    /// Interval (ms) between memory samples.
    pub memory_sample_interval_ms: u64,
    /// Samples kept in the memory trend window.
    pub memory_window: usize,
    /// Growth (bytes) across a full window that triggers a warning.
    pub memory_growth_threshold: u64,
    /// Latency samples kept per operation.
    pub perf_window: usize,
    /// Duration (ms) above which an operation is reported as slow.
    pub slow_operation_threshold_ms: u64,
    /// Recent log entries kept for reports.
    pub log_buffer_size: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: 30_000,
            memory_sample_interval_ms: 10_000,
            memory_window: 6,
            memory_growth_threshold: 50 * 1024 * 1024,
            perf_window: 50,
            slow_operation_threshold_ms: 1_000,
            log_buffer_size: 200,
        }
    }
}

impl DiagnosticsConfig {
    /// Period of the health loop.
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms.max(1))
    }

    /// Period of the memory probe.
    #[must_use]
    pub fn memory_sample_interval(&self) -> Duration {
        Duration::from_millis(self.memory_sample_interval_ms.max(1))
    }

    /// Latency above which an operation is reported as slow.
    #[must_use]
    pub fn slow_operation_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_operation_threshold_ms)
    }
}
