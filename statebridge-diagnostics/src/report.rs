//! The diagnostics hub and its serializable report.

use crate::config::DiagnosticsConfig;
use crate::health::HealthMonitor;
use crate::logging::{LogBuffer, LogEntry, Logger};
use crate::memory::{MemoryProbe, MemorySample, StatmProbe};
use crate::perf::{OperationStats, PerfTracker};
use crate::registry::{ComponentRegistry, ComponentStatus, HealthStatus};
use serde::Serialize;
use statebridge_bus::{BusStats, EventBus, Subscription};
use statebridge_types::Timestamp;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Point-in-time view of the bridge's health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub generated_at: Timestamp,
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentStatus>,
    pub bus: BusStats,
    /// Dispatched events per event name, as observed by the traffic tap.
    pub traffic: BTreeMap<String, u64>,
    pub recent_logs: Vec<LogEntry>,
    pub memory: Vec<MemorySample>,
    pub performance: BTreeMap<String, OperationStats>,
}

/// Owns the registry, monitor, perf tracker and log buffer for one bus.
pub struct Diagnostics {
    bus: EventBus,
    logs: LogBuffer,
    logger: Logger,
    registry: Arc<ComponentRegistry>,
    monitor: HealthMonitor,
    perf: Arc<PerfTracker>,
    traffic: Arc<Mutex<BTreeMap<String, u64>>>,
    tap: Subscription,
}

impl Diagnostics {
    /// Diagnostics reading memory from `/proc/self/statm`.
    pub fn new(config: DiagnosticsConfig, bus: EventBus) -> Self {
        Self::with_probe(config, bus, Arc::new(StatmProbe::new()))
    }

    /// Like `new`, with a custom memory probe.
    #[must_use]
    pub fn with_probe(config: DiagnosticsConfig, bus: EventBus, probe: Arc<dyn MemoryProbe>) -> Self {
        let logs = LogBuffer::new(config.log_buffer_size);
        let logger = Logger::new("bridge", logs.clone());
        let registry = Arc::new(ComponentRegistry::new(bus.clone(), logger.child("registry")));
        let perf = Arc::new(PerfTracker::new(
            config.perf_window,
            config.slow_operation_threshold(),
            bus.clone(),
        ));
        let monitor = HealthMonitor::new(config, registry.clone(), bus.clone(), probe);

        let traffic = Arc::new(Mutex::new(BTreeMap::new()));
        let counts = traffic.clone();
        let tap = bus.on_any(move |record| {
            let mut counts = counts.lock().unwrap_or_else(PoisonError::into_inner);
            *counts.entry(record.name.clone()).or_insert(0) += 1;
        });

        Self {
            bus,
            logs,
            logger,
            registry,
            monitor,
            perf,
            traffic,
            tap,
        }
    }

    /// Starts the periodic health and memory loops.
    pub fn start(&self) {
        self.monitor.start();
    }

    /// Stops the loops and detaches the traffic tap.
    pub fn stop(&self) {
        self.monitor.stop();
        self.tap.unsubscribe();
    }

    /// Component statuses.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Operation latencies.
    #[must_use]
    pub fn perf(&self) -> &Arc<PerfTracker> {
        &self.perf
    }

    /// The health and memory loops.
    #[must_use]
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Recent log entries of every logger made by this hub.
    #[must_use]
    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    /// A logger under `"bridge:<namespace>"` that writes into the report buffer.
    pub fn logger(&self, namespace: &str) -> Logger {
        self.logger.child(namespace)
    }

    /// Worst status across components.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.registry.aggregate()
    }

    /// Snapshot of everything above plus bus stats.
    #[must_use]
    pub fn report(&self) -> DiagnosticsReport {
        DiagnosticsReport {
            generated_at: Timestamp::now(),
            status: self.registry.aggregate(),
            components: self.registry.all(),
            bus: self.bus.stats(),
            traffic: self
                .traffic
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            recent_logs: self.logs.recent(),
            memory: self.monitor.memory_samples(),
            performance: self.perf.snapshot(),
        }
    }
}
