//! Periodic health checks and memory sampling.

use crate::config::DiagnosticsConfig;
use crate::events::{HealthReport, MemoryWarning};
use crate::memory::{MemoryProbe, MemorySample, MemoryTrend};
use crate::registry::ComponentRegistry;
use statebridge_bus::EventBus;
use statebridge_types::Timestamp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct MonitorInner {
    config: DiagnosticsConfig,
    registry: Arc<ComponentRegistry>,
    bus: EventBus,
    probe: Arc<dyn MemoryProbe>,
    trend: Mutex<MemoryTrend>,
}

impl MonitorInner {
    fn check(&self) -> HealthReport {
        let components = self
            .registry
            .all()
            .into_iter()
            .map(|(name, status)| (name, status.status))
            .collect();
        let report = HealthReport {
            status: self.registry.aggregate(),
            components,
            checked_at: Timestamp::now(),
        };
        debug!(status = %report.status, components = report.components.len(), "health check");
        self.bus.emit(report.clone());
        report
    }

    fn sample(&self) -> Option<MemorySample> {
        let bytes = self.probe.resident_bytes()?;
        let warning = {
            let mut trend = self.trend.lock().unwrap_or_else(PoisonError::into_inner);
            trend.push(bytes);
            let warning = trend
                .exceeds(self.config.memory_growth_threshold)
                .map(|growth| MemoryWarning {
                    growth_bytes: growth,
                    threshold_bytes: self.config.memory_growth_threshold,
                    current_bytes: bytes,
                    window: trend.window(),
                });
            if warning.is_some() {
                trend.restart();
            }
            warning
        };
        if let Some(warning) = warning {
            warn!(
                growth_bytes = warning.growth_bytes,
                current_bytes = warning.current_bytes,
                "memory growth over window exceeds threshold"
            );
            self.bus.emit(warning);
        }
        Some(MemorySample {
            timestamp: Timestamp::now(),
            resident_bytes: bytes,
        })
    }
}

/// Runs the health-check loop and the memory probe as two independent tasks.
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Creates a stopped monitor. Call `start` to spawn its loops.
    #[must_use]
    pub fn new(
        config: DiagnosticsConfig,
        registry: Arc<ComponentRegistry>,
        bus: EventBus,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let trend = MemoryTrend::new(config.memory_window);
        Self {
            inner: Arc::new(MonitorInner {
                config,
                registry,
                bus,
                probe,
                trend: Mutex::new(trend),
            }),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns both loops on the current runtime. No-op if already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let health_every = self.inner.config.health_check_interval();
        let memory_every = self.inner.config.memory_sample_interval();
        let health = spawn_loop(
            Arc::downgrade(&self.inner),
            self.running.clone(),
            health_every,
            |inner| {
                inner.check();
            },
        );
        let memory = spawn_loop(
            Arc::downgrade(&self.inner),
            self.running.clone(),
            memory_every,
            |inner| {
                inner.sample();
            },
        );
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(health);
        tasks.push(memory);
        info!(
            health_ms = health_every.as_millis() as u64,
            memory_ms = memory_every.as_millis() as u64,
            "health monitor started"
        );
    }

    /// Aborts both loops. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
        info!("health monitor stopped");
    }

    /// Whether the loops are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Computes and publishes the aggregate status now.
    pub fn check_now(&self) -> HealthReport {
        self.inner.check()
    }

    /// Takes one memory sample now. `None` if the probe could not read.
    pub fn sample_memory_now(&self) -> Option<MemorySample> {
        self.inner.sample()
    }

    /// Samples currently in the memory window.
    pub fn memory_samples(&self) -> Vec<MemorySample> {
        self.inner
            .trend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .samples()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_loop(
    inner: Weak<MonitorInner>,
    running: Arc<AtomicBool>,
    period: Duration,
    tick: fn(&MonitorInner),
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            let Some(inner) = inner.upgrade() else {
                break;
            };
            tick(&inner);
        }
    })
}
