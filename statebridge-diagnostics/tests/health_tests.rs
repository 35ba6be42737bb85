use statebridge_bus::{BusConfig, EventBus};
use statebridge_diagnostics::{
    ComponentRegistry, DiagnosticsConfig, HealthMonitor, HealthStatus, LogBuffer, Logger,
    MemoryProbe, MemoryTrend, StatusUpdate,
};
use statebridge_types::{BridgeError, ErrorCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed sequence of readings, then repeats the last one.
struct ScriptedProbe {
    readings: Mutex<VecDeque<u64>>,
    last: Mutex<Option<u64>>,
}

impl ScriptedProbe {
    fn new(readings: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            readings: Mutex::new(readings.iter().copied().collect()),
            last: Mutex::new(None),
        })
    }
}

impl MemoryProbe for ScriptedProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let next = self.readings.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if next.is_some() {
            *last = next;
        }
        *last
    }
}

struct Unavailable;

impl MemoryProbe for Unavailable {
    fn resident_bytes(&self) -> Option<u64> {
        None
    }
}

fn config() -> DiagnosticsConfig {
    DiagnosticsConfig {
        health_check_interval_ms: 1_000,
        memory_sample_interval_ms: 1_000,
        memory_window: 3,
        memory_growth_threshold: 1_000,
        ..DiagnosticsConfig::default()
    }
}

fn monitor(probe: Arc<dyn MemoryProbe>) -> (EventBus, Arc<ComponentRegistry>, HealthMonitor) {
    let bus = EventBus::new(BusConfig::default()).unwrap();
    let registry = Arc::new(ComponentRegistry::new(
        bus.clone(),
        Logger::new("bridge:registry", LogBuffer::new(10)),
    ));
    let monitor = HealthMonitor::new(config(), registry.clone(), bus.clone(), probe);
    (bus, registry, monitor)
}

fn count(bus: &EventBus, name: &str) -> usize {
    bus.history().iter().filter(|r| r.name == name).count()
}

// ── Memory trend ─────────────────────────────────────────────────

#[test]
fn trend_needs_a_full_window() {
    let mut trend = MemoryTrend::new(3);
    trend.push(100);
    trend.push(5_000);
    assert_eq!(trend.growth(), 4_900);
    assert_eq!(trend.exceeds(1_000), None);

    trend.push(6_000);
    assert_eq!(trend.exceeds(1_000), Some(5_900));
    trend.push(6_100);
    assert_eq!(trend.growth(), 1_100);
    assert_eq!(trend.samples().len(), 3);
}

#[test]
fn shrinking_memory_is_zero_growth() {
    let mut trend = MemoryTrend::new(2);
    trend.push(9_000);
    trend.push(1_000);
    assert_eq!(trend.growth(), 0);
}

// ── Probe-driven warnings ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn steady_growth_raises_one_warning_per_window() {
    let (bus, _registry, monitor) = monitor(ScriptedProbe::new(&[1_000, 1_600, 2_200, 2_300]));

    monitor.sample_memory_now();
    monitor.sample_memory_now();
    assert_eq!(count(&bus, "bridge:memoryWarning"), 0);

    monitor.sample_memory_now();
    assert_eq!(count(&bus, "bridge:memoryWarning"), 1);

    // The window restarts after a warning.
    monitor.sample_memory_now();
    assert_eq!(count(&bus, "bridge:memoryWarning"), 1);
    assert_eq!(monitor.memory_samples().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn flat_memory_never_warns() {
    let (bus, _registry, monitor) = monitor(ScriptedProbe::new(&[5_000, 5_100, 5_200, 5_000]));
    for _ in 0..4 {
        monitor.sample_memory_now();
    }
    assert_eq!(count(&bus, "bridge:memoryWarning"), 0);
}

#[tokio::test(start_paused = true)]
async fn unreadable_probe_is_skipped() {
    let (_bus, _registry, monitor) = monitor(Arc::new(Unavailable));
    assert!(monitor.sample_memory_now().is_none());
    assert!(monitor.memory_samples().is_empty());
}

// ── Health loop ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn check_now_reports_worst_status() {
    let (_bus, registry, monitor) = monitor(Arc::new(Unavailable));
    registry.register_component("identity", HealthStatus::Healthy);
    registry.update_status(
        "sessions",
        StatusUpdate::degraded(BridgeError::new(ErrorCode::SyncFailed, "retrying")),
    );

    let report = monitor.check_now();
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.components.len(), 2);
    assert_eq!(report.components["sessions"], HealthStatus::Degraded);
}

#[tokio::test(start_paused = true)]
async fn loop_reports_on_every_interval_until_stopped() {
    let (bus, _registry, monitor) = monitor(Arc::new(Unavailable));
    monitor.start();
    monitor.start();
    assert!(monitor.is_running());

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(count(&bus, "bridge:health"), 3);

    monitor.stop();
    assert!(!monitor.is_running());
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(count(&bus, "bridge:health"), 3);
}

#[tokio::test(start_paused = true)]
async fn loop_samples_memory() {
    let (bus, _registry, monitor) = monitor(ScriptedProbe::new(&[1_000, 2_000, 3_000]));
    monitor.start();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(count(&bus, "bridge:memoryWarning"), 1);
    monitor.stop();
}
