use statebridge_bus::{BusConfig, EventBus};
use statebridge_diagnostics::{PerfTracker, SlowOperation};
use statebridge_types::Event;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn tracker(window: usize) -> (EventBus, PerfTracker) {
    let bus = EventBus::new(BusConfig::default()).unwrap();
    let tracker = PerfTracker::new(window, Duration::from_secs(1), bus.clone());
    (bus, tracker)
}

#[tokio::test]
async fn stats_summarize_the_window() {
    let (_bus, perf) = tracker(3);
    for ms in [10, 20, 30, 40] {
        perf.record("session.create", Duration::from_millis(ms));
    }

    let stats = perf.stats("session.create").unwrap();
    assert_eq!(stats.count, 4);
    assert_eq!(stats.slow_count, 0);
    assert!((stats.avg_ms - 30.0).abs() < 1e-6);
    assert!((stats.max_ms - 40.0).abs() < 1e-6);
    assert!((stats.last_ms - 40.0).abs() < 1e-6);
    assert!(perf.stats("unknown").is_none());
}

#[tokio::test]
async fn slow_calls_are_published() {
    let (bus, perf) = tracker(10);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    bus.on(move |e: &Event<SlowOperation>| s.lock().unwrap().push(e.payload().clone()));

    perf.record("auth.login", Duration::from_millis(200));
    perf.record("auth.login", Duration::from_millis(1_500));
    bus.flush();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].operation, "auth.login");
    assert_eq!(seen[0].duration_ms, 1_500);
    assert_eq!(seen[0].threshold_ms, 1_000);
    assert_eq!(perf.stats("auth.login").unwrap().slow_count, 1);
}

#[tokio::test(start_paused = true)]
async fn measure_times_the_future() {
    let (bus, perf) = tracker(10);
    let value = perf
        .measure("ui.setTheme", async {
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            7
        })
        .await;

    assert_eq!(value, 7);
    let stats = perf.stats("ui.setTheme").unwrap();
    assert!(stats.last_ms >= 1_200.0);
    assert_eq!(stats.slow_count, 1);
    assert!(bus.history().iter().any(|r| r.name == "bridge:slowOperation"));
}

#[tokio::test]
async fn snapshot_is_ordered_by_name() {
    let (_bus, perf) = tracker(5);
    perf.record("b", Duration::from_millis(1));
    perf.record("a", Duration::from_millis(1));
    let names: Vec<String> = perf.snapshot().into_keys().collect();
    assert_eq!(names, vec!["a", "b"]);

    perf.clear();
    assert!(perf.snapshot().is_empty());
}
