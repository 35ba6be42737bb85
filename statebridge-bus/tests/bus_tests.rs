mod common;

use common::{bus_with, record_all, Created, Log, Login, Theme, Tick};
use pretty_assertions::assert_eq;
use statebridge_bus::{BusConfig, BusError, EventBus, WILDCARD};
use statebridge_types::{EmitOptions, Event, Priority};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_outside_runtime_fails() {
    let result = EventBus::new(BusConfig::default());
    assert!(matches!(result, Err(BusError::NoRuntime(_))));
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
    let result = EventBus::new(BusConfig {
        max_batch_size: 0,
        ..BusConfig::default()
    });
    assert!(matches!(result, Err(BusError::InvalidConfig(_))));
}

#[tokio::test]
async fn default_config_values() {
    let bus = EventBus::new(BusConfig::default()).unwrap();
    assert_eq!(bus.config().max_batch_size, 100);
    assert_eq!(bus.config().batch_timeout_ms, 50);
    assert_eq!(bus.config().history_size, 100);
}

// ── Immediate dispatch ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn high_priority_is_delivered_before_emit_returns() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    bus.emit(Login(1));
    assert_eq!(log.entries(), vec!["login1"]);

    bus.emit(Theme("dark".into()));
    assert_eq!(log.entries(), vec!["login1", "theme:dark"]);
    assert_eq!(bus.queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn emit_without_listeners_is_recorded_but_not_delivered() {
    let bus = bus_with(100, 50);
    bus.emit(Login(7));
    bus.emit(Created(1));
    advance(60).await;

    let names: Vec<String> = bus.history().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["auth:login", "session:created"]);
    assert_eq!(bus.stats().handler_failures, 0);
}

// ── Batching ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn normal_events_wait_for_the_batch_timeout() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    bus.emit(Created(1));
    bus.emit(Created(2));
    assert_eq!(log.len(), 0);
    assert_eq!(bus.queued(), 2);

    advance(20).await;
    assert_eq!(log.len(), 0);

    advance(40).await;
    assert_eq!(log.entries(), vec!["c1", "c2"]);
    assert_eq!(bus.stats().batches, 1);
}

#[tokio::test(start_paused = true)]
async fn burst_is_split_into_bounded_batches() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    for i in 0..250 {
        bus.emit(Created(i));
    }
    // Two full batches went out synchronously; the remainder waits.
    assert_eq!(log.len(), 200);
    assert_eq!(bus.stats().batches, 2);
    assert_eq!(bus.queued(), 50);

    advance(60).await;
    assert_eq!(log.len(), 250);
    assert_eq!(bus.stats().batches, 3);

    let expected: Vec<String> = (0..250).map(|i| format!("c{i}")).collect();
    assert_eq!(log.entries(), expected);
}

#[tokio::test(start_paused = true)]
async fn high_priority_overtakes_queued_normal_events() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    for i in 0..5 {
        bus.emit(Created(i));
    }
    bus.emit(Login(1));
    assert_eq!(log.entries(), vec!["login1"]);

    advance(60).await;
    assert_eq!(log.entries(), vec!["login1", "c0", "c1", "c2", "c3", "c4"]);
}

#[tokio::test(start_paused = true)]
async fn flush_orders_by_priority_then_arrival() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    bus.emit(Tick(1));
    bus.emit(Created(1));
    bus.emit(Tick(2));
    bus.emit(Created(2));
    bus.flush();

    assert_eq!(log.entries(), vec!["c1", "c2", "t1", "t2"]);
}

#[tokio::test(start_paused = true)]
async fn priority_override_changes_dispatch_path() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    bus.emit_with(
        Created(9),
        EmitOptions::default().with_priority(Priority::High),
    );
    assert_eq!(log.entries(), vec!["c9"]);

    bus.emit_with(Login(2), EmitOptions::default().with_priority(Priority::Low));
    assert_eq!(log.entries(), vec!["c9"]);
    advance(60).await;
    assert_eq!(log.entries(), vec!["c9", "login2"]);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_cancels_the_pending_timer() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    bus.emit(Created(1));
    bus.flush();
    assert_eq!(log.len(), 1);

    advance(100).await;
    assert_eq!(log.len(), 1);
    assert_eq!(bus.stats().batches, 1);
}

// ── Re-entrancy ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn high_priority_emitted_from_a_handler_waits_for_the_cycle() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    let inner = bus.clone();
    bus.on(move |e: &Event<Created>| {
        if e.payload().0 == 1 {
            inner.emit(Login(1));
        }
    });

    bus.emit(Created(1));
    bus.emit(Created(2));
    bus.flush();

    assert_eq!(log.entries(), vec!["c1", "c2", "login1"]);
    assert_eq!(bus.queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn normal_emitted_from_a_handler_is_batched() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    let inner = bus.clone();
    bus.on(move |_: &Event<Login>| inner.emit(Created(42)));

    bus.emit(Login(1));
    assert_eq!(log.entries(), vec!["login1"]);
    assert_eq!(bus.queued(), 1);

    advance(60).await;
    assert_eq!(log.entries(), vec!["login1", "c42"]);
}

// ── Subscriptions ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn listeners_run_in_registration_order() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    for tag in ["a", "b", "c"] {
        let l = log.clone();
        bus.on(move |_: &Event<Login>| l.push(tag));
    }
    bus.emit(Login(1));
    assert_eq!(log.entries(), vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn once_fires_a_single_time() {
    let bus = bus_with(100, 50);
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let sub = bus.once(move |_: &Event<Login>| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    bus.emit(Login(1));
    bus.emit(Login(2));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!sub.is_active());
    assert!(!bus.has_listeners("auth:login"));
}

#[tokio::test(start_paused = true)]
async fn paused_once_listener_survives_until_it_fires() {
    let bus = bus_with(100, 50);
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let sub = bus.once(move |_: &Event<Login>| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    sub.pause();
    bus.emit(Login(1));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(bus.listener_count("auth:login"), 1);

    sub.resume();
    bus.emit(Login(2));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.listener_count("auth:login"), 0);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_is_idempotent_and_frees_the_bucket() {
    let bus = bus_with(100, 50);
    let a = bus.on(|_: &Event<Login>| {});
    let b = bus.on(|_: &Event<Login>| {});
    assert_eq!(bus.listener_count("auth:login"), 2);

    assert!(a.unsubscribe());
    assert!(!a.unsubscribe());
    assert!(bus.has_listeners("auth:login"));

    assert!(b.unsubscribe());
    assert!(!bus.has_listeners("auth:login"));
    assert_eq!(bus.listener_count("auth:login"), 0);
}

#[tokio::test(start_paused = true)]
async fn named_subscriptions_are_described() {
    let bus = bus_with(100, 50);
    let sub = bus.on_named("sessions-reconciler", |_: &Event<Created>| {});
    bus.on_any(|_| {});

    let infos = bus.subscriptions();
    assert_eq!(infos.len(), 2);
    let typed = infos.iter().find(|i| i.id == sub.id()).unwrap();
    assert_eq!(typed.event_type, "session:created");
    assert_eq!(typed.source.as_deref(), Some("sessions-reconciler"));
    assert!(infos.iter().any(|i| i.event_type == WILDCARD));
}

#[tokio::test(start_paused = true)]
async fn tap_sees_every_dispatched_event() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    let l = log.clone();
    bus.on_any(move |record| l.push(record.name.clone()));

    bus.emit(Theme("light".into()));
    bus.emit_from("legacy", Created(1));
    bus.flush();

    assert_eq!(log.entries(), vec!["ui:themeChanged", "session:created"]);
}

#[tokio::test(start_paused = true)]
async fn source_tag_reaches_the_handler() {
    let bus = bus_with(100, 50);
    let seen = Log::default();
    let s = seen.clone();
    bus.on(move |e: &Event<Login>| {
        s.push(format!("{}:{}", e.source().unwrap_or("none"), e.is_from("modern")));
    });
    bus.emit_from("modern", Login(1));
    bus.emit(Login(2));
    assert_eq!(seen.entries(), vec!["modern:true", "none:false"]);
}

// ── Failure isolation ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_stop_delivery() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    bus.on(|_: &Event<Login>| panic!("boom"));
    let l = log.clone();
    bus.on(move |e: &Event<Login>| l.push(format!("ok{}", e.payload().0)));

    bus.emit(Login(1));
    bus.emit(Login(2));

    assert_eq!(log.entries(), vec!["ok1", "ok2"]);
    assert_eq!(bus.stats().handler_failures, 2);
}

// ── Pause / resume ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn paused_bus_queues_everything() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);

    bus.pause();
    assert!(bus.is_paused());
    bus.emit(Created(1));
    bus.emit(Login(1));
    bus.emit(Tick(1));
    advance(200).await;
    assert_eq!(log.len(), 0);
    assert_eq!(bus.queued(), 3);

    bus.resume();
    assert!(!bus.is_paused());
    assert_eq!(log.entries(), vec!["login1", "c1", "t1"]);
    assert_eq!(bus.queued(), 0);
}

#[tokio::test(start_paused = true)]
async fn resume_drains_more_than_one_batch() {
    let bus = bus_with(10, 50);
    let log = Log::default();
    record_all(&bus, &log);

    bus.pause();
    for i in 0..25 {
        bus.emit(Created(i));
    }
    assert_eq!(log.len(), 0);

    bus.resume();
    assert_eq!(log.len(), 25);
    assert_eq!(bus.stats().batches, 3);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_are_idempotent() {
    let bus = bus_with(100, 50);
    bus.resume();
    bus.pause();
    bus.pause();
    assert!(bus.is_paused());
    bus.resume();
    bus.resume();
    assert!(!bus.is_paused());
}

// ── History ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn history_is_bounded_and_oldest_first() {
    let bus = EventBus::new(BusConfig {
        history_size: 3,
        ..BusConfig::default()
    })
    .unwrap();
    for i in 0..5 {
        bus.emit(Login(i));
    }
    let payloads: Vec<u64> = bus
        .history()
        .iter()
        .map(|r| r.payload.as_u64().unwrap())
        .collect();
    assert_eq!(payloads, vec![2, 3, 4]);

    bus.clear_history();
    assert!(bus.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn history_records_sequence_and_source() {
    let bus = bus_with(100, 50);
    bus.emit_from("legacy", Created(1));
    bus.emit(Tick(2));
    let history = bus.history();
    assert_eq!(history[0].sequence, 0);
    assert_eq!(history[1].sequence, 1);
    assert_eq!(history[0].source.as_deref(), Some("legacy"));
    assert_eq!(history[1].priority, Priority::Low);
}

// ── Disposal ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dispose_clears_state_and_is_idempotent() {
    let bus = bus_with(100, 50);
    let log = Log::default();
    record_all(&bus, &log);
    let sub = bus.on(|_: &Event<Login>| {});

    bus.emit(Created(1));
    bus.dispose();
    bus.dispose();

    assert!(bus.is_disposed());
    assert!(!sub.is_active());
    assert_eq!(bus.queued(), 0);
    assert!(bus.history().is_empty());
    assert_eq!(bus.stats().subscriptions, 0);

    bus.emit(Login(1));
    advance(100).await;
    assert_eq!(log.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn dispose_from_a_handler_completes_the_current_event() {
    let bus = bus_with(100, 50);
    let log = Log::default();

    let inner = bus.clone();
    bus.on(move |_: &Event<Login>| inner.dispose());
    let l = log.clone();
    bus.on(move |_: &Event<Login>| l.push("second"));

    bus.emit(Login(1));
    assert_eq!(log.entries(), vec!["second"]);
    assert!(bus.is_disposed());
}

#[tokio::test(start_paused = true)]
async fn subscribe_after_dispose_is_inert() {
    let bus = bus_with(100, 50);
    bus.dispose();
    let sub = bus.on(|_: &Event<Login>| {});
    assert!(!sub.is_active());
    assert_eq!(bus.listener_count("auth:login"), 0);
}

// ── Stats ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stats_track_traffic() {
    let bus = bus_with(100, 50);
    bus.on(|_: &Event<Created>| {});
    bus.emit(Created(1));
    bus.emit(Login(1));

    let stats = bus.stats();
    assert_eq!(stats.emitted, 2);
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.subscriptions, 1);
    assert!(!stats.paused);
}
