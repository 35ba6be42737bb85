mod common;

use common::{alice_credentials, config, pair, Stores};
use pretty_assertions::assert_eq;
use statebridge_diagnostics::HealthStatus;
use statebridge_sync::identity::IdentityStore;
use statebridge_sync::sessions::NewSession;
use statebridge_sync::{Bridge, Domain};
use statebridge_types::ErrorCode;

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test]
async fn initialize_registers_every_domain() {
    let p = pair();
    let status = p.legacy.status();

    assert!(status.initialized);
    assert_eq!(status.source, "legacy");
    assert_eq!(status.status, HealthStatus::Healthy);
    let names: Vec<&str> = status.components.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["identity:legacy", "sessions:legacy", "ui:legacy"]);
    assert_eq!(status.pending[&Domain::Sessions], 0);
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let p = pair();
    let listeners = p.legacy_stores.sessions.listener_count();
    p.legacy.initialize().unwrap();
    assert_eq!(p.legacy_stores.sessions.listener_count(), listeners);
}

#[test]
fn bridge_needs_a_runtime() {
    let stores = Stores::new();
    assert!(Bridge::new(config("legacy"), stores.bridge_stores()).is_err());
}

#[tokio::test]
async fn dispose_detaches_and_refuses_work() {
    let stores = Stores::new();
    let bridge = Bridge::new(config("legacy"), stores.bridge_stores()).unwrap();
    bridge.initialize().unwrap();
    assert_eq!(stores.sessions.listener_count(), 1);

    bridge.dispose();
    bridge.dispose();

    assert!(bridge.is_disposed());
    assert!(bridge.bus().is_disposed());
    assert_eq!(stores.sessions.listener_count(), 0);
    assert_eq!(stores.identity.listener_count(), 0);
    assert_eq!(stores.ui.listener_count(), 0);
    assert!(bridge.status().components.is_empty());

    let err = bridge
        .create_session(NewSession::titled("late"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::OperationAborted);
    assert!(bridge.initialize().is_err());
}

#[tokio::test]
async fn disposing_one_side_leaves_a_shared_bus_running() {
    let p = pair();
    p.modern.dispose();
    assert!(!p.bus.is_disposed());

    p.legacy.login(alice_credentials()).await.unwrap();
    assert!(!p.modern_stores.identity.snapshot().authenticated);
}

// ── Diagnostics ──────────────────────────────────────────────────

#[tokio::test]
async fn report_covers_traffic_components_and_logs() {
    let p = pair();
    p.legacy
        .create_session(NewSession::titled("Report"))
        .await
        .unwrap();
    p.bus.flush();

    let report = p.legacy.diagnostics();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.components.len(), 3);
    assert_eq!(report.traffic["session:created"], 1);
    assert!(report.performance.contains_key("session.create"));
    assert!(report
        .recent_logs
        .iter()
        .any(|e| e.namespace == "bridge:legacy" && e.message == "bridge initialized"));

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["components"]["sessions:legacy"].is_object());
    assert!(json["recentLogs"].is_array());
}

#[tokio::test]
async fn flush_reports_pending_work() {
    let p = pair();
    p.legacy_stores.ui.set_sidebar(true);
    p.legacy_stores.identity.set_loading(true);
    assert_eq!(p.legacy.flush(), 0);

    let status = serde_json::to_value(p.legacy.status()).unwrap();
    assert_eq!(status["pending"]["identity"], 0);
    assert_eq!(status["bus"]["paused"], false);
}
