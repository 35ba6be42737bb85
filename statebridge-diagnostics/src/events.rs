//! Events published by the diagnostics layer.
//!
//! All live under the `bridge:` prefix and travel at Normal priority, so
//! they are batched with ordinary traffic.

use crate::registry::HealthStatus;
use serde::Serialize;
use statebridge_types::{bus_event, BridgeError, Timestamp};
use std::collections::BTreeMap;

/// A component's status value changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub component: String,
    pub previous: HealthStatus,
    pub current: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeError>,
}
bus_event!(StatusChanged => "bridge:statusChanged");

/// Periodic aggregate health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, HealthStatus>,
    pub checked_at: Timestamp,
}
bus_event!(HealthReport => "bridge:health");

/// Resident memory grew past the configured threshold across the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryWarning {
    pub growth_bytes: u64,
    pub threshold_bytes: u64,
    pub current_bytes: u64,
    pub window: usize,
}
bus_event!(MemoryWarning => "bridge:memoryWarning");

/// An operation took longer than the slow-operation threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowOperation {
    pub operation: String,
    pub duration_ms: u64,
    pub threshold_ms: u64,
}
bus_event!(SlowOperation => "bridge:slowOperation");
