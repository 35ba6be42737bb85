//! Component health registry.
//!
//! Components report their status here. A change of status value is logged
//! and published as `bridge:statusChanged`; repeated reports of the same
//! value only refresh `last_updated` and merge metrics.

use crate::events::StatusChanged;
use crate::logging::{LogLevel, Logger};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use statebridge_bus::EventBus;
use statebridge_types::{BridgeError, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Health of a single component. Orders `Healthy < Degraded < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Last known state of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub status: HealthStatus,
    pub last_updated: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Map<String, Value>>,
}

impl ComponentStatus {
    /// A status stamped now, with no error or metrics.
    #[must_use]
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            last_updated: Timestamp::now(),
            error: None,
            metrics: None,
        }
    }
}

/// Partial status merged into a component's current status.
///
/// Unset fields keep their current value. Metrics merge key by key. Moving
/// to `Healthy` without an error clears the stored error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<HealthStatus>,
    pub error: Option<BridgeError>,
    pub metrics: Option<Map<String, Value>>,
}

impl StatusUpdate {
    /// An update that only changes the status.
    #[must_use]
    pub fn status(status: HealthStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Back to healthy; clears the stored error.
    #[must_use]
    pub fn healthy() -> Self {
        Self::status(HealthStatus::Healthy)
    }

    /// Degraded because of `error`.
    #[must_use]
    pub fn degraded(error: BridgeError) -> Self {
        Self::status(HealthStatus::Degraded).with_error(error)
    }

    /// Failed because of `error`.
    #[must_use]
    pub fn error(error: BridgeError) -> Self {
        Self::status(HealthStatus::Error).with_error(error)
    }

    /// Sets the error to store.
    #[must_use]
    pub fn with_error(mut self, error: BridgeError) -> Self {
        self.error = Some(error);
        self
    }

    /// Adds one metric.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Registry of component statuses keyed by component name.
pub struct ComponentRegistry {
    components: Mutex<BTreeMap<String, ComponentStatus>>,
    bus: EventBus,
    logger: Logger,
}

impl ComponentRegistry {
    /// An empty registry announcing changes on `bus`.
    #[must_use]
    pub fn new(bus: EventBus, logger: Logger) -> Self {
        Self {
            components: Mutex::new(BTreeMap::new()),
            bus,
            logger,
        }
    }

    /// Registers a component, replacing any previous entry for `name`.
    pub fn register_component(&self, name: &str, status: HealthStatus) {
        self.lock().insert(name.to_string(), ComponentStatus::new(status));
        self.logger.debug(&format!("component {name} registered as {status}"));
    }

    /// Removes a component. Returns false if it was not registered.
    pub fn unregister_component(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Merges `update` into the component's status and bumps `last_updated`.
    ///
    /// Unknown components are registered as healthy first. Returns true if
    /// the status value changed.
    pub fn update_status(&self, name: &str, update: StatusUpdate) -> bool {
        let change = {
            let mut components = self.lock();
            let entry = components
                .entry(name.to_string())
                .or_insert_with(|| ComponentStatus::new(HealthStatus::Healthy));

            let previous = entry.status;
            if let Some(status) = update.status {
                entry.status = status;
            }
            match update.error {
                Some(error) => entry.error = Some(error),
                None if entry.status == HealthStatus::Healthy => entry.error = None,
                None => {}
            }
            if let Some(metrics) = update.metrics {
                let merged = entry.metrics.get_or_insert_with(Map::new);
                merged.extend(metrics);
            }
            entry.last_updated = Timestamp::now();

            (previous != entry.status).then(|| StatusChanged {
                component: name.to_string(),
                previous,
                current: entry.status,
                error: entry.error.clone(),
            })
        };

        let Some(change) = change else {
            return false;
        };
        let level = if change.current == HealthStatus::Healthy {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        let mut fields = Map::new();
        fields.insert("component".into(), name.into());
        if let Some(error) = &change.error {
            fields.insert("error".into(), error.to_string().into());
        }
        self.logger.log(
            level,
            &format!("status changed: {} -> {}", change.previous, change.current),
            Some(fields),
        );
        self.bus.emit(change);
        true
    }

    /// Current status of a component.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ComponentStatus> {
        self.lock().get(name).cloned()
    }

    /// Snapshot of every component, ordered by name.
    pub fn all(&self) -> BTreeMap<String, ComponentStatus> {
        self.lock().clone()
    }

    /// Worst status across all components; `Healthy` when none are registered.
    pub fn aggregate(&self) -> HealthStatus {
        self.lock()
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no component is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets every component.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ComponentStatus>> {
        self.components.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
