//! Typed event envelopes.
//!
//! Every payload that travels on the bus is a concrete type implementing
//! [`BusEvent`], which binds it to exactly one event name at compile time.
//! Subscribing to `AuthLogin` therefore always yields an `Event<AuthLogin>`;
//! there is no untyped payload on the typed path.
//!
//! Priority is derived from the name unless the emitter overrides it:
//! - `ui:*`, `auth:login`, `auth:logout` → [`Priority::High`]
//! - `sync:*`, names containing `batch` or `telemetry` → [`Priority::Low`]
//! - everything else → [`Priority::Normal`]

use crate::{EventId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identity session start/end events that always jump the queue.
const HIGH_PRIORITY_EVENTS: &[&str] = &["auth:login", "auth:logout"];

/// Dispatch priority. Orders `High < Normal < Low` so an ascending sort puts
/// urgent events first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Classifies an event name by naming convention.
    #[must_use]
    pub fn classify(name: &str) -> Self {
        if name.starts_with("ui:") || HIGH_PRIORITY_EVENTS.contains(&name) {
            Self::High
        } else if name.starts_with("sync:") || name.contains("batch") || name.contains("telemetry")
        {
            Self::Low
        } else {
            Self::Normal
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// A payload type bound to a single event name.
///
/// The `Serialize` bound lets the bus keep a type-erased copy in its
/// history for diagnostics.
pub trait BusEvent: Serialize + Clone + Send + Sync + 'static {
    /// The `"<domain>:<verb>"` name this payload travels under.
    const NAME: &'static str;

    /// Priority used when the emitter does not override it.
    fn default_priority() -> Priority {
        Priority::classify(Self::NAME)
    }
}

/// Per-emit overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitOptions {
    /// Who emitted the event. Reconcilers use this to ignore their own echo.
    pub source: Option<String>,
    /// Overrides the name-derived priority.
    pub priority: Option<Priority>,
    /// Free-form metadata.
    pub meta: Option<Map<String, Value>>,
}

impl EmitOptions {
    /// Options carrying only a source tag.
    #[must_use]
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    /// Sets the priority override.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// An immutable event as delivered to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<P> {
    id: EventId,
    name: &'static str,
    payload: P,
    timestamp: Timestamp,
    source: Option<String>,
    priority: Priority,
    meta: Option<Map<String, Value>>,
}

impl<P: BusEvent> Event<P> {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(payload: P, options: EmitOptions) -> Self {
        Self {
            id: EventId::new(),
            name: P::NAME,
            payload,
            timestamp: Timestamp::now(),
            source: options.source,
            priority: options.priority.unwrap_or_else(P::default_priority),
            meta: options.meta,
        }
    }
}

impl<P> Event<P> {
    /// Unique id of this event.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The event name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The typed payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// When the event was emitted.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Who emitted the event, if tagged.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Effective dispatch priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Free-form metadata.
    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.meta.as_ref()
    }

    /// Returns true if this event was emitted by `source`.
    pub fn is_from(&self, source: &str) -> bool {
        self.source.as_deref() == Some(source)
    }
}

/// Type-erased copy of an event, kept in the bus history and handed to
/// traffic taps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    /// Bus-assigned arrival order.
    pub sequence: u64,
    pub name: String,
    pub priority: Priority,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    /// JSON form of the payload. `Value::Null` if it failed to serialize.
    pub payload: Value,
}

impl EventRecord {
    /// Builds a record from a typed event.
    pub fn from_event<P: BusEvent>(event: &Event<P>, sequence: u64) -> Self {
        Self {
            id: event.id,
            sequence,
            name: event.name.to_string(),
            priority: event.priority,
            timestamp: event.timestamp,
            source: event.source.clone(),
            meta: event.meta.clone(),
            payload: serde_json::to_value(&event.payload).unwrap_or(Value::Null),
        }
    }
}

/// Declares a [`BusEvent`] impl for a payload type.
///
/// ```
/// use serde::Serialize;
/// use statebridge_types::{bus_event, BusEvent, Priority};
///
/// #[derive(Debug, Clone, Serialize)]
/// struct ThemeChanged { theme: String }
/// bus_event!(ThemeChanged => "ui:themeChanged");
///
/// assert_eq!(ThemeChanged::NAME, "ui:themeChanged");
/// assert_eq!(ThemeChanged::default_priority(), Priority::High);
/// ```
#[macro_export]
macro_rules! bus_event {
    ($ty:ty => $name:literal) => {
        impl $crate::BusEvent for $ty {
            const NAME: &'static str = $name;
        }
    };
}
