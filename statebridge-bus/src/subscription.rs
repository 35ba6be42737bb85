//! Subscription handles and registry entries.

use crate::bus::BusInner;
use serde::Serialize;
use statebridge_types::{EventRecord, SubscriptionId};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Event type reported by traffic taps registered with `on_any`.
pub const WILDCARD: &str = "*";

/// Handler that downcasts the erased event to its concrete type.
pub(crate) type ErasedHandler = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

/// Handler that observes every dispatched event in erased form.
pub(crate) type TapHandler = Arc<dyn Fn(&EventRecord) + Send + Sync>;

/// A registered listener.
pub(crate) struct SubscriptionEntry<H> {
    pub id: SubscriptionId,
    pub once: bool,
    pub active: Arc<AtomicBool>,
    pub subscriber: Option<String>,
    pub handler: H,
}

impl<H> SubscriptionEntry<H> {
    /// A fresh, active entry with a new id.
    pub fn new(handler: H, once: bool, subscriber: Option<String>) -> Self {
        Self {
            id: SubscriptionId::new(),
            once,
            active: Arc::new(AtomicBool::new(true)),
            subscriber,
            handler,
        }
    }

    /// Whether the entry currently receives events.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Marks the entry as gone so outstanding handles report inactive.
    pub fn retire(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Public description of a registered listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub event_type: String,
    pub once: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Handle returned by `on`, `once` and `on_any`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    event_type: &'static str,
    once: bool,
    active: Arc<AtomicBool>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub(crate) fn new<H>(
        entry: &SubscriptionEntry<H>,
        event_type: &'static str,
        bus: Weak<BusInner>,
    ) -> Self {
        Self {
            id: entry.id,
            event_type,
            once: entry.once,
            active: Arc::clone(&entry.active),
            bus,
        }
    }

    /// The subscription id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The event name this subscription listens to, or [`WILDCARD`].
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Whether the subscription fires only once.
    pub fn is_once(&self) -> bool {
        self.once
    }

    /// False once paused, unsubscribed, fired (for `once`), or the bus was
    /// disposed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove_subscription(self.event_type, self.id),
            None => false,
        }
    }

    /// Stops delivery to this listener without removing it.
    pub fn pause(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.set_subscription_active(self.event_type, self.id, false);
        }
    }

    /// Restarts delivery after [`Subscription::pause`].
    pub fn resume(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.set_subscription_active(self.event_type, self.id, true);
        }
    }
}
