#![allow(dead_code)]

use statebridge_bus::{BusConfig, EventBus};
use statebridge_sync::identity::{Credentials, User};
use statebridge_sync::{
    Bridge, BridgeConfig, BridgeStores, InMemoryIdentityStore, InMemorySessionStore,
    InMemoryUiStore,
};
use std::sync::Arc;

pub const PASSWORD: &str = "correct horse";

pub fn alice() -> User {
    User {
        id: "u-1".to_string(),
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
        avatar: None,
    }
}

pub fn alice_credentials() -> Credentials {
    Credentials::new("alice@example.com", PASSWORD)
}

/// Concrete handles to one container's stores.
pub struct Stores {
    pub identity: Arc<InMemoryIdentityStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub ui: Arc<InMemoryUiStore>,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            identity: Arc::new(InMemoryIdentityStore::new().with_account(PASSWORD, alice())),
            sessions: Arc::new(InMemorySessionStore::new()),
            ui: Arc::new(InMemoryUiStore::new()),
        }
    }

    pub fn bridge_stores(&self) -> BridgeStores {
        BridgeStores {
            identity: self.identity.clone(),
            sessions: self.sessions.clone(),
            ui: self.ui.clone(),
        }
    }
}

pub fn config(source: &str) -> BridgeConfig {
    let mut config = BridgeConfig::for_source(source);
    config.reconciler.retry.delay_ms = 10;
    config
}

/// Two containers bridged over one bus.
pub struct Pair {
    pub bus: EventBus,
    pub legacy: Bridge,
    pub legacy_stores: Stores,
    pub modern: Bridge,
    pub modern_stores: Stores,
}

/// Builds and initializes a pair. Must run inside a Tokio runtime.
pub fn pair() -> Pair {
    let bus = EventBus::new(BusConfig::default()).unwrap();
    let legacy_stores = Stores::new();
    let modern_stores = Stores::new();
    let legacy = Bridge::with_bus(config("legacy"), bus.clone(), legacy_stores.bridge_stores());
    let modern = Bridge::with_bus(config("modern"), bus.clone(), modern_stores.bridge_stores());
    legacy.initialize().unwrap();
    modern.initialize().unwrap();
    Pair {
        bus,
        legacy,
        legacy_stores,
        modern,
        modern_stores,
    }
}

/// Events named `name` in the bus history.
pub fn count(bus: &EventBus, name: &str) -> usize {
    bus.history().iter().filter(|r| r.name == name).count()
}

/// Events in the bus history emitted by `source`.
pub fn count_from(bus: &EventBus, source: &str) -> usize {
    bus.history()
        .iter()
        .filter(|r| r.source.as_deref() == Some(source))
        .count()
}
