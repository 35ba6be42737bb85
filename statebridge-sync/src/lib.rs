//! Bidirectional state reconciliation over the event bus.
//!
//! Two independently owned state containers ("legacy" and "modern") are kept
//! consistent by running one reconciler per domain and container on a shared
//! [`EventBus`](statebridge_bus::EventBus):
//!
//! 1. A container mutation whose field is whitelisted marks entities dirty.
//! 2. Dirty entities are flushed as `*:updated` events, on a periodic tick
//!    or immediately after a mutating operation.
//! 3. The peer reconciler applies events from other sources through its
//!    store's direct-patch path, after setting a provenance marker on the
//!    target so its own mutation hook skips the write instead of echoing it.
//!
//! Operations return [`BridgeResult`](statebridge_types::BridgeResult); store
//! failures are retried when transient and never panic across the boundary.

pub mod bridge;
pub mod config;
pub mod dirty;
pub mod error;
pub mod identity;
pub mod provenance;
pub mod reconciler;
pub mod sessions;
pub mod store;
pub mod ui;

pub use bridge::{Bridge, BridgeStatus, BridgeStores};
pub use config::{BridgeConfig, ConfigError, ReconcilerConfig};
pub use dirty::{DirtySet, NestedDirtySet};
pub use error::StoreError;
pub use identity::{IdentityReconciler, IdentityStore, InMemoryIdentityStore};
pub use provenance::ProvenanceMarkers;
pub use reconciler::{Domain, Reconciler, ReconcilerContext};
pub use sessions::{InMemorySessionStore, SessionReconciler, SessionStore};
pub use store::{FailureInjector, Listener, Unsubscribe};
pub use ui::{InMemoryUiStore, UiReconciler, UiStore};
