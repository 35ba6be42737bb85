//! One side of the bridge: a bus, diagnostics and the three reconcilers for
//! a single container.

use crate::config::BridgeConfig;
use crate::identity::{
    Credentials, IdentityReconciler, IdentityStore, InMemoryIdentityStore, ProfileUpdate, User,
};
use crate::reconciler::{Domain, Reconciler, ReconcilerContext};
use crate::sessions::{
    InMemorySessionStore, Message, NewMessage, NewSession, Session, SessionChanges,
    SessionReconciler, SessionStore,
};
use crate::ui::{InMemoryUiStore, Modal, NewToast, Theme, Toast, UiReconciler, UiStore};
use serde::Serialize;
use statebridge_bus::{BusResult, BusStats, EventBus};
use statebridge_diagnostics::{
    ComponentStatus, Diagnostics, DiagnosticsReport, HealthStatus, Logger,
};
use statebridge_types::{BridgeResult, MessageId, SessionId, ToastId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// The stores of one container.
#[derive(Clone)]
pub struct BridgeStores {
    pub identity: Arc<dyn IdentityStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub ui: Arc<dyn UiStore>,
}

impl BridgeStores {
    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            identity: Arc::new(InMemoryIdentityStore::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            ui: Arc::new(InMemoryUiStore::new()),
        }
    }
}

/// Snapshot returned by [`Bridge::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub source: String,
    pub initialized: bool,
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentStatus>,
    /// Dirty entries waiting for a flush, per domain.
    pub pending: BTreeMap<Domain, usize>,
    pub bus: BusStats,
}

/// Wires one container's stores to the bus.
///
/// Two bridges with different sources sharing one bus keep their containers
/// consistent.
pub struct Bridge {
    config: BridgeConfig,
    bus: EventBus,
    owns_bus: bool,
    diagnostics: Diagnostics,
    logger: Logger,
    identity: IdentityReconciler,
    sessions: SessionReconciler,
    ui: UiReconciler,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl Bridge {
    /// Creates a bridge with its own bus. Fails only if the bus cannot be
    /// constructed.
    pub fn new(config: BridgeConfig, stores: BridgeStores) -> BusResult<Self> {
        let bus = EventBus::new(config.bus.clone())?;
        let mut bridge = Self::with_bus(config, bus, stores);
        bridge.owns_bus = true;
        Ok(bridge)
    }

    /// Creates a bridge on an existing bus. The bus is not disposed with
    /// the bridge.
    pub fn with_bus(config: BridgeConfig, bus: EventBus, stores: BridgeStores) -> Self {
        let diagnostics = Diagnostics::new(config.diagnostics.clone(), bus.clone());
        let logger = diagnostics.logger(&config.source);
        let ctx = ReconcilerContext::new(&config.source, bus.clone(), config.reconciler.clone())
            .with_logger(diagnostics.logger("sync"))
            .with_registry(diagnostics.registry().clone())
            .with_perf(diagnostics.perf().clone());
        Self {
            identity: IdentityReconciler::new(ctx.clone(), stores.identity),
            sessions: SessionReconciler::new(ctx.clone(), stores.sessions),
            ui: UiReconciler::new(ctx, stores.ui),
            config,
            bus,
            owns_bus: false,
            diagnostics,
            logger,
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Starts the reconcilers and the health loops. Idempotent.
    pub fn initialize(&self) -> BridgeResult<()> {
        self.identity.initialize()?;
        self.sessions.initialize()?;
        self.ui.initialize()?;
        if !self.initialized.swap(true, Ordering::SeqCst) {
            self.diagnostics.start();
            self.logger.info("bridge initialized");
            info!(source = %self.config.source, "bridge initialized");
        }
        Ok(())
    }

    /// Whether `initialize` has run.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// This side's source tag.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.config.source
    }

    /// The configuration the bridge was built with.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The bus, for `emit`, `on` and `once`.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The identity reconciler.
    #[must_use]
    pub fn identity(&self) -> &IdentityReconciler {
        &self.identity
    }

    /// The sessions reconciler.
    #[must_use]
    pub fn sessions(&self) -> &SessionReconciler {
        &self.sessions
    }

    /// The UI reconciler.
    #[must_use]
    pub fn ui(&self) -> &UiReconciler {
        &self.ui
    }

    /// The diagnostics hub: registry, perf tracker, logs and health monitor.
    #[must_use]
    pub fn diagnostics_hub(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // ── Identity ─────────────────────────────────────────────────

    /// See [`IdentityReconciler::login`].
    pub async fn login(&self, credentials: Credentials) -> BridgeResult<User> {
        self.identity.login(credentials).await
    }

    /// See [`IdentityReconciler::logout`].
    pub async fn logout(&self) -> BridgeResult<()> {
        self.identity.logout().await
    }

    /// See [`IdentityReconciler::refresh_token`].
    pub async fn refresh_token(&self) -> BridgeResult<String> {
        self.identity.refresh_token().await
    }

    /// See [`IdentityReconciler::update_profile`].
    pub async fn update_profile(&self, update: ProfileUpdate) -> BridgeResult<User> {
        self.identity.update_profile(update).await
    }

    // ── Sessions ─────────────────────────────────────────────────

    /// See [`SessionReconciler::create_session`].
    pub async fn create_session(&self, new: NewSession) -> BridgeResult<Session> {
        self.sessions.create_session(new).await
    }

    /// See [`SessionReconciler::update_session`].
    pub async fn update_session(
        &self,
        id: SessionId,
        changes: SessionChanges,
    ) -> BridgeResult<Session> {
        self.sessions.update_session(id, changes).await
    }

    /// See [`SessionReconciler::delete_session`].
    pub async fn delete_session(&self, id: SessionId) -> BridgeResult<()> {
        self.sessions.delete_session(id).await
    }

    /// See [`SessionReconciler::select_session`].
    pub async fn select_session(&self, id: Option<SessionId>) -> BridgeResult<()> {
        self.sessions.select_session(id).await
    }

    /// See [`SessionReconciler::send_message`].
    pub async fn send_message(
        &self,
        session: SessionId,
        message: NewMessage,
    ) -> BridgeResult<Message> {
        self.sessions.send_message(session, message).await
    }

    /// See [`SessionReconciler::delete_message`].
    pub async fn delete_message(&self, session: SessionId, message: MessageId) -> BridgeResult<()> {
        self.sessions.delete_message(session, message).await
    }

    // ── UI ───────────────────────────────────────────────────────

    /// See [`UiReconciler::set_theme`].
    pub async fn set_theme(&self, theme: Theme) -> BridgeResult<()> {
        self.ui.set_theme(theme).await
    }

    /// See [`UiReconciler::show_toast`].
    pub async fn show_toast(&self, toast: NewToast) -> BridgeResult<Toast> {
        self.ui.show_toast(toast).await
    }

    /// See [`UiReconciler::dismiss_toast`].
    pub async fn dismiss_toast(&self, id: ToastId) -> BridgeResult<()> {
        self.ui.dismiss_toast(id).await
    }

    /// See [`UiReconciler::open_modal`].
    pub async fn open_modal(&self, modal: Modal) -> BridgeResult<()> {
        self.ui.open_modal(modal).await
    }

    /// See [`UiReconciler::close_modal`].
    pub async fn close_modal(&self) -> BridgeResult<Modal> {
        self.ui.close_modal().await
    }

    /// See [`UiReconciler::set_loading`].
    pub async fn set_loading(&self, loading: bool) -> BridgeResult<()> {
        self.ui.set_loading(loading).await
    }

    // ── Lifecycle ────────────────────────────────────────────────

    fn reconcilers(&self) -> [&dyn Reconciler; 3] {
        [&self.identity, &self.sessions, &self.ui]
    }

    /// Flushes every domain now. Returns the number of events emitted.
    pub fn flush(&self) -> usize {
        self.reconcilers().iter().map(|r| r.flush()).sum()
    }

    /// Initialization state, component health and pending work per domain.
    #[must_use]
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            source: self.config.source.clone(),
            initialized: self.is_initialized(),
            status: self.diagnostics.status(),
            components: self.diagnostics.registry().all(),
            pending: self
                .reconcilers()
                .iter()
                .map(|r| (r.domain(), r.pending()))
                .collect(),
            bus: self.bus.stats(),
        }
    }

    /// Full diagnostics report.
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsReport {
        self.diagnostics.report()
    }

    /// Detaches everything. Disposes the bus too if the bridge created it.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        for reconciler in self.reconcilers() {
            reconciler.dispose();
        }
        self.diagnostics.stop();
        if self.owns_bus {
            self.bus.dispose();
        }
        self.logger.info("bridge disposed");
        info!(source = %self.config.source, "bridge disposed");
    }

    /// Whether `dispose` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.dispose();
    }
}
