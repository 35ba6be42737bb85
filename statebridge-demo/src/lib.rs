//! Two in-memory containers bridged over one bus.
//!
//! Used by the `statebridge-demo` binary and its tests: drive some traffic
//! through both sides, let the bus settle, then compare the synced state.

use anyhow::{Context, Result};
use serde::Serialize;
use statebridge_bus::EventBus;
use statebridge_diagnostics::DiagnosticsReport;
use statebridge_sync::identity::{Credentials, User};
use statebridge_sync::sessions::{NewMessage, NewSession, SessionStore, SessionsState};
use statebridge_sync::ui::{NewToast, Theme, ToastKind, UiStore};
use statebridge_sync::{
    Bridge, BridgeConfig, BridgeStatus, BridgeStores, IdentityStore, InMemoryIdentityStore,
    InMemorySessionStore, InMemoryUiStore,
};
use std::sync::Arc;
use tracing::info;

/// Password of the demo account.
pub const DEMO_PASSWORD: &str = "demo";

/// The account both containers know.
#[must_use]
pub fn demo_user() -> User {
    User {
        id: "demo-user".to_string(),
        name: "Demo User".to_string(),
        email: "demo@example.com".to_string(),
        avatar: None,
    }
}

/// How much traffic [`Demo::run`] generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workload {
    pub sessions: usize,
    pub messages_per_session: usize,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            sessions: 3,
            messages_per_session: 2,
        }
    }
}

/// One container's stores.
pub struct Container {
    pub identity: Arc<InMemoryIdentityStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub ui: Arc<InMemoryUiStore>,
}

impl Container {
    fn new() -> Self {
        Self {
            identity: Arc::new(InMemoryIdentityStore::new().with_account(DEMO_PASSWORD, demo_user())),
            sessions: Arc::new(InMemorySessionStore::new()),
            ui: Arc::new(InMemoryUiStore::new()),
        }
    }

    fn stores(&self) -> BridgeStores {
        BridgeStores {
            identity: self.identity.clone(),
            sessions: self.sessions.clone(),
            ui: self.ui.clone(),
        }
    }
}

/// Whether each domain holds the same synced state on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Convergence {
    pub identity: bool,
    pub sessions: bool,
    pub ui: bool,
}

impl Convergence {
    /// Returns true if every domain converged.
    #[must_use]
    pub fn all(&self) -> bool {
        self.identity && self.sessions && self.ui
    }
}

/// What the binary prints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoSummary {
    pub converged: Convergence,
    pub legacy: BridgeStatus,
    pub modern: BridgeStatus,
    pub diagnostics: DiagnosticsReport,
}

/// Two bridged containers sharing one bus.
pub struct Demo {
    bus: EventBus,
    legacy: Bridge,
    legacy_container: Container,
    modern: Bridge,
    modern_container: Container,
}

impl Demo {
    /// Builds both sides on a new bus. `config.source` names the legacy
    /// side; the modern side copies the config under `modern_source`.
    pub fn new(config: &BridgeConfig, modern_source: &str) -> Result<Self> {
        config.validate().context("invalid bridge config")?;
        if config.source == modern_source {
            anyhow::bail!("both containers use source {modern_source:?}");
        }
        let bus = EventBus::new(config.bus.clone()).context("failed to create the event bus")?;
        let legacy_container = Container::new();
        let modern_container = Container::new();
        let legacy = Bridge::with_bus(config.clone(), bus.clone(), legacy_container.stores());
        let mut modern_config = config.clone();
        modern_config.source = modern_source.to_string();
        let modern = Bridge::with_bus(modern_config, bus.clone(), modern_container.stores());
        legacy.initialize().context("failed to initialize the legacy side")?;
        modern.initialize().context("failed to initialize the modern side")?;
        Ok(Self {
            bus,
            legacy,
            legacy_container,
            modern,
            modern_container,
        })
    }

    /// The shared bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The legacy side's bridge.
    pub fn legacy(&self) -> &Bridge {
        &self.legacy
    }

    /// The modern side's bridge.
    pub fn modern(&self) -> &Bridge {
        &self.modern
    }

    /// The legacy side's stores.
    pub fn legacy_container(&self) -> &Container {
        &self.legacy_container
    }

    /// The modern side's stores.
    pub fn modern_container(&self) -> &Container {
        &self.modern_container
    }

    /// Logs in on the legacy side, creates sessions there, replies from the
    /// modern side and changes UI state on both.
    pub async fn run(&self, workload: Workload) -> Result<()> {
        let user = self
            .legacy
            .login(Credentials::new(demo_user().email, DEMO_PASSWORD))
            .await
            .context("login failed")?;
        info!(user = %user.id, "logged in on {}", self.legacy.source());

        let mut last = None;
        for n in 0..workload.sessions {
            let session = self
                .legacy
                .create_session(NewSession::titled(format!("Session {}", n + 1)))
                .await
                .context("create_session failed")?;
            // The peer must know the session before it can post into it.
            self.settle().await;
            for m in 0..workload.messages_per_session {
                let side = if m % 2 == 0 { &self.legacy } else { &self.modern };
                side.send_message(session.id, NewMessage::user(format!("message {}", m + 1)))
                    .await
                    .context("send_message failed")?;
            }
            last = Some(session.id);
        }
        if let Some(id) = last {
            self.modern
                .select_session(Some(id))
                .await
                .context("select_session failed")?;
        }

        self.modern
            .set_theme(Theme::Dark)
            .await
            .context("set_theme failed")?;
        self.legacy
            .show_toast(NewToast::info("Bridge is live").kind(ToastKind::Success))
            .await
            .context("show_toast failed")?;
        self.legacy
            .refresh_token()
            .await
            .context("refresh_token failed")?;
        self.settle().await;
        Ok(())
    }

    /// Flushes both sides and lets queued events dispatch.
    pub async fn settle(&self) {
        self.legacy.flush();
        self.modern.flush();
        self.bus.flush();
        tokio::time::sleep(self.bus.config().batch_timeout()).await;
        self.bus.flush();
    }

    /// Compares synced state across the two sides.
    #[must_use]
    pub fn convergence(&self) -> Convergence {
        let (l, m) = (&self.legacy_container, &self.modern_container);
        let (li, mi) = (l.identity.snapshot(), m.identity.snapshot());
        let (lu, mu) = (l.ui.snapshot(), m.ui.snapshot());
        Convergence {
            identity: li.user == mi.user
                && li.token == mi.token
                && li.authenticated == mi.authenticated,
            sessions: same_sessions(l.sessions.snapshot(), m.sessions.snapshot()),
            ui: lu.theme == mu.theme
                && lu.toasts == mu.toasts
                && lu.modal == mu.modal
                && lu.loading == mu.loading,
        }
    }

    /// Convergence, both statuses and the legacy side's diagnostics.
    #[must_use]
    pub fn summary(&self) -> DemoSummary {
        DemoSummary {
            converged: self.convergence(),
            legacy: self.legacy.status(),
            modern: self.modern.status(),
            diagnostics: self.legacy.diagnostics(),
        }
    }

    /// Disposes both bridges and the bus.
    pub fn dispose(&self) {
        self.legacy.dispose();
        self.modern.dispose();
        self.bus.dispose();
    }
}

fn same_sessions(mut a: SessionsState, mut b: SessionsState) -> bool {
    a.sessions.sort_by_key(|s| s.id);
    b.sessions.sort_by_key(|s| s.id);
    a.sessions == b.sessions && a.active == b.active && a.messages == b.messages
}
