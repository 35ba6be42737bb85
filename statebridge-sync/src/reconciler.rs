//! Machinery shared by the domain reconcilers.

use crate::config::ReconcilerConfig;
use crate::error::StoreError;
use crate::store::Unsubscribe;
use serde::{Deserialize, Serialize};
use statebridge_bus::{EventBus, Subscription};
use statebridge_diagnostics::{
    with_retry, ComponentRegistry, HealthStatus, LogBuffer, Logger, PerfTracker, StatusUpdate,
};
use statebridge_types::{BridgeError, BridgeResult, BusEvent, ErrorCode, Event};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The synchronized domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Identity,
    Sessions,
    Ui,
}

impl Domain {
    /// Lowercase name used in component names and status maps.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sessions => "sessions",
            Self::Ui => "ui",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common lifecycle of a domain reconciler.
pub trait Reconciler: Send + Sync {
    /// The domain this reconciler owns.
    fn domain(&self) -> Domain;

    /// Source tag this reconciler stamps on its events.
    fn source(&self) -> &str;

    /// Hooks the store, subscribes to peer events and starts the tick.
    /// Idempotent. Fails if there is no Tokio runtime or after disposal.
    fn initialize(&self) -> BridgeResult<()>;

    /// Whether `initialize` has run.
    fn is_initialized(&self) -> bool;

    /// Publishes every dirty entity now. Returns the number of events emitted.
    fn flush(&self) -> usize;

    /// Number of dirty entries waiting for a flush.
    fn pending(&self) -> usize;

    /// Detaches from the store and bus, stops the tick and clears state.
    fn dispose(&self);
}

/// What a reconciler needs from its surroundings.
#[derive(Clone)]
pub struct ReconcilerContext {
    /// Tag stamped on emitted events and used to drop their echo.
    pub source: String,
    /// Bus shared with the peer.
    pub bus: EventBus,
    /// Tick, provenance and retry settings.
    pub config: ReconcilerConfig,
    /// Parent logger; each reconciler takes a child of it.
    pub logger: Logger,
    /// Where component health is reported, if anywhere.
    pub registry: Option<Arc<ComponentRegistry>>,
    /// Latency tracking for store calls, if enabled.
    pub perf: Option<Arc<PerfTracker>>,
}

impl ReconcilerContext {
    /// A context with its own log buffer and no health reporting.
    pub fn new(source: &str, bus: EventBus, config: ReconcilerConfig) -> Self {
        Self {
            source: source.to_string(),
            bus,
            config,
            logger: Logger::new("bridge", LogBuffer::default()),
            registry: None,
            perf: None,
        }
    }

    /// Logs through `logger` instead of a private buffer.
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Reports component health to `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Times store calls with `perf`.
    #[must_use]
    pub fn with_perf(mut self, perf: Arc<PerfTracker>) -> Self {
        self.perf = Some(perf);
        self
    }
}

/// Context plus lifecycle state, embedded in each domain's inner state.
pub(crate) struct ReconcilerCore {
    pub ctx: ReconcilerContext,
    pub domain: Domain,
    component: String,
    logger: Logger,
    initialized: AtomicBool,
    disposed: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
    store_hook: Mutex<Option<Unsubscribe>>,
    tick: Mutex<Option<JoinHandle<()>>>,
}

impl ReconcilerCore {
    /// Creates the core. The component name is `"<domain>:<source>"`.
    pub fn new(ctx: ReconcilerContext, domain: Domain) -> Self {
        let component = format!("{}:{}", domain, ctx.source);
        let logger = ctx.logger.child(&component);
        Self {
            ctx,
            domain,
            component,
            logger,
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            store_hook: Mutex::new(None),
            tick: Mutex::new(None),
        }
    }

    /// Source tag of the owning reconciler.
    pub fn source(&self) -> &str {
        &self.ctx.source
    }

    /// Logger scoped to this component.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Whether initialization was claimed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether `dispose` has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Claims initialization. Returns `Ok(false)` if already initialized.
    pub fn begin_initialize(&self) -> BridgeResult<bool> {
        if self.is_disposed() {
            return Err(self.disposed_error());
        }
        if Handle::try_current().is_err() {
            return Err(BridgeError::new(
                ErrorCode::OperationAborted,
                format!("{} needs a Tokio runtime to initialize", self.component),
            ));
        }
        Ok(!self.initialized.swap(true, Ordering::SeqCst))
    }

    /// Stores the handles created during initialization and registers
    /// the component as healthy.
    pub fn finish_initialize(
        &self,
        hook: Unsubscribe,
        subscriptions: Vec<Subscription>,
        tick: JoinHandle<()>,
    ) {
        *self.store_hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(subscriptions);
        *self.tick.lock().unwrap_or_else(PoisonError::into_inner) = Some(tick);
        if let Some(registry) = &self.ctx.registry {
            registry.register_component(&self.component, HealthStatus::Healthy);
        }
        info!(component = %self.component, "reconciler initialized");
    }

    /// Tears down hooks, subscriptions and the tick. Returns false if
    /// already disposed.
    pub fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(hook) = self
            .store_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            hook.unsubscribe();
        }
        for subscription in self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            subscription.unsubscribe();
        }
        if let Some(tick) = self.tick.lock().unwrap_or_else(PoisonError::into_inner).take() {
            tick.abort();
        }
        if let Some(registry) = &self.ctx.registry {
            registry.unregister_component(&self.component);
        }
        info!(component = %self.component, "reconciler disposed");
        true
    }

    /// The error returned by operations after disposal.
    pub fn disposed_error(&self) -> BridgeError {
        BridgeError::new(
            ErrorCode::OperationAborted,
            format!("{} has been disposed", self.component),
        )
        .recoverable(false)
    }

    /// Emits an event tagged with this reconciler's source.
    pub fn emit<E: BusEvent>(&self, payload: E) {
        self.ctx.bus.emit_from(&self.ctx.source, payload);
    }

    /// Runs a store call under the retry policy, timing it and reporting the
    /// outcome to the registry.
    pub async fn call_store<T, F, Fut>(
        &self,
        operation: &'static str,
        code: ErrorCode,
        mut op: F,
    ) -> BridgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        if self.is_disposed() {
            return Err(self.disposed_error());
        }
        let run = with_retry(&self.ctx.config.retry, || {
            let call = op();
            async move { call.await.map_err(|e| e.into_bridge(code, operation)) }
        });
        let result = match &self.ctx.perf {
            Some(perf) => perf.measure(operation, run).await,
            None => run.await,
        };
        match &result {
            Ok(_) => self.report_healthy(),
            Err(error) if error.recoverable || error.is(ErrorCode::RetryLimitExceeded) => {
                self.report_degraded(error.clone());
            }
            Err(error) => {
                self.logger.info(&format!("{operation} refused: {error}"));
            }
        }
        result
    }

    /// Marks the component healthy.
    pub fn report_healthy(&self) {
        if let Some(registry) = &self.ctx.registry {
            registry.update_status(&self.component, StatusUpdate::healthy());
        }
    }

    /// Logs `error` and marks the component degraded.
    pub fn report_degraded(&self, error: BridgeError) {
        self.logger.warn(&error.to_string());
        if let Some(registry) = &self.ctx.registry {
            registry.update_status(&self.component, StatusUpdate::degraded(error));
        }
    }

    /// Reports a failed direct patch for an incoming event.
    pub fn report_patch_failure(&self, event: &str, error: StoreError) {
        let error = BridgeError::new(
            ErrorCode::SyncFailed,
            format!("applying {event} failed: {error}"),
        )
        .with_detail("event", event)
        .with_cause(error);
        self.report_degraded(error);
    }
}

/// Subscribes `apply` to `E`, skipping events emitted by `source`.
///
/// The handler holds only a weak reference to the reconciler state.
pub(crate) fn subscribe_remote<E, I>(
    bus: &EventBus,
    subscriber: &str,
    source: &str,
    inner: Weak<I>,
    apply: fn(&I, &Event<E>),
) -> Subscription
where
    E: BusEvent,
    I: Send + Sync + 'static,
{
    let source = source.to_string();
    bus.on_named(subscriber, move |event: &Event<E>| {
        if event.is_from(&source) {
            return;
        }
        if let Some(inner) = inner.upgrade() {
            apply(&inner, event);
        }
    })
}

/// Spawns the periodic flush. Stops once the reconciler is dropped.
pub(crate) fn spawn_tick<I>(inner: Weak<I>, period: Duration, flush: fn(&I) -> usize) -> JoinHandle<()>
where
    I: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let flushed = flush(&inner);
            if flushed > 0 {
                debug!(flushed, "reconciliation tick");
            }
        }
    })
}
