use super::model::{
    LoadingChanged, Modal, ModalClosed, ModalOpened, NewToast, Theme, ThemeChanged, Toast,
    ToastDismissed, ToastShown, UiField, UiMutation, UiPatch, UiState, UiUpdated,
};
use super::store::UiStore;
use crate::dirty::DirtySet;
use crate::provenance::ProvenanceMarkers;
use crate::reconciler::{
    spawn_tick, subscribe_remote, Domain, Reconciler, ReconcilerContext, ReconcilerCore,
};
use statebridge_types::{BridgeResult, ErrorCode, Event, ToastId};
use std::sync::Arc;
use tracing::debug;

struct UiInner {
    core: ReconcilerCore,
    store: Arc<dyn UiStore>,
    dirty: DirtySet<UiField>,
    markers: ProvenanceMarkers<UiField>,
}

impl UiInner {
    fn on_mutation(&self, mutation: &UiMutation, _state: &UiState) {
        // Every field's marker is consumed, not just the first.
        let from_peer = mutation
            .fields
            .iter()
            .filter(|field| self.markers.consume(field))
            .count();
        if from_peer > 0 {
            debug!(source = self.core.source(), "ui write from peer, not re-marked");
            return;
        }
        let synced = mutation.fields.iter().copied().filter(UiField::is_synced);
        self.dirty.mark_all(synced);
    }

    fn flush(&self) -> usize {
        let fields = self.dirty.drain();
        if fields.is_empty() {
            return 0;
        }
        let state = self.store.snapshot();
        self.core.emit(UiUpdated {
            theme: state.theme,
            toasts: state.toasts,
            modal: state.modal,
            loading: state.loading,
            fields,
        });
        1
    }

    fn apply_remote(&self, event: &str, patch: UiPatch) {
        let fields = patch.fields();
        for field in &fields {
            self.markers.mark(*field);
        }
        match self.store.apply_patch(patch) {
            Ok(()) => debug!(event, source = self.core.source(), "applied peer ui change"),
            Err(error) => {
                for field in &fields {
                    self.markers.consume(field);
                }
                self.core.report_patch_failure(event, error);
            }
        }
    }

    fn on_theme_changed(&self, event: &Event<ThemeChanged>) {
        self.apply_remote(event.name(), UiPatch::Theme(event.payload().theme));
    }

    fn on_toast_shown(&self, event: &Event<ToastShown>) {
        self.apply_remote(event.name(), UiPatch::PushToast(event.payload().toast.clone()));
    }

    fn on_toast_dismissed(&self, event: &Event<ToastDismissed>) {
        self.apply_remote(event.name(), UiPatch::RemoveToast(event.payload().id));
    }

    fn on_modal_opened(&self, event: &Event<ModalOpened>) {
        self.apply_remote(event.name(), UiPatch::Modal(Some(event.payload().modal.clone())));
    }

    fn on_modal_closed(&self, event: &Event<ModalClosed>) {
        let open = self.store.snapshot().modal;
        if open.is_some_and(|m| m.id == event.payload().id) {
            self.apply_remote(event.name(), UiPatch::Modal(None));
        }
    }

    fn on_loading_changed(&self, event: &Event<LoadingChanged>) {
        self.apply_remote(event.name(), UiPatch::Loading(event.payload().loading));
    }

    /// Copies only the fields the peer changed. A field with an unflushed
    /// local change keeps the local value; the next flush sends it back.
    fn on_updated(&self, event: &Event<UiUpdated>) {
        let payload = event.payload();
        let fields: Vec<UiField> = payload
            .fields
            .iter()
            .copied()
            .filter(|field| field.is_synced() && !self.dirty.is_dirty(field))
            .collect();
        if fields.is_empty() {
            debug!(source = self.core.source(), "peer ui snapshot has nothing to apply");
            return;
        }
        self.apply_remote(
            event.name(),
            UiPatch::Fields {
                fields,
                theme: payload.theme,
                toasts: payload.toasts.clone(),
                modal: payload.modal.clone(),
                loading: payload.loading,
            },
        );
    }
}

/// Keeps one container's UI state in step with its peer.
///
/// Every `ui:` event is high priority, so peers see UI changes before the
/// operation returns.
#[derive(Clone)]
pub struct UiReconciler {
    inner: Arc<UiInner>,
}

impl UiReconciler {
    /// Binds a reconciler to `store`. Call `initialize` to start syncing.
    #[must_use]
    pub fn new(ctx: ReconcilerContext, store: Arc<dyn UiStore>) -> Self {
        let markers = ProvenanceMarkers::new(
            ctx.config.provenance_ttl(),
            ctx.config.provenance_capacity,
        );
        Self {
            inner: Arc::new(UiInner {
                core: ReconcilerCore::new(ctx, Domain::Ui),
                store,
                dirty: DirtySet::new(),
                markers,
            }),
        }
    }

    /// The store this reconciler watches.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn UiStore> {
        &self.inner.store
    }

    /// Whether `field` has a change not yet published.
    #[must_use]
    pub fn is_dirty(&self, field: UiField) -> bool {
        self.inner.dirty.is_dirty(&field)
    }

    /// Sets the theme and announces it with `ui:themeChanged`.
    pub async fn set_theme(&self, theme: Theme) -> BridgeResult<()> {
        let inner = &self.inner;
        let store = inner.store.clone();
        inner
            .core
            .call_store("ui.setTheme", ErrorCode::UiTheme, || {
                let store = store.clone();
                async move { store.set_theme(theme).await }
            })
            .await?;
        inner.flush();
        inner.core.emit(ThemeChanged { theme });
        Ok(())
    }

    /// Shows a toast and announces it with `ui:toastShown`.
    pub async fn show_toast(&self, toast: NewToast) -> BridgeResult<Toast> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let shown = inner
            .core
            .call_store("ui.showToast", ErrorCode::UiToast, || {
                let store = store.clone();
                let toast = toast.clone();
                async move { store.show_toast(&toast).await }
            })
            .await?;
        inner.flush();
        inner.core.emit(ToastShown {
            toast: shown.clone(),
        });
        Ok(shown)
    }

    /// Dismisses a toast and announces it with `ui:toastDismissed`.
    pub async fn dismiss_toast(&self, id: ToastId) -> BridgeResult<()> {
        let inner = &self.inner;
        let store = inner.store.clone();
        inner
            .core
            .call_store("ui.dismissToast", ErrorCode::UiToast, || {
                let store = store.clone();
                async move { store.dismiss_toast(id).await }
            })
            .await?;
        inner.flush();
        inner.core.emit(ToastDismissed { id });
        Ok(())
    }

    /// Opens a modal and announces it with `ui:modalOpened`.
    pub async fn open_modal(&self, modal: Modal) -> BridgeResult<()> {
        let inner = &self.inner;
        let store = inner.store.clone();
        inner
            .core
            .call_store("ui.openModal", ErrorCode::UiModal, || {
                let store = store.clone();
                let modal = modal.clone();
                async move { store.open_modal(&modal).await }
            })
            .await?;
        inner.flush();
        inner.core.emit(ModalOpened { modal });
        Ok(())
    }

    /// Closes the open modal and announces it with `ui:modalClosed`.
    pub async fn close_modal(&self) -> BridgeResult<Modal> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let closed = inner
            .core
            .call_store("ui.closeModal", ErrorCode::UiModal, || {
                let store = store.clone();
                async move { store.close_modal().await }
            })
            .await?;
        inner.flush();
        inner.core.emit(ModalClosed {
            id: closed.id.clone(),
        });
        Ok(closed)
    }

    /// Sets the loading flag and announces it with `ui:loadingChanged`.
    pub async fn set_loading(&self, loading: bool) -> BridgeResult<()> {
        let inner = &self.inner;
        let store = inner.store.clone();
        inner
            .core
            .call_store("ui.setLoading", ErrorCode::UiLoading, || {
                let store = store.clone();
                async move { store.set_loading(loading).await }
            })
            .await?;
        inner.flush();
        inner.core.emit(LoadingChanged { loading });
        Ok(())
    }
}

impl Reconciler for UiReconciler {
    fn domain(&self) -> Domain {
        Domain::Ui
    }

    fn source(&self) -> &str {
        self.inner.core.source()
    }

    fn initialize(&self) -> BridgeResult<()> {
        let inner = &self.inner;
        if !inner.core.begin_initialize()? {
            return Ok(());
        }
        let weak = Arc::downgrade(inner);
        let hook_target = weak.clone();
        let hook = inner
            .store
            .subscribe(Arc::new(move |mutation: &UiMutation, state: &UiState| {
                if let Some(inner) = hook_target.upgrade() {
                    inner.on_mutation(mutation, state);
                }
            }));

        let ctx = &inner.core.ctx;
        let name = format!("ui:{}", ctx.source);
        let (bus, source) = (&ctx.bus, &ctx.source);
        let subscriptions = vec![
            subscribe_remote(bus, &name, source, weak.clone(), UiInner::on_theme_changed),
            subscribe_remote(bus, &name, source, weak.clone(), UiInner::on_toast_shown),
            subscribe_remote(bus, &name, source, weak.clone(), UiInner::on_toast_dismissed),
            subscribe_remote(bus, &name, source, weak.clone(), UiInner::on_modal_opened),
            subscribe_remote(bus, &name, source, weak.clone(), UiInner::on_modal_closed),
            subscribe_remote(bus, &name, source, weak.clone(), UiInner::on_loading_changed),
            subscribe_remote(bus, &name, source, weak.clone(), UiInner::on_updated),
        ];
        let tick = spawn_tick(weak, ctx.config.tick_interval(), UiInner::flush);
        inner.core.finish_initialize(hook, subscriptions, tick);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.inner.core.is_initialized()
    }

    fn flush(&self) -> usize {
        self.inner.flush()
    }

    fn pending(&self) -> usize {
        self.inner.dirty.len()
    }

    fn dispose(&self) {
        if self.inner.core.dispose() {
            self.inner.dirty.clear();
            self.inner.markers.clear();
        }
    }
}
