use super::model::{Modal, NewToast, Theme, Toast, UiField, UiMutation, UiPatch, UiState};
use crate::error::StoreError;
use crate::store::{FailureInjector, Listener, ListenerSet, Unsubscribe};
use async_trait::async_trait;
use statebridge_types::ToastId;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A container holding UI state.
#[async_trait]
pub trait UiStore: Send + Sync {
    /// Registers a hook called after every committed mutation.
    fn subscribe(&self, listener: Listener<UiMutation, UiState>) -> Unsubscribe;

    /// Sets the theme.
    async fn set_theme(&self, theme: Theme) -> Result<(), StoreError>;

    /// Shows a toast and returns it with its id.
    async fn show_toast(&self, toast: &NewToast) -> Result<Toast, StoreError>;

    /// Dismisses a toast. Fails with `NotFound` if it is not shown.
    async fn dismiss_toast(&self, id: ToastId) -> Result<(), StoreError>;

    /// Opens a modal, replacing any open one.
    async fn open_modal(&self, modal: &Modal) -> Result<(), StoreError>;

    /// Closes the open modal and returns it.
    async fn close_modal(&self) -> Result<Modal, StoreError>;

    /// Sets the loading flag.
    async fn set_loading(&self, loading: bool) -> Result<(), StoreError>;

    /// Writes state directly. Still notifies mutation hooks.
    fn apply_patch(&self, patch: UiPatch) -> Result<(), StoreError>;

    /// Copy of the current state.
    fn snapshot(&self) -> UiState;
}

/// In-memory UI store.
pub struct InMemoryUiStore {
    state: Mutex<UiState>,
    listeners: ListenerSet<UiMutation, UiState>,
    faults: FailureInjector,
    patch_faults: FailureInjector,
}

impl InMemoryUiStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(UiState::default()),
            listeners: ListenerSet::new(),
            faults: FailureInjector::new(),
            patch_faults: FailureInjector::new(),
        }
    }

    /// Failures for the async operations.
    pub fn faults(&self) -> &FailureInjector {
        &self.faults
    }

    /// Failures for `apply_patch`.
    pub fn patch_faults(&self) -> &FailureInjector {
        &self.patch_faults
    }

    /// Opens or closes the sidebar. Not a synced field.
    pub fn set_sidebar(&self, open: bool) {
        self.commit(&[UiField::Sidebar], |s| s.sidebar_open = open);
    }

    /// Number of attached mutation hooks.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, UiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit<R>(&self, fields: &[UiField], f: impl FnOnce(&mut UiState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.lock();
            let result = f(&mut state);
            (result, state.clone())
        };
        self.listeners
            .notify(&UiMutation::new(fields.to_vec()), &snapshot);
        result
    }

    fn has_toast(&self, id: ToastId) -> bool {
        self.lock().toasts.iter().any(|t| t.id == id)
    }
}

impl Default for InMemoryUiStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UiStore for InMemoryUiStore {
    fn subscribe(&self, listener: Listener<UiMutation, UiState>) -> Unsubscribe {
        self.listeners.subscribe(listener)
    }

    async fn set_theme(&self, theme: Theme) -> Result<(), StoreError> {
        self.faults.check()?;
        self.commit(&[UiField::Theme], |s| s.theme = theme);
        Ok(())
    }

    async fn show_toast(&self, toast: &NewToast) -> Result<Toast, StoreError> {
        self.faults.check()?;
        if toast.message.trim().is_empty() {
            return Err(StoreError::Rejected("toast message is empty".to_string()));
        }
        let toast = Toast {
            id: ToastId::new(),
            message: toast.message.clone(),
            kind: toast.kind,
            duration_ms: toast.duration_ms,
        };
        let shown = toast.clone();
        self.commit(&[UiField::Toasts], move |s| s.toasts.push(shown));
        Ok(toast)
    }

    async fn dismiss_toast(&self, id: ToastId) -> Result<(), StoreError> {
        self.faults.check()?;
        if !self.has_toast(id) {
            return Err(StoreError::NotFound(format!("toast {id}")));
        }
        self.commit(&[UiField::Toasts], |s| s.toasts.retain(|t| t.id != id));
        Ok(())
    }

    async fn open_modal(&self, modal: &Modal) -> Result<(), StoreError> {
        self.faults.check()?;
        if modal.id.is_empty() {
            return Err(StoreError::Rejected("modal id is empty".to_string()));
        }
        let modal = modal.clone();
        self.commit(&[UiField::Modal], move |s| s.modal = Some(modal));
        Ok(())
    }

    async fn close_modal(&self) -> Result<Modal, StoreError> {
        self.faults.check()?;
        if self.lock().modal.is_none() {
            return Err(StoreError::NotFound("open modal".to_string()));
        }
        self.commit(&[UiField::Modal], |s| s.modal.take())
            .ok_or_else(|| StoreError::NotFound("open modal".to_string()))
    }

    async fn set_loading(&self, loading: bool) -> Result<(), StoreError> {
        self.faults.check()?;
        self.commit(&[UiField::Loading], |s| s.loading = loading);
        Ok(())
    }

    fn apply_patch(&self, patch: UiPatch) -> Result<(), StoreError> {
        self.patch_faults.check()?;
        let fields = patch.fields();
        let written = fields.clone();
        self.commit(&fields, move |s| match patch {
            UiPatch::Theme(theme) => s.theme = theme,
            UiPatch::PushToast(toast) => {
                if !s.toasts.iter().any(|t| t.id == toast.id) {
                    s.toasts.push(toast);
                }
            }
            UiPatch::RemoveToast(id) => s.toasts.retain(|t| t.id != id),
            UiPatch::Modal(modal) => s.modal = modal,
            UiPatch::Loading(loading) => s.loading = loading,
            UiPatch::Fields {
                theme,
                toasts,
                modal,
                loading,
                ..
            } => {
                for field in &written {
                    match field {
                        UiField::Theme => s.theme = theme,
                        UiField::Toasts => s.toasts = toasts.clone(),
                        UiField::Modal => s.modal = modal.clone(),
                        UiField::Loading => s.loading = loading,
                        UiField::Sidebar => {}
                    }
                }
            }
        });
        Ok(())
    }

    fn snapshot(&self) -> UiState {
        self.lock().clone()
    }
}
