//! UI: theme, toasts, the open modal and the global loading flag.

mod model;
mod reconciler;
mod store;

pub use model::{
    LoadingChanged, Modal, ModalClosed, ModalOpened, NewToast, Theme, ThemeChanged, Toast,
    ToastDismissed, ToastKind, ToastShown, UiField, UiMutation, UiPatch, UiState, UiUpdated,
};
pub use reconciler::UiReconciler;
pub use store::{InMemoryUiStore, UiStore};
