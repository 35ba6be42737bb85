use serde::{Deserialize, Serialize};
use serde_json::Value;
use statebridge_types::{bus_event, ToastId};
use std::fmt;

/// Color scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Visual style of a toast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

/// A transient notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: ToastId,
    pub message: String,
    pub kind: ToastKind,
    /// How long the toast stays up. `None` means until dismissed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Input for showing a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewToast {
    pub message: String,
    #[serde(default)]
    pub kind: ToastKind,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl NewToast {
    /// An informational toast that stays until dismissed.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Info,
            duration_ms: None,
        }
    }

    /// Sets the style.
    #[must_use]
    pub fn kind(mut self, kind: ToastKind) -> Self {
        self.kind = kind;
        self
    }

    /// Dismisses the toast automatically after `duration_ms`.
    #[must_use]
    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A modal dialog. At most one is open at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Modal {
    /// A modal with no attached data.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
        }
    }

    /// Attaches arbitrary data for the dialog to render.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Everything a UI container holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub theme: Theme,
    pub toasts: Vec<Toast>,
    pub modal: Option<Modal>,
    pub loading: bool,
    /// Layout preference local to each container; never propagated.
    pub sidebar_open: bool,
}

/// UI state fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UiField {
    Theme,
    Toasts,
    Modal,
    Loading,
    Sidebar,
}

impl UiField {
    /// Every field that is propagated.
    pub const SYNCED: [UiField; 4] = [Self::Theme, Self::Toasts, Self::Modal, Self::Loading];

    /// Whether changes to this field are propagated to the peer.
    pub fn is_synced(&self) -> bool {
        !matches!(self, Self::Sidebar)
    }
}

/// Describes one committed UI mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiMutation {
    pub fields: Vec<UiField>,
}

impl UiMutation {
    /// A mutation touching `fields`.
    #[must_use]
    pub fn new(fields: impl Into<Vec<UiField>>) -> Self {
        Self {
            fields: fields.into(),
        }
    }
}

/// Direct writes applied on behalf of the peer container.
#[derive(Debug, Clone, PartialEq)]
pub enum UiPatch {
    /// Sets the theme.
    Theme(Theme),
    /// Adds a toast unless one with the same id is already shown.
    PushToast(Toast),
    /// Removes a toast if present.
    RemoveToast(ToastId),
    /// Opens a modal, or closes it with `None`.
    Modal(Option<Modal>),
    /// Sets the loading flag.
    Loading(bool),
    /// Copies the listed fields from a peer snapshot. Other fields are left
    /// untouched.
    Fields {
        fields: Vec<UiField>,
        theme: Theme,
        toasts: Vec<Toast>,
        modal: Option<Modal>,
        loading: bool,
    },
}

impl UiPatch {
    /// Fields the patch writes.
    pub fn fields(&self) -> Vec<UiField> {
        match self {
            Self::Theme(_) => vec![UiField::Theme],
            Self::PushToast(_) | Self::RemoveToast(_) => vec![UiField::Toasts],
            Self::Modal(_) => vec![UiField::Modal],
            Self::Loading(_) => vec![UiField::Loading],
            Self::Fields { fields, .. } => {
                fields.iter().copied().filter(UiField::is_synced).collect()
            }
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// The theme was changed through the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeChanged {
    pub theme: Theme,
}
bus_event!(ThemeChanged => "ui:themeChanged");

/// A toast was shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastShown {
    pub toast: Toast,
}
bus_event!(ToastShown => "ui:toastShown");

/// A toast was dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastDismissed {
    pub id: ToastId,
}
bus_event!(ToastDismissed => "ui:toastDismissed");

/// A modal was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalOpened {
    pub modal: Modal,
}
bus_event!(ModalOpened => "ui:modalOpened");

/// The modal with `id` was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalClosed {
    pub id: String,
}
bus_event!(ModalClosed => "ui:modalClosed");

/// The loading flag changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingChanged {
    pub loading: bool,
}
bus_event!(LoadingChanged => "ui:loadingChanged");

/// Snapshot of the synced UI fields, published on flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiUpdated {
    pub theme: Theme,
    pub toasts: Vec<Toast>,
    pub modal: Option<Modal>,
    pub loading: bool,
    /// Fields that were dirty.
    pub fields: Vec<UiField>,
}
bus_event!(UiUpdated => "ui:updated");
