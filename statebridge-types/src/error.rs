//! The cross-boundary error taxonomy.
//!
//! Every operation that crosses the bridge boundary reports failure as a
//! [`BridgeError`] carrying a code from a closed set. Codes are grouped by
//! [`ErrorDomain`] so diagnostics can roll failures up per concern.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Grouping of error codes by the concern that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    Communication,
    Validation,
    Sync,
    Auth,
    Session,
    Ui,
    Timeout,
    Retry,
}

/// Closed set of error codes, one per leaf concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ── Communication ───────────────────────────────────────────
    /// The bus or a peer could not be reached.
    Communication,
    /// An event failed validation before dispatch.
    EventValidation,
    /// A subscription could not be created or was used after disposal.
    Subscription,

    // ── Auth ────────────────────────────────────────────────────
    AuthLogin,
    AuthLogout,
    AuthRefresh,
    /// Changing the signed-in user's profile failed.
    AuthUpdate,

    // ── Session ─────────────────────────────────────────────────
    SessionCreate,
    SessionUpdate,
    SessionDelete,
    SessionSelect,
    MessageSend,
    MessageDelete,

    // ── Sync ────────────────────────────────────────────────────
    /// Propagating state between containers failed.
    SyncFailed,
    /// The two containers disagree in a way the bridge cannot reconcile.
    DataMismatch,

    // ── UI ──────────────────────────────────────────────────────
    UiTheme,
    UiModal,
    UiToast,
    UiLoading,

    // ── Control flow ────────────────────────────────────────────
    Timeout,
    OperationAborted,
    RetryLimitExceeded,
}

impl ErrorCode {
    /// Returns the domain this code belongs to.
    #[must_use]
    pub const fn domain(&self) -> ErrorDomain {
        match self {
            Self::Communication | Self::Subscription => ErrorDomain::Communication,
            Self::EventValidation => ErrorDomain::Validation,
            Self::AuthLogin | Self::AuthLogout | Self::AuthRefresh | Self::AuthUpdate => {
                ErrorDomain::Auth
            },
            Self::SessionCreate
            | Self::SessionUpdate
            | Self::SessionDelete
            | Self::SessionSelect
            | Self::MessageSend
            | Self::MessageDelete => ErrorDomain::Session,
            Self::SyncFailed | Self::DataMismatch => ErrorDomain::Sync,
            Self::UiTheme | Self::UiModal | Self::UiToast | Self::UiLoading => ErrorDomain::Ui,
            Self::Timeout | Self::OperationAborted => ErrorDomain::Timeout,
            Self::RetryLimitExceeded => ErrorDomain::Retry,
        }
    }

    /// Whether failures with this code are worth retrying unless the
    /// producer says otherwise.
    #[must_use]
    pub const fn is_recoverable_by_default(&self) -> bool {
        matches!(self, Self::Communication | Self::SyncFailed | Self::Timeout)
    }

    /// Stable wire name of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Communication => "COMMUNICATION",
            Self::EventValidation => "EVENT_VALIDATION",
            Self::Subscription => "SUBSCRIPTION",
            Self::AuthLogin => "AUTH_LOGIN",
            Self::AuthLogout => "AUTH_LOGOUT",
            Self::AuthRefresh => "AUTH_REFRESH",
            Self::AuthUpdate => "AUTH_UPDATE",
            Self::SessionCreate => "SESSION_CREATE",
            Self::SessionUpdate => "SESSION_UPDATE",
            Self::SessionDelete => "SESSION_DELETE",
            Self::SessionSelect => "SESSION_SELECT",
            Self::MessageSend => "MESSAGE_SEND",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::SyncFailed => "SYNC_FAILED",
            Self::DataMismatch => "DATA_MISMATCH",
            Self::UiTheme => "UI_THEME",
            Self::UiModal => "UI_MODAL",
            Self::UiToast => "UI_TOAST",
            Self::UiLoading => "UI_LOADING",
            Self::Timeout => "TIMEOUT",
            Self::OperationAborted => "OPERATION_ABORTED",
            Self::RetryLimitExceeded => "RETRY_LIMIT_EXCEEDED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, clonable underlying cause of a [`BridgeError`].
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A failure reported across the bridge boundary.
///
/// Cloning is cheap: the cause is reference-counted so the same error can be
/// stored in component status and returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct BridgeError {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Structured context for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    /// The underlying error, kept for diagnostics.
    #[serde(skip)]
    #[source]
    pub cause: Option<Cause>,
    /// Whether a retry may succeed.
    pub recoverable: bool,
}

impl BridgeError {
    /// Creates an error whose recoverability follows the code's default.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            cause: None,
            recoverable: code.is_recoverable_by_default(),
        }
    }

    /// Attaches structured details, replacing any existing ones.
    #[must_use]
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// Adds a single detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attaches an already shared cause.
    #[must_use]
    pub fn with_shared_cause(mut self, cause: Cause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Overrides recoverability.
    #[must_use]
    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Returns true if this error carries the given code.
    #[must_use]
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Returns the cause, if any, as a plain error reference.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl PartialEq for BridgeError {
    /// Errors compare by code, message, details and recoverability. Causes
    /// are opaque and compared by identity.
    fn eq(&self, other: &Self) -> bool {
        let same_cause = match (&self.cause, &other.cause) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.code == other.code
            && self.message == other.message
            && self.details == other.details
            && self.recoverable == other.recoverable
            && same_cause
    }
}
