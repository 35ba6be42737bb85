use serde::{Deserialize, Serialize};
use statebridge_types::bus_event;
use std::fmt;

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Email and password for a login. The password is redacted from
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Builds credentials from their parts.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What a successful login yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginGrant {
    pub user: User,
    pub token: String,
}

/// Profile fields to change; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

/// Everything an identity container holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityState {
    pub user: Option<User>,
    pub token: Option<String>,
    pub authenticated: bool,
    /// Local request state; never propagated.
    pub loading: bool,
}

/// Identity state fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdentityField {
    User,
    Token,
    Authenticated,
    Loading,
}

impl IdentityField {
    /// Whether changes to this field are propagated to the peer.
    pub fn is_synced(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Describes one committed identity mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMutation {
    pub fields: Vec<IdentityField>,
}

impl IdentityMutation {
    /// A mutation touching `fields`.
    #[must_use]
    pub fn new(fields: impl Into<Vec<IdentityField>>) -> Self {
        Self {
            fields: fields.into(),
        }
    }
}

/// Direct writes applied on behalf of the peer container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityPatch {
    /// Signs in with the peer's user and token.
    Login(LoginGrant),
    /// Signs out.
    Logout,
    /// Replaces the token.
    Token(String),
    /// Copies the listed fields from a peer snapshot. Other fields are left
    /// untouched.
    Fields {
        fields: Vec<IdentityField>,
        user: Option<User>,
        token: Option<String>,
        authenticated: bool,
    },
}

// ── Events ───────────────────────────────────────────────────────

/// A user signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLogin {
    pub user: User,
    pub token: String,
}
bus_event!(AuthLogin => "auth:login");

/// The user signed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthLogout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}
bus_event!(AuthLogout => "auth:logout");

/// The access token was renewed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRefreshed {
    pub token: String,
}
bus_event!(TokenRefreshed => "auth:tokenRefreshed");

/// Snapshot of the synced identity fields, published on flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUpdated {
    pub user: Option<User>,
    pub token: Option<String>,
    pub authenticated: bool,
    /// Fields that were dirty.
    pub fields: Vec<IdentityField>,
}
bus_event!(AuthUpdated => "auth:updated");
