use super::model::{
    Credentials, IdentityField, IdentityMutation, IdentityPatch, IdentityState, LoginGrant,
    ProfileUpdate, User,
};
use crate::error::StoreError;
use crate::store::{FailureInjector, Listener, ListenerSet, Unsubscribe};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const SESSION_FIELDS: [IdentityField; 3] = [
    IdentityField::User,
    IdentityField::Token,
    IdentityField::Authenticated,
];

/// A container holding identity state.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Registers a hook called after every committed mutation.
    fn subscribe(&self, listener: Listener<IdentityMutation, IdentityState>) -> Unsubscribe;

    /// Signs in. Fails with `Rejected` on wrong credentials.
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, StoreError>;

    /// Signs out. Succeeds when already signed out.
    async fn logout(&self) -> Result<(), StoreError>;

    /// Issues a new token. Requires a signed-in user.
    async fn refresh_token(&self) -> Result<String, StoreError>;

    /// Changes profile fields of the signed-in user.
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, StoreError>;

    /// Writes state directly. Still notifies mutation hooks.
    fn apply_patch(&self, patch: IdentityPatch) -> Result<(), StoreError>;

    /// Copy of the current state.
    fn snapshot(&self) -> IdentityState;
}

/// In-memory identity store with a fixed set of accounts.
pub struct InMemoryIdentityStore {
    state: Mutex<IdentityState>,
    accounts: Mutex<HashMap<String, (String, User)>>,
    listeners: ListenerSet<IdentityMutation, IdentityState>,
    faults: FailureInjector,
    patch_faults: FailureInjector,
    tokens: AtomicU64,
}

impl InMemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IdentityState::default()),
            accounts: Mutex::new(HashMap::new()),
            listeners: ListenerSet::new(),
            faults: FailureInjector::new(),
            patch_faults: FailureInjector::new(),
            tokens: AtomicU64::new(0),
        }
    }

    /// Adds an account that `login` will accept.
    #[must_use]
    pub fn with_account(self, password: &str, user: User) -> Self {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.email.clone(), (password.to_string(), user));
        self
    }

    /// Failures for the async operations.
    pub fn faults(&self) -> &FailureInjector {
        &self.faults
    }

    /// Failures for `apply_patch`.
    pub fn patch_faults(&self) -> &FailureInjector {
        &self.patch_faults
    }

    /// Toggles the local loading flag. Not a synced field.
    pub fn set_loading(&self, loading: bool) {
        self.commit(&[IdentityField::Loading], |s| s.loading = loading);
    }

    /// Number of attached mutation hooks.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_token(&self) -> String {
        format!("token-{}", self.tokens.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn commit<R>(&self, fields: &[IdentityField], f: impl FnOnce(&mut IdentityState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.lock();
            let result = f(&mut state);
            (result, state.clone())
        };
        self.listeners
            .notify(&IdentityMutation::new(fields.to_vec()), &snapshot);
        result
    }

    fn require_authenticated(&self) -> Result<(), StoreError> {
        if self.lock().authenticated {
            Ok(())
        } else {
            Err(StoreError::Rejected("not authenticated".to_string()))
        }
    }
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    fn subscribe(&self, listener: Listener<IdentityMutation, IdentityState>) -> Unsubscribe {
        self.listeners.subscribe(listener)
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, StoreError> {
        self.faults.check()?;
        let user = {
            let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            match accounts.get(&credentials.email) {
                Some((password, user)) if *password == credentials.password => user.clone(),
                _ => return Err(StoreError::Rejected("invalid credentials".to_string())),
            }
        };
        let grant = LoginGrant {
            user,
            token: self.next_token(),
        };
        let applied = grant.clone();
        self.commit(&SESSION_FIELDS, move |s| {
            s.user = Some(applied.user);
            s.token = Some(applied.token);
            s.authenticated = true;
        });
        Ok(grant)
    }

    async fn logout(&self) -> Result<(), StoreError> {
        self.faults.check()?;
        self.commit(&SESSION_FIELDS, |s| {
            s.user = None;
            s.token = None;
            s.authenticated = false;
        });
        Ok(())
    }

    async fn refresh_token(&self) -> Result<String, StoreError> {
        self.faults.check()?;
        self.require_authenticated()?;
        let token = self.next_token();
        let applied = token.clone();
        self.commit(&[IdentityField::Token], move |s| s.token = Some(applied));
        Ok(token)
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, StoreError> {
        self.faults.check()?;
        self.require_authenticated()?;
        let update = update.clone();
        self.commit(&[IdentityField::User], move |s| {
            let user = s.user.as_mut()?;
            if let Some(name) = update.name {
                user.name = name;
            }
            if let Some(email) = update.email {
                user.email = email;
            }
            if let Some(avatar) = update.avatar {
                user.avatar = Some(avatar);
            }
            Some(user.clone())
        })
        .ok_or_else(|| StoreError::NotFound("user".to_string()))
    }

    fn apply_patch(&self, patch: IdentityPatch) -> Result<(), StoreError> {
        self.patch_faults.check()?;
        match patch {
            IdentityPatch::Login(grant) => self.commit(&SESSION_FIELDS, move |s| {
                s.user = Some(grant.user);
                s.token = Some(grant.token);
                s.authenticated = true;
            }),
            IdentityPatch::Logout => self.commit(&SESSION_FIELDS, |s| {
                s.user = None;
                s.token = None;
                s.authenticated = false;
            }),
            IdentityPatch::Token(token) => {
                self.commit(&[IdentityField::Token], move |s| s.token = Some(token));
            }
            IdentityPatch::Fields {
                fields,
                user,
                token,
                authenticated,
            } => {
                let changed: Vec<IdentityField> =
                    fields.into_iter().filter(IdentityField::is_synced).collect();
                self.commit(&changed, |s| {
                    for field in &changed {
                        match field {
                            IdentityField::User => s.user = user.clone(),
                            IdentityField::Token => s.token = token.clone(),
                            IdentityField::Authenticated => s.authenticated = authenticated,
                            IdentityField::Loading => {}
                        }
                    }
                });
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> IdentityState {
        self.lock().clone()
    }
}
