use super::model::{
    AuthLogin, AuthLogout, AuthUpdated, Credentials, IdentityField, IdentityMutation,
    IdentityPatch, IdentityState, LoginGrant, ProfileUpdate, TokenRefreshed, User,
};
use super::store::IdentityStore;
use crate::dirty::DirtySet;
use crate::provenance::ProvenanceMarkers;
use crate::reconciler::{
    spawn_tick, subscribe_remote, Domain, Reconciler, ReconcilerContext, ReconcilerCore,
};
use statebridge_types::{BridgeResult, ErrorCode, Event};
use std::sync::Arc;
use tracing::debug;

/// Identity is a single entity, so provenance has a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IdentityKey;

struct IdentityInner {
    core: ReconcilerCore,
    store: Arc<dyn IdentityStore>,
    dirty: DirtySet<IdentityField>,
    markers: ProvenanceMarkers<IdentityKey>,
}

impl IdentityInner {
    fn on_mutation(&self, mutation: &IdentityMutation, _state: &IdentityState) {
        if self.markers.consume(&IdentityKey) {
            debug!(source = self.core.source(), "identity write from peer, not re-marked");
            return;
        }
        let synced = mutation.fields.iter().copied().filter(IdentityField::is_synced);
        self.dirty.mark_all(synced);
    }

    /// Publishes the synced fields if any are dirty.
    fn flush(&self) -> usize {
        let fields = self.dirty.drain();
        if fields.is_empty() {
            return 0;
        }
        let state = self.store.snapshot();
        self.core.emit(AuthUpdated {
            user: state.user,
            token: state.token,
            authenticated: state.authenticated,
            fields,
        });
        1
    }

    fn apply_remote(&self, event: &str, patch: IdentityPatch) {
        self.markers.mark(IdentityKey);
        match self.store.apply_patch(patch) {
            Ok(()) => debug!(event, source = self.core.source(), "applied peer identity change"),
            Err(error) => {
                self.markers.consume(&IdentityKey);
                self.core.report_patch_failure(event, error);
            }
        }
    }

    fn on_login(&self, event: &Event<AuthLogin>) {
        let AuthLogin { user, token } = event.payload().clone();
        self.apply_remote(event.name(), IdentityPatch::Login(LoginGrant { user, token }));
    }

    fn on_logout(&self, event: &Event<AuthLogout>) {
        self.apply_remote(event.name(), IdentityPatch::Logout);
    }

    fn on_token_refreshed(&self, event: &Event<TokenRefreshed>) {
        self.apply_remote(event.name(), IdentityPatch::Token(event.payload().token.clone()));
    }

    /// Copies only the fields the peer changed. A field with an unflushed
    /// local change keeps the local value; the next flush sends it back.
    fn on_updated(&self, event: &Event<AuthUpdated>) {
        let payload = event.payload();
        let fields: Vec<IdentityField> = payload
            .fields
            .iter()
            .copied()
            .filter(|field| field.is_synced() && !self.dirty.is_dirty(field))
            .collect();
        if fields.is_empty() {
            debug!(source = self.core.source(), "peer identity snapshot has nothing to apply");
            return;
        }
        self.apply_remote(
            event.name(),
            IdentityPatch::Fields {
                fields,
                user: payload.user.clone(),
                token: payload.token.clone(),
                authenticated: payload.authenticated,
            },
        );
    }
}

/// Keeps one container's identity in step with its peer.
#[derive(Clone)]
pub struct IdentityReconciler {
    inner: Arc<IdentityInner>,
}

impl IdentityReconciler {
    /// Binds a reconciler to `store`. Call `initialize` to start syncing.
    #[must_use]
    pub fn new(ctx: ReconcilerContext, store: Arc<dyn IdentityStore>) -> Self {
        let markers = ProvenanceMarkers::new(
            ctx.config.provenance_ttl(),
            ctx.config.provenance_capacity,
        );
        Self {
            inner: Arc::new(IdentityInner {
                core: ReconcilerCore::new(ctx, Domain::Identity),
                store,
                dirty: DirtySet::new(),
                markers,
            }),
        }
    }

    /// The store this reconciler watches.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.inner.store
    }

    /// Whether `field` has a change not yet published.
    #[must_use]
    pub fn is_dirty(&self, field: IdentityField) -> bool {
        self.inner.dirty.is_dirty(&field)
    }

    /// Signs in and announces it with `auth:login`.
    pub async fn login(&self, credentials: Credentials) -> BridgeResult<User> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let grant = inner
            .core
            .call_store("auth.login", ErrorCode::AuthLogin, || {
                let store = store.clone();
                let credentials = credentials.clone();
                async move { store.login(&credentials).await }
            })
            .await?;
        inner.flush();
        inner.core.emit(AuthLogin {
            user: grant.user.clone(),
            token: grant.token,
        });
        Ok(grant.user)
    }

    /// Signs out and announces it with `auth:logout`.
    pub async fn logout(&self) -> BridgeResult<()> {
        let inner = &self.inner;
        let user_id = inner.store.snapshot().user.map(|u| u.id);
        let store = inner.store.clone();
        inner
            .core
            .call_store("auth.logout", ErrorCode::AuthLogout, || {
                let store = store.clone();
                async move { store.logout().await }
            })
            .await?;
        inner.flush();
        inner.core.emit(AuthLogout { user_id });
        Ok(())
    }

    /// Renews the token and announces it with `auth:tokenRefreshed`.
    pub async fn refresh_token(&self) -> BridgeResult<String> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let token = inner
            .core
            .call_store("auth.refreshToken", ErrorCode::AuthRefresh, || {
                let store = store.clone();
                async move { store.refresh_token().await }
            })
            .await?;
        inner.flush();
        inner.core.emit(TokenRefreshed {
            token: token.clone(),
        });
        Ok(token)
    }

    /// Changes profile fields. Peers learn of it through `auth:updated`.
    pub async fn update_profile(&self, update: ProfileUpdate) -> BridgeResult<User> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let user = inner
            .core
            .call_store("auth.updateProfile", ErrorCode::AuthUpdate, || {
                let store = store.clone();
                let update = update.clone();
                async move { store.update_profile(&update).await }
            })
            .await?;
        inner.flush();
        Ok(user)
    }
}

impl Reconciler for IdentityReconciler {
    fn domain(&self) -> Domain {
        Domain::Identity
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
        let hook = inner.store.subscribe(Arc::new(move |mutation: &IdentityMutation, state: &IdentityState| {
            if let Some(inner) = hook_target.upgrade() {
                inner.on_mutation(mutation, state);
            }
        }));

        let ctx = &inner.core.ctx;
        let name = format!("identity:{}", ctx.source);
        let subscriptions = vec![
            subscribe_remote(&ctx.bus, &name, &ctx.source, weak.clone(), IdentityInner::on_login),
            subscribe_remote(&ctx.bus, &name, &ctx.source, weak.clone(), IdentityInner::on_logout),
            subscribe_remote(
                &ctx.bus,
                &name,
                &ctx.source,
                weak.clone(),
                IdentityInner::on_token_refreshed,
            ),
            subscribe_remote(&ctx.bus, &name, &ctx.source, weak.clone(), IdentityInner::on_updated),
        ];
        let tick = spawn_tick(weak, ctx.config.tick_interval(), IdentityInner::flush);
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
