use super::model::{
    Message, MessageDeleted, MessageSent, MessagesUpdated, NewMessage, NewSession, Session,
    SessionChanges, SessionCreated, SessionDeleted, SessionMutation, SessionPatch,
    SessionSelected, SessionUpdated, SessionsState,
};
use super::store::SessionStore;
use crate::dirty::{DirtySet, NestedDirtySet};
use crate::provenance::ProvenanceMarkers;
use crate::reconciler::{
    spawn_tick, subscribe_remote, Domain, Reconciler, ReconcilerContext, ReconcilerCore,
};
use statebridge_types::{BridgeResult, ErrorCode, Event, MessageId, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What a peer write touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SessionKey {
    Session(SessionId),
    Active,
    Messages(SessionId),
}

struct SessionsInner {
    core: ReconcilerCore,
    store: Arc<dyn SessionStore>,
    sessions: DirtySet<SessionId>,
    messages: NestedDirtySet<SessionId, MessageId>,
    active: AtomicBool,
    markers: ProvenanceMarkers<SessionKey>,
}

impl SessionsInner {
    fn on_mutation(&self, mutation: &SessionMutation, state: &SessionsState) {
        let key = match mutation {
            SessionMutation::Collection { changed } => changed.map(SessionKey::Session),
            SessionMutation::ActiveSession => Some(SessionKey::Active),
            SessionMutation::Messages { session, .. } => Some(SessionKey::Messages(*session)),
            SessionMutation::Draft { .. } => return,
        };
        if let Some(key) = key {
            if self.markers.consume(&key) {
                debug!(source = self.core.source(), ?key, "session write from peer, not re-marked");
                return;
            }
        }
        match mutation {
            SessionMutation::Collection { changed } => {
                // Any collection change invalidates every session.
                self.sessions.mark_all(state.sessions.iter().map(|s| s.id));
                if let Some(id) = changed {
                    self.sessions.mark(*id);
                }
            }
            SessionMutation::ActiveSession => self.active.store(true, Ordering::SeqCst),
            SessionMutation::Messages { session, message } => match message {
                Some(message) => {
                    self.messages.mark(*session, *message);
                }
                None => self.messages.mark_parent(*session),
            },
            SessionMutation::Draft { .. } => {}
        }
    }

    fn flush(&self) -> usize {
        let mut emitted = 0;
        for id in self.sessions.drain() {
            emitted += self.publish_session(id);
        }
        for (session, changed) in self.messages.drain() {
            emitted += self.publish_messages(session, changed);
        }
        emitted + self.flush_active()
    }

    fn flush_session(&self, id: SessionId) -> usize {
        if self.sessions.take(&id) {
            self.publish_session(id)
        } else {
            0
        }
    }

    fn flush_messages(&self, session: SessionId) -> usize {
        match self.messages.take(&session) {
            Some(changed) => self.publish_messages(session, changed),
            None => 0,
        }
    }

    fn flush_active(&self) -> usize {
        if !self.active.swap(false, Ordering::SeqCst) {
            return 0;
        }
        let session_id = self.store.snapshot().active;
        self.core.emit(SessionSelected { session_id });
        1
    }

    /// A dirty id that is no longer in the store was deleted.
    fn publish_session(&self, id: SessionId) -> usize {
        match self.store.snapshot().session(&id).cloned() {
            Some(session) => self.core.emit(SessionUpdated { session }),
            None => self.core.emit(SessionDeleted { session_id: id }),
        }
        1
    }

    fn publish_messages(&self, session: SessionId, changed: Vec<MessageId>) -> usize {
        let state = self.store.snapshot();
        if state.session(&session).is_none() {
            return 0;
        }
        self.core.emit(MessagesUpdated {
            session_id: session,
            messages: state.messages_for(&session).to_vec(),
            changed,
        });
        1
    }

    fn apply_remote(&self, event: &str, key: SessionKey, patch: SessionPatch) {
        self.markers.mark(key);
        match self.store.apply_patch(patch) {
            Ok(()) => debug!(event, source = self.core.source(), "applied peer session change"),
            Err(error) => {
                self.markers.consume(&key);
                self.core.report_patch_failure(event, error);
            }
        }
    }

    fn upsert_remote(&self, event: &str, session: &Session) {
        self.apply_remote(
            event,
            SessionKey::Session(session.id),
            SessionPatch::Upsert(session.clone()),
        );
    }

    fn on_created(&self, event: &Event<SessionCreated>) {
        self.upsert_remote(event.name(), &event.payload().session);
    }

    fn on_updated(&self, event: &Event<SessionUpdated>) {
        self.upsert_remote(event.name(), &event.payload().session);
    }

    fn on_deleted(&self, event: &Event<SessionDeleted>) {
        let id = event.payload().session_id;
        if self.store.snapshot().session(&id).is_none() {
            return;
        }
        self.apply_remote(event.name(), SessionKey::Session(id), SessionPatch::Remove(id));
    }

    fn on_selected(&self, event: &Event<SessionSelected>) {
        let id = event.payload().session_id;
        if self.store.snapshot().active == id {
            return;
        }
        self.apply_remote(event.name(), SessionKey::Active, SessionPatch::Select(id));
    }

    fn on_message_sent(&self, event: &Event<MessageSent>) {
        let message = &event.payload().message;
        self.apply_remote(
            event.name(),
            SessionKey::Messages(message.session_id),
            SessionPatch::PutMessage(message.clone()),
        );
    }

    fn on_message_deleted(&self, event: &Event<MessageDeleted>) {
        let MessageDeleted {
            session_id,
            message_id,
        } = event.payload().clone();
        let present = self
            .store
            .snapshot()
            .messages_for(&session_id)
            .iter()
            .any(|m| m.id == message_id);
        if !present {
            return;
        }
        self.apply_remote(
            event.name(),
            SessionKey::Messages(session_id),
            SessionPatch::RemoveMessage {
                session: session_id,
                message: message_id,
            },
        );
    }

    /// Upserts the peer's list. Messages only this side has are kept.
    fn on_messages_updated(&self, event: &Event<MessagesUpdated>) {
        let payload = event.payload();
        let removed = payload
            .changed
            .iter()
            .copied()
            .filter(|id| !payload.messages.iter().any(|m| m.id == *id))
            .collect();
        self.apply_remote(
            event.name(),
            SessionKey::Messages(payload.session_id),
            SessionPatch::MergeMessages {
                session: payload.session_id,
                messages: payload.messages.clone(),
                removed,
            },
        );
    }
}

/// Keeps one container's sessions and messages in step with its peer.
///
/// Operations do not mark anything themselves. The store hook marks the
/// touched entity while the store call commits; the operation then flushes
/// that entity, so a racing tick and the operation publish it once between
/// them.
#[derive(Clone)]
pub struct SessionReconciler {
    inner: Arc<SessionsInner>,
}

impl SessionReconciler {
    /// Binds a reconciler to `store`. Call `initialize` to start syncing.
    #[must_use]
    pub fn new(ctx: ReconcilerContext, store: Arc<dyn SessionStore>) -> Self {
        let markers = ProvenanceMarkers::new(
            ctx.config.provenance_ttl(),
            ctx.config.provenance_capacity,
        );
        Self {
            inner: Arc::new(SessionsInner {
                core: ReconcilerCore::new(ctx, Domain::Sessions),
                store,
                sessions: DirtySet::new(),
                messages: NestedDirtySet::new(),
                active: AtomicBool::new(false),
                markers,
            }),
        }
    }

    /// The store this reconciler watches.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// Whether the session has a change not yet published.
    #[must_use]
    pub fn is_session_dirty(&self, id: SessionId) -> bool {
        self.inner.sessions.is_dirty(&id)
    }

    /// Whether the message has a change not yet published.
    #[must_use]
    pub fn is_message_dirty(&self, session: SessionId, message: MessageId) -> bool {
        self.inner.messages.is_child_dirty(&session, &message)
    }

    /// Whether a selection change is waiting.
    #[must_use]
    pub fn is_selection_dirty(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Creates a session and announces it with `session:created`.
    pub async fn create_session(&self, new: NewSession) -> BridgeResult<Session> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let session = inner
            .core
            .call_store("session.create", ErrorCode::SessionCreate, || {
                let store = store.clone();
                let new = new.clone();
                async move { store.create_session(&new).await }
            })
            .await?;
        inner.flush_session(session.id);
        inner.core.emit(SessionCreated {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Changes a session. Peers learn of it through `session:updated`.
    pub async fn update_session(
        &self,
        id: SessionId,
        changes: SessionChanges,
    ) -> BridgeResult<Session> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let session = inner
            .core
            .call_store("session.update", ErrorCode::SessionUpdate, || {
                let store = store.clone();
                let changes = changes.clone();
                async move { store.update_session(id, &changes).await }
            })
            .await?;
        inner.flush_session(id);
        Ok(session)
    }

    /// Deletes a session. The flush of the now-absent id publishes
    /// `session:deleted`.
    pub async fn delete_session(&self, id: SessionId) -> BridgeResult<()> {
        let inner = &self.inner;
        let store = inner.store.clone();
        inner
            .core
            .call_store("session.delete", ErrorCode::SessionDelete, || {
                let store = store.clone();
                async move { store.delete_session(id).await }
            })
            .await?;
        inner.messages.take(&id);
        inner.flush_session(id);
        Ok(())
    }

    /// Selects a session, or clears the selection with `None`.
    pub async fn select_session(&self, id: Option<SessionId>) -> BridgeResult<()> {
        let inner = &self.inner;
        let store = inner.store.clone();
        inner
            .core
            .call_store("session.select", ErrorCode::SessionSelect, || {
                let store = store.clone();
                async move { store.select_session(id).await }
            })
            .await?;
        inner.flush_active();
        Ok(())
    }

    /// Sends a message and announces it with `session:messageSent`.
    pub async fn send_message(
        &self,
        session: SessionId,
        message: NewMessage,
    ) -> BridgeResult<Message> {
        let inner = &self.inner;
        let store = inner.store.clone();
        let sent = inner
            .core
            .call_store("session.sendMessage", ErrorCode::MessageSend, || {
                let store = store.clone();
                let message = message.clone();
                async move { store.send_message(session, &message).await }
            })
            .await?;
        inner.flush_messages(session);
        inner.core.emit(MessageSent {
            message: sent.clone(),
        });
        Ok(sent)
    }

    /// Deletes a message and announces it with `session:messageDeleted`.
    pub async fn delete_message(&self, session: SessionId, message: MessageId) -> BridgeResult<()> {
        let inner = &self.inner;
        let store = inner.store.clone();
        inner
            .core
            .call_store("session.deleteMessage", ErrorCode::MessageDelete, || {
                let store = store.clone();
                async move { store.delete_message(session, message).await }
            })
            .await?;
        inner.flush_messages(session);
        inner.core.emit(MessageDeleted {
            session_id: session,
            message_id: message,
        });
        Ok(())
    }
}

impl Reconciler for SessionReconciler {
    fn domain(&self) -> Domain {
        Domain::Sessions
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
        let hook = inner.store.subscribe(Arc::new(
            move |mutation: &SessionMutation, state: &SessionsState| {
                if let Some(inner) = hook_target.upgrade() {
                    inner.on_mutation(mutation, state);
                }
            },
        ));

        let ctx = &inner.core.ctx;
        let name = format!("sessions:{}", ctx.source);
        let (bus, source) = (&ctx.bus, &ctx.source);
        let subscriptions = vec![
            subscribe_remote(bus, &name, source, weak.clone(), SessionsInner::on_created),
            subscribe_remote(bus, &name, source, weak.clone(), SessionsInner::on_updated),
            subscribe_remote(bus, &name, source, weak.clone(), SessionsInner::on_deleted),
            subscribe_remote(bus, &name, source, weak.clone(), SessionsInner::on_selected),
            subscribe_remote(bus, &name, source, weak.clone(), SessionsInner::on_message_sent),
            subscribe_remote(bus, &name, source, weak.clone(), SessionsInner::on_message_deleted),
            subscribe_remote(bus, &name, source, weak.clone(), SessionsInner::on_messages_updated),
        ];
        let tick = spawn_tick(weak, ctx.config.tick_interval(), SessionsInner::flush);
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
        let inner = &self.inner;
        inner.sessions.len()
            + inner.messages.len()
            + usize::from(inner.active.load(Ordering::SeqCst))
    }

    fn dispose(&self) {
        if self.inner.core.dispose() {
            self.inner.sessions.clear();
            self.inner.messages.clear();
            self.inner.active.store(false, Ordering::SeqCst);
            self.inner.markers.clear();
        }
    }
}
