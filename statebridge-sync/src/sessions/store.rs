use super::model::{
    Message, NewMessage, NewSession, Session, SessionChanges, SessionMutation, SessionPatch,
    SessionsState,
};
use crate::error::StoreError;
use crate::store::{FailureInjector, Listener, ListenerSet, Unsubscribe};
use async_trait::async_trait;
use statebridge_types::{MessageId, SessionId, Timestamp};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A container holding the session collection.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Registers a hook called after every committed mutation.
    fn subscribe(&self, listener: Listener<SessionMutation, SessionsState>) -> Unsubscribe;

    /// Creates a session. An empty title is rejected.
    async fn create_session(&self, new: &NewSession) -> Result<Session, StoreError>;

    /// Changes a session. Fails with `NotFound` for unknown ids.
    async fn update_session(
        &self,
        id: SessionId,
        changes: &SessionChanges,
    ) -> Result<Session, StoreError>;

    /// Deletes a session with its messages and draft.
    async fn delete_session(&self, id: SessionId) -> Result<(), StoreError>;

    /// Selects an existing session or clears the selection.
    async fn select_session(&self, id: Option<SessionId>) -> Result<(), StoreError>;

    /// Adds a message to a session. Empty messages are rejected.
    async fn send_message(
        &self,
        session: SessionId,
        message: &NewMessage,
    ) -> Result<Message, StoreError>;

    /// Removes a message from a session.
    async fn delete_message(&self, session: SessionId, message: MessageId)
    -> Result<(), StoreError>;

    /// Writes state directly. Still notifies mutation hooks.
    fn apply_patch(&self, patch: SessionPatch) -> Result<(), StoreError>;

    /// Copy of the current state.
    fn snapshot(&self) -> SessionsState;
}

/// In-memory session store.
pub struct InMemorySessionStore {
    state: Mutex<SessionsState>,
    listeners: ListenerSet<SessionMutation, SessionsState>,
    faults: FailureInjector,
    patch_faults: FailureInjector,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionsState::default()),
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

    /// Stores unsent input for a session. Not a synced field.
    pub fn set_draft(&self, session: SessionId, text: &str) {
        let text = text.to_string();
        self.commit(SessionMutation::Draft { session }, move |s| {
            s.drafts.insert(session, text);
            Ok(())
        })
        .unwrap_or_default();
    }

    /// Number of attached mutation hooks.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, SessionsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f`; notifies listeners only if it succeeded.
    fn commit<R>(
        &self,
        mutation: SessionMutation,
        f: impl FnOnce(&mut SessionsState) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let (result, snapshot) = {
            let mut state = self.lock();
            let result = f(&mut state)?;
            (result, state.clone())
        };
        self.listeners.notify(&mutation, &snapshot);
        Ok(result)
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_session(id: SessionId) -> StoreError {
    StoreError::NotFound(format!("session {id}"))
}

fn find_session(state: &mut SessionsState, id: SessionId) -> Result<&mut Session, StoreError> {
    state
        .sessions
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| missing_session(id))
}

fn upsert(state: &mut SessionsState, session: Session) {
    match state.sessions.iter_mut().find(|s| s.id == session.id) {
        Some(existing) => *existing = session,
        None => state.sessions.push(session),
    }
}

fn remove(state: &mut SessionsState, id: SessionId) -> Result<(), StoreError> {
    let before = state.sessions.len();
    state.sessions.retain(|s| s.id != id);
    if state.sessions.len() == before {
        return Err(missing_session(id));
    }
    state.messages.remove(&id);
    state.drafts.remove(&id);
    if state.active == Some(id) {
        state.active = None;
    }
    Ok(())
}

fn put_message(state: &mut SessionsState, message: Message) -> Result<(), StoreError> {
    if state.session(&message.session_id).is_none() {
        return Err(missing_session(message.session_id));
    }
    let list = state.messages.entry(message.session_id).or_default();
    upsert_message(list, message);
    sort_messages(list);
    Ok(())
}

fn upsert_message(list: &mut Vec<Message>, message: Message) {
    match list.iter_mut().find(|m| m.id == message.id) {
        Some(existing) => *existing = message,
        None => list.push(message),
    }
}

/// Both containers order messages the same way regardless of arrival.
fn sort_messages(list: &mut [Message]) {
    list.sort_by_key(|m| (m.timestamp, m.id));
}

fn merge_messages(
    state: &mut SessionsState,
    session: SessionId,
    messages: Vec<Message>,
    removed: &[MessageId],
) -> Result<(), StoreError> {
    if state.session(&session).is_none() {
        return Err(missing_session(session));
    }
    let list = state.messages.entry(session).or_default();
    list.retain(|m| !removed.contains(&m.id));
    for message in messages {
        upsert_message(list, message);
    }
    sort_messages(list);
    Ok(())
}

fn remove_message(
    state: &mut SessionsState,
    session: SessionId,
    message: MessageId,
) -> Result<(), StoreError> {
    let list = state
        .messages
        .get_mut(&session)
        .ok_or_else(|| missing_session(session))?;
    let before = list.len();
    list.retain(|m| m.id != message);
    if list.len() == before {
        return Err(StoreError::NotFound(format!("message {message}")));
    }
    Ok(())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn subscribe(&self, listener: Listener<SessionMutation, SessionsState>) -> Unsubscribe {
        self.listeners.subscribe(listener)
    }

    async fn create_session(&self, new: &NewSession) -> Result<Session, StoreError> {
        self.faults.check()?;
        if new.title.trim().is_empty() {
            return Err(StoreError::Rejected("session title is empty".to_string()));
        }
        let now = Timestamp::now();
        let session = Session {
            id: SessionId::new(),
            title: new.title.clone(),
            created_at: now,
            updated_at: now,
        };
        let created = session.clone();
        self.commit(
            SessionMutation::Collection {
                changed: Some(session.id),
            },
            move |s| {
                s.sessions.push(created);
                Ok(())
            },
        )?;
        Ok(session)
    }

    async fn update_session(
        &self,
        id: SessionId,
        changes: &SessionChanges,
    ) -> Result<Session, StoreError> {
        self.faults.check()?;
        let changes = changes.clone();
        self.commit(SessionMutation::Collection { changed: Some(id) }, move |s| {
            let session = find_session(s, id)?;
            if let Some(title) = changes.title {
                session.title = title;
            }
            session.updated_at = Timestamp::now();
            Ok(session.clone())
        })
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StoreError> {
        self.faults.check()?;
        self.commit(SessionMutation::Collection { changed: Some(id) }, move |s| {
            remove(s, id)
        })
    }

    async fn select_session(&self, id: Option<SessionId>) -> Result<(), StoreError> {
        self.faults.check()?;
        self.commit(SessionMutation::ActiveSession, move |s| {
            if let Some(id) = id {
                if s.session(&id).is_none() {
                    return Err(missing_session(id));
                }
            }
            s.active = id;
            Ok(())
        })
    }

    async fn send_message(
        &self,
        session: SessionId,
        message: &NewMessage,
    ) -> Result<Message, StoreError> {
        self.faults.check()?;
        if message.content.is_empty() {
            return Err(StoreError::Rejected("message is empty".to_string()));
        }
        let message = Message {
            id: MessageId::new(),
            session_id: session,
            role: message.role,
            content: message.content.clone(),
            timestamp: Timestamp::now(),
        };
        let sent = message.clone();
        self.commit(
            SessionMutation::Messages {
                session,
                message: Some(message.id),
            },
            move |s| put_message(s, sent),
        )?;
        Ok(message)
    }

    async fn delete_message(
        &self,
        session: SessionId,
        message: MessageId,
    ) -> Result<(), StoreError> {
        self.faults.check()?;
        self.commit(
            SessionMutation::Messages {
                session,
                message: Some(message),
            },
            move |s| remove_message(s, session, message),
        )
    }

    fn apply_patch(&self, patch: SessionPatch) -> Result<(), StoreError> {
        self.patch_faults.check()?;
        match patch {
            SessionPatch::Upsert(session) => self.commit(
                SessionMutation::Collection {
                    changed: Some(session.id),
                },
                move |s| {
                    upsert(s, session);
                    Ok(())
                },
            ),
            SessionPatch::Remove(id) => {
                self.commit(SessionMutation::Collection { changed: Some(id) }, move |s| {
                    remove(s, id)
                })
            }
            SessionPatch::Select(id) => self.commit(SessionMutation::ActiveSession, move |s| {
                s.active = id;
                Ok(())
            }),
            SessionPatch::PutMessage(message) => self.commit(
                SessionMutation::Messages {
                    session: message.session_id,
                    message: Some(message.id),
                },
                move |s| put_message(s, message),
            ),
            SessionPatch::RemoveMessage { session, message } => self.commit(
                SessionMutation::Messages {
                    session,
                    message: Some(message),
                },
                move |s| remove_message(s, session, message),
            ),
            SessionPatch::MergeMessages {
                session,
                messages,
                removed,
            } => self.commit(
                SessionMutation::Messages {
                    session,
                    message: None,
                },
                move |s| merge_messages(s, session, messages, &removed),
            ),
        }
    }

    fn snapshot(&self) -> SessionsState {
        self.lock().clone()
    }
}
