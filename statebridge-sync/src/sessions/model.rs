use serde::{Deserialize, Serialize};
use statebridge_types::{bus_event, MessageId, SessionId, Timestamp};
use std::collections::BTreeMap;

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One entry in a session. Lists are kept ordered by `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: Timestamp,
}

/// Input for creating a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub title: String,
}

impl NewSession {
    /// A session with the given title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

/// Session fields to change; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChanges {
    pub title: Option<String>,
}

/// Input for sending a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
}

impl NewMessage {
    /// A message authored by the user.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Everything a sessions container holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsState {
    /// Sessions in creation order.
    pub sessions: Vec<Session>,
    /// The selected session.
    pub active: Option<SessionId>,
    /// Messages per session.
    pub messages: BTreeMap<SessionId, Vec<Message>>,
    /// Unsent input per session; local only.
    pub drafts: BTreeMap<SessionId, String>,
}

impl SessionsState {
    /// Looks up a session by id.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == *id)
    }

    /// Messages of a session; empty if it has none.
    #[must_use]
    pub fn messages_for(&self, id: &SessionId) -> &[Message] {
        self.messages.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Describes one committed sessions mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMutation {
    /// The collection changed; `changed` names the session if known.
    Collection { changed: Option<SessionId> },
    /// The selected session changed.
    ActiveSession,
    /// A session's message list changed; `message` names the message if known.
    Messages {
        session: SessionId,
        message: Option<MessageId>,
    },
    /// Local only.
    Draft { session: SessionId },
}

/// Direct writes applied on behalf of the peer container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPatch {
    /// Inserts the session or replaces the one with the same id.
    Upsert(Session),
    /// Removes a session and everything attached to it.
    Remove(SessionId),
    /// Changes the selection.
    Select(Option<SessionId>),
    /// Appends, or replaces a message with the same id.
    PutMessage(Message),
    /// Removes one message.
    RemoveMessage {
        session: SessionId,
        message: MessageId,
    },
    /// Upserts `messages` by id and drops `removed`.
    MergeMessages {
        session: SessionId,
        messages: Vec<Message>,
        removed: Vec<MessageId>,
    },
}

// ── Events ───────────────────────────────────────────────────────

/// A session was created through the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session: Session,
}
bus_event!(SessionCreated => "session:created");

/// Current state of a session, published on flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdated {
    pub session: Session,
}
bus_event!(SessionUpdated => "session:updated");

/// A session is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDeleted {
    pub session_id: SessionId,
}
bus_event!(SessionDeleted => "session:deleted");

/// The selection changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSelected {
    pub session_id: Option<SessionId>,
}
bus_event!(SessionSelected => "session:selected");

/// A message was sent through the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSent {
    pub message: Message,
}
bus_event!(MessageSent => "session:messageSent");

/// A message was deleted through the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub session_id: SessionId,
    pub message_id: MessageId,
}
bus_event!(MessageDeleted => "session:messageDeleted");

/// Full message list of one session, published on flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesUpdated {
    pub session_id: SessionId,
    pub messages: Vec<Message>,
    /// Messages that were dirty. A changed id missing from `messages` was
    /// deleted.
    pub changed: Vec<MessageId>,
}
bus_event!(MessagesUpdated => "session:messagesUpdated");
