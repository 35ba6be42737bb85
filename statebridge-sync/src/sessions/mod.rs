//! Sessions: the session collection, the active selection and per-session
//! message lists.

mod model;
mod reconciler;
mod store;

pub use model::{
    Message, MessageDeleted, MessageRole, MessageSent, MessagesUpdated, NewMessage, NewSession,
    Session, SessionChanges, SessionCreated, SessionDeleted, SessionMutation, SessionPatch,
    SessionSelected, SessionUpdated, SessionsState,
};
pub use reconciler::SessionReconciler;
pub use store::{InMemorySessionStore, SessionStore};
