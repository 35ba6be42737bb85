//! Core type definitions for statebridge.
//!
//! This crate defines the plumbing types shared by every layer of the bridge:
//! - Identifier types (UUID v7)
//! - Millisecond timestamps
//! - The typed event envelope and the priority classification rules
//! - The cross-boundary error taxonomy and `BridgeResult`
//!
//! Domain payloads (sessions, users, toasts, ...) live with the reconcilers
//! that own them, not here.

mod error;
mod event;
mod ids;
mod result;
mod timestamp;

pub use error::{BridgeError, Cause, ErrorCode, ErrorDomain};
pub use event::{BusEvent, EmitOptions, Event, EventRecord, Priority};
pub use ids::{EventId, MessageId, SessionId, SubscriptionId, ToastId};
pub use result::{failure, success, BridgeResult, Outcome, ResultExt};
pub use timestamp::Timestamp;
