//! In-process publish/subscribe bus for statebridge.
//!
//! # Dispatch model
//!
//! - **High** priority events are delivered synchronously, before `emit`
//!   returns, bypassing the queue.
//! - **Normal** and **Low** events are queued and flushed when the queue
//!   reaches `max_batch_size` or `batch_timeout_ms` after the first
//!   unflushed event, whichever comes first. A flush sorts by
//!   `(priority, timestamp, arrival)`.
//! - Dispatch is never re-entered. An `emit` made from inside a handler is
//!   queued and delivered in the next cycle, which starts as soon as the
//!   current one finishes if the new event is High priority.
//! - A panicking handler is caught and logged; remaining handlers still run.
//!
//! # Example
//!
//! ```
//! use serde::Serialize;
//! use statebridge_bus::{BusConfig, EventBus};
//! use statebridge_types::bus_event;
//!
//! #[derive(Debug, Clone, Serialize)]
//! struct Ping(u32);
//! bus_event!(Ping => "ui:ping");
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(BusConfig::default()).unwrap();
//! let sub = bus.on(|event: &statebridge_types::Event<Ping>| {
//!     assert_eq!(event.payload().0, 1);
//! });
//! bus.emit(Ping(1)); // High priority: delivered before this returns
//! sub.unsubscribe();
//! bus.dispose();
//! # }
//! ```

mod bus;
mod config;
mod error;
mod history;
mod queue;
mod subscription;

pub use bus::{BusStats, EventBus};
pub use config::BusConfig;
pub use error::{BusError, BusResult};
pub use history::EventHistory;
pub use subscription::{Subscription, SubscriptionInfo, WILDCARD};
