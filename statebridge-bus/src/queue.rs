//! The batch queue for Normal and Low priority events.

use statebridge_types::{EventRecord, Priority, Timestamp};
use std::any::Any;
use std::sync::Arc;

/// A type-erased event waiting for dispatch.
pub(crate) struct QueuedEvent {
    pub name: &'static str,
    pub priority: Priority,
    pub timestamp: Timestamp,
    pub sequence: u64,
    /// The typed `Event<E>`, downcast by each handler.
    pub event: Arc<dyn Any + Send + Sync>,
    /// Erased copy handed to traffic taps.
    pub record: Arc<EventRecord>,
}

impl QueuedEvent {
    fn sort_key(&self) -> (Priority, Timestamp, u64) {
        (self.priority, self.timestamp, self.sequence)
    }
}

/// Arrival-ordered queue; sorting happens when a batch is taken.
#[derive(Default)]
pub(crate) struct BatchQueue {
    events: Vec<QueuedEvent>,
}

impl BatchQueue {
    /// Appends in arrival order.
    pub fn push(&mut self, event: QueuedEvent) {
        self.events.push(event);
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns true if a High priority event is buffered. This happens when
    /// a High event is emitted while paused or from inside a handler.
    pub fn has_high_priority(&self) -> bool {
        self.events.iter().any(|e| e.priority == Priority::High)
    }

    /// Removes up to `max` events in `(priority, timestamp, arrival)` order.
    pub fn take_batch(&mut self, max: usize) -> Vec<QueuedEvent> {
        self.events.sort_by_key(QueuedEvent::sort_key);
        let n = max.min(self.events.len());
        self.events.drain(..n).collect()
    }

    /// Drops every buffered event.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
