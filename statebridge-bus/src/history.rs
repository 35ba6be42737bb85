//! Bounded ring of recently emitted events.

use statebridge_types::EventRecord;
use std::collections::VecDeque;
use std::sync::Arc;

/// Keeps the last `capacity` emitted events for diagnostics.
///
/// Recording is independent of delivery: events are recorded even when
/// nobody is subscribed to them.
#[derive(Debug, Clone, Default)]
pub struct EventHistory {
    records: VecDeque<Arc<EventRecord>>,
    capacity: usize,
}

impl EventHistory {
    /// Creates an empty history holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends a record, evicting the oldest when full.
    pub fn push(&mut self, record: Arc<EventRecord>) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Oldest-first copy of the retained records.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.records.iter().map(|r| EventRecord::clone(r)).collect()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of retained records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every retained record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
