//! Provenance markers.
//!
//! Before a reconciler writes an incoming change into its store, it marks
//! the target. The store's mutation hook fires synchronously during the
//! write; the reconciler finds the marker, consumes it, and skips the
//! mutation instead of treating it as a local change.
//!
//! Markers expire after a TTL and the set is capacity-bounded, so a write
//! that never produces a hook call cannot leak a marker.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Short-lived markers on keys the bridge itself just wrote.
///
/// A key is marked right before a peer change is patched into the store and
/// consumed by the mutation hook that patch triggers.
#[derive(Debug)]
pub struct ProvenanceMarkers<K> {
    markers: Mutex<HashMap<K, Instant>>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Eq + Hash + Clone> ProvenanceMarkers<K> {
    /// Creates an empty set. Markers live for `ttl`; at most `capacity`
    /// are held, evicting the one closest to expiry.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            markers: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Instant>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `key` as written by the bridge, refreshing its deadline.
    pub fn mark(&self, key: K) {
        let now = Instant::now();
        let mut markers = self.lock();
        markers.retain(|_, deadline| *deadline > now);
        if !markers.contains_key(&key) && markers.len() >= self.capacity {
            let oldest = markers
                .iter()
                .min_by_key(|(_, deadline)| **deadline)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                markers.remove(&oldest);
            }
        }
        markers.insert(key, now + self.ttl);
    }

    /// Removes the marker for `key`. Returns true if a live marker was
    /// present.
    pub fn consume(&self, key: &K) -> bool {
        let now = Instant::now();
        match self.lock().remove(key) {
            Some(deadline) => deadline > now,
            None => false,
        }
    }

    /// Whether a live marker exists, without consuming it.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.lock().get(key).is_some_and(|deadline| *deadline > now)
    }

    /// Drops expired markers and returns how many remain.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut markers = self.lock();
        markers.retain(|_, deadline| *deadline > now);
        markers.len()
    }

    /// Markers currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no markers are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every marker.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
