//! Shared pieces of the store interface.

use crate::error::StoreError;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Mutation hook: called after every committed mutation with the mutation
/// descriptor and the resulting state.
pub type Listener<M, S> = Arc<dyn Fn(&M, &S) + Send + Sync>;

/// Detaches a listener when called.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    /// Wraps the detach action.
    #[must_use]
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// An unsubscribe that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Detaches the listener.
    pub fn unsubscribe(self) {
        (self.0)();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// Registered mutation listeners for an in-memory store.
pub(crate) struct ListenerSet<M, S> {
    listeners: Arc<Mutex<Vec<(u64, Listener<M, S>)>>>,
    next_id: AtomicU64,
}

impl<M: 'static, S: 'static> ListenerSet<M, S> {
    /// Creates an empty listener set.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Adds a listener; the returned handle removes it again.
    pub fn subscribe(&self, listener: Listener<M, S>) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        let weak: Weak<Mutex<Vec<(u64, Listener<M, S>)>>> = Arc::downgrade(&self.listeners);
        Unsubscribe::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(other, _)| *other != id);
            }
        })
    }

    /// Calls every listener. Must be called without holding the store's
    /// state lock, since listeners may read the store.
    pub fn notify(&self, mutation: &M, state: &S) {
        let listeners: Vec<Listener<M, S>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(mutation, state);
        }
    }

    /// Number of attached listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Scripted failures for in-memory stores.
///
/// Queued errors are returned by the next store operations, one per call.
#[derive(Debug, Default)]
pub struct FailureInjector {
    queued: Mutex<VecDeque<StoreError>>,
    calls: AtomicU64,
}

impl FailureInjector {
    /// An injector with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` operations fail with `error`.
    pub fn fail_next(&self, times: usize, error: StoreError) {
        let mut queued = self.queued.lock().unwrap_or_else(PoisonError::into_inner);
        queued.extend(std::iter::repeat_n(error, times));
    }

    /// Drops any queued failures.
    pub fn reset(&self) {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Counts the call and returns the next queued failure, if any.
    pub fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Operations checked so far, failed or not.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}
