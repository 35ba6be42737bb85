//! The event bus.

use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use crate::history::EventHistory;
use crate::queue::{BatchQueue, QueuedEvent};
use crate::subscription::{
    ErasedHandler, Subscription, SubscriptionEntry, SubscriptionInfo, TapHandler, WILDCARD,
};
use serde::Serialize;
use statebridge_types::{BusEvent, EmitOptions, Event, EventRecord, Priority, SubscriptionId};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Counters describing bus traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Events accepted by `emit`.
    pub emitted: u64,
    /// Events handed to the dispatcher (immediately or in a batch).
    pub dispatched: u64,
    /// Batch flush cycles run.
    pub batches: u64,
    /// Handler invocations that panicked.
    pub handler_failures: u64,
    /// Events currently waiting in the queue.
    pub queued: usize,
    /// Registered listeners, taps included.
    pub subscriptions: usize,
    /// Whether dispatch is paused.
    pub paused: bool,
}

/// How much of the queue a flush cycle should drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    /// One batch, then whatever is ready.
    One,
    /// Everything queued.
    All,
}

struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

struct BusState {
    handlers: HashMap<&'static str, Vec<SubscriptionEntry<ErasedHandler>>>,
    taps: Vec<SubscriptionEntry<TapHandler>>,
    queue: BatchQueue,
    history: EventHistory,
    paused: bool,
    disposed: bool,
    dispose_pending: bool,
    flush_all_pending: bool,
    timer: Option<TimerSlot>,
    timer_generation: u64,
    next_sequence: u64,
    stats: BusStats,
}

impl BusState {
    fn new(config: &BusConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            taps: Vec::new(),
            queue: BatchQueue::default(),
            history: EventHistory::new(config.history_size),
            paused: false,
            disposed: false,
            dispose_pending: false,
            flush_all_pending: false,
            timer: None,
            timer_generation: 0,
            next_sequence: 0,
            stats: BusStats::default(),
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(slot) = self.timer.take() {
            slot.handle.abort();
        }
        self.timer_generation = self.timer_generation.wrapping_add(1);
    }

    fn subscription_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum::<usize>() + self.taps.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) struct BusInner {
    config: BusConfig,
    runtime: Handle,
    state: Mutex<BusState>,
    /// Serializes dispatch cycles across threads.
    dispatch_lock: Mutex<()>,
    /// Thread currently running a dispatch cycle, for re-entrancy detection.
    dispatch_owner: Mutex<Option<ThreadId>>,
}

/// Clears the dispatch owner when a cycle ends, even on unwind.
struct DispatchGuard<'a> {
    inner: &'a BusInner,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.inner.dispatch_owner) = None;
    }
}

impl BusInner {
    fn is_dispatching_here(&self) -> bool {
        *lock(&self.dispatch_owner) == Some(thread::current().id())
    }

    fn enter_dispatch(&self) -> DispatchGuard<'_> {
        let guard = lock(&self.dispatch_lock);
        *lock(&self.dispatch_owner) = Some(thread::current().id());
        DispatchGuard {
            inner: self,
            _lock: guard,
        }
    }

    /// Runs `f` as a dispatch cycle, then drains whatever became ready while
    /// it ran and performs a dispose requested from inside a handler.
    fn run_cycle(self: &Arc<Self>, f: impl FnOnce(&Arc<Self>)) {
        {
            let _guard = self.enter_dispatch();
            f(self);
            self.drain_ready();
        }
        self.after_cycle();
    }

    fn after_cycle(self: &Arc<Self>) {
        let dispose = {
            let mut state = lock(&self.state);
            if state.dispose_pending && !state.disposed {
                true
            } else {
                if !state.disposed && !state.paused && !state.queue.is_empty() && state.timer.is_none()
                {
                    self.arm_timer(&mut state);
                }
                false
            }
        };
        if dispose {
            self.dispose_now();
        }
    }

    fn flush(self: &Arc<Self>, mode: FlushMode) {
        if self.is_dispatching_here() {
            // Picked up by drain_ready once the current cycle finishes.
            let mut state = lock(&self.state);
            if mode == FlushMode::All {
                state.flush_all_pending = true;
            }
            return;
        }
        self.run_cycle(|inner| {
            let batch = {
                let mut state = lock(&inner.state);
                if state.disposed || state.paused || state.queue.is_empty() {
                    return;
                }
                if mode == FlushMode::All {
                    state.flush_all_pending = true;
                }
                state.cancel_timer();
                state.stats.batches += 1;
                state.queue.take_batch(inner.config.max_batch_size)
            };
            inner.dispatch_batch(batch);
        });
    }

    /// Keeps flushing while the queue is full, holds a High event, or a full
    /// flush was requested.
    fn drain_ready(&self) {
        loop {
            let batch = {
                let mut state = lock(&self.state);
                if state.disposed || state.paused {
                    return;
                }
                if state.queue.is_empty() {
                    state.flush_all_pending = false;
                    return;
                }
                let ready = state.flush_all_pending
                    || state.queue.len() >= self.config.max_batch_size
                    || state.queue.has_high_priority();
                if !ready {
                    return;
                }
                state.cancel_timer();
                state.stats.batches += 1;
                state.queue.take_batch(self.config.max_batch_size)
            };
            self.dispatch_batch(batch);
        }
    }

    fn dispatch_batch(&self, batch: Vec<QueuedEvent>) {
        debug!(size = batch.len(), "flushing event batch");
        for queued in &batch {
            self.deliver(queued);
        }
    }

    /// Delivers one event to its listeners, then to traffic taps.
    fn deliver(&self, queued: &QueuedEvent) {
        let (handlers, taps) = {
            let mut state = lock(&self.state);
            if state.disposed {
                return;
            }
            state.stats.dispatched += 1;

            let mut handlers: Vec<(ErasedHandler, Option<String>)> = Vec::new();
            let mut bucket_empty = false;
            if let Some(entries) = state.handlers.get_mut(queued.name) {
                let mut fired_once = Vec::new();
                for entry in entries.iter() {
                    if entry.is_active() {
                        handlers.push((Arc::clone(&entry.handler), entry.subscriber.clone()));
                        if entry.once {
                            entry.retire();
                            fired_once.push(entry.id);
                        }
                    }
                }
                if !fired_once.is_empty() {
                    entries.retain(|e| !fired_once.contains(&e.id));
                }
                bucket_empty = entries.is_empty();
            }
            if bucket_empty {
                state.handlers.remove(queued.name);
            }

            let taps: Vec<TapHandler> = state
                .taps
                .iter()
                .filter(|t| t.is_active())
                .map(|t| Arc::clone(&t.handler))
                .collect();
            (handlers, taps)
        };

        let mut failures = 0u64;
        for (handler, subscriber) in handlers {
            let event = queued.event.as_ref();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                failures += 1;
                error!(
                    event = queued.name,
                    subscriber = subscriber.as_deref().unwrap_or("anonymous"),
                    "event handler failed: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
        for tap in taps {
            let record = queued.record.as_ref();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| tap(record))) {
                failures += 1;
                error!(
                    event = queued.name,
                    "event tap failed: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
        if failures > 0 {
            lock(&self.state).stats.handler_failures += failures;
        }
    }

    fn arm_timer(self: &Arc<Self>, state: &mut BusState) {
        if state.timer.is_some() {
            return;
        }
        state.timer_generation = state.timer_generation.wrapping_add(1);
        let generation = state.timer_generation;
        let weak = Arc::downgrade(self);
        let timeout = self.config.batch_timeout();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_timer(generation);
            }
        });
        state.timer = Some(TimerSlot { generation, handle });
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        {
            let mut state = lock(&self.state);
            let current = state.timer.as_ref().map(|slot| slot.generation);
            if current != Some(generation) {
                return;
            }
            state.timer = None;
        }
        debug!("batch timeout elapsed");
        self.flush(FlushMode::One);
    }

    pub(crate) fn remove_subscription(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut state = lock(&self.state);
        if event_type == WILDCARD {
            let before = state.taps.len();
            state.taps.retain(|t| {
                if t.id == id {
                    t.retire();
                    false
                } else {
                    true
                }
            });
            return state.taps.len() != before;
        }

        let Some(entries) = state.handlers.get_mut(event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| {
            if e.id == id {
                e.retire();
                false
            } else {
                true
            }
        });
        let removed = entries.len() != before;
        if entries.is_empty() {
            state.handlers.remove(event_type);
        }
        removed
    }

    pub(crate) fn set_subscription_active(&self, event_type: &str, id: SubscriptionId, active: bool) {
        let state = lock(&self.state);
        let flag = if event_type == WILDCARD {
            state.taps.iter().find(|t| t.id == id).map(|t| &t.active)
        } else {
            state
                .handlers
                .get(event_type)
                .and_then(|entries| entries.iter().find(|e| e.id == id))
                .map(|e| &e.active)
        };
        if let Some(flag) = flag {
            flag.store(active, Ordering::SeqCst);
        }
    }

    fn dispose_now(&self) {
        let mut state = lock(&self.state);
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.dispose_pending = false;
        state.cancel_timer();
        for entry in state.handlers.values().flatten() {
            entry.retire();
        }
        for tap in &state.taps {
            tap.retire();
        }
        state.handlers.clear();
        state.taps.clear();
        state.queue.clear();
        state.history.clear();
        info!("event bus disposed");
    }
}

/// In-process publish/subscribe bus with priority-aware batching.
///
/// Cheap to clone; clones share the same dispatcher.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus driven by the current Tokio runtime.
    ///
    /// Fails if called outside a runtime or with an invalid configuration.
    pub fn new(config: BusConfig) -> BusResult<Self> {
        let runtime = Handle::try_current().map_err(|e| BusError::NoRuntime(e.to_string()))?;
        Self::with_runtime(config, runtime)
    }

    /// Creates a bus whose batch timer runs on the given runtime.
    pub fn with_runtime(config: BusConfig, runtime: Handle) -> BusResult<Self> {
        config.validate()?;
        let state = BusState::new(&config);
        info!(
            max_batch_size = config.max_batch_size,
            batch_timeout_ms = config.batch_timeout_ms,
            "event bus created"
        );
        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                runtime,
                state: Mutex::new(state),
                dispatch_lock: Mutex::new(()),
                dispatch_owner: Mutex::new(None),
            }),
        })
    }

    /// The configuration this bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // ── Emitting ─────────────────────────────────────────────────

    /// Emits an event with default options.
    pub fn emit<E: BusEvent>(&self, payload: E) {
        self.emit_with(payload, EmitOptions::default());
    }

    /// Emits an event tagged with `source`.
    pub fn emit_from<E: BusEvent>(&self, source: &str, payload: E) {
        self.emit_with(payload, EmitOptions::from_source(source));
    }

    /// Emits an event with explicit options.
    ///
    /// High priority events are delivered before this returns unless the bus
    /// is paused or the call comes from inside a handler, in which case they
    /// are queued and sorted ahead of everything else.
    pub fn emit_with<E: BusEvent>(&self, payload: E, options: EmitOptions) {
        let event = Event::new(payload, options);
        let priority = event.priority();
        let reentrant = self.inner.is_dispatching_here();

        let immediate = {
            let mut state = lock(&self.inner.state);
            if state.disposed {
                warn!(event = E::NAME, "emit on disposed event bus ignored");
                return;
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.stats.emitted += 1;

            let record = Arc::new(EventRecord::from_event(&event, sequence));
            state.history.push(Arc::clone(&record));
            let queued = QueuedEvent {
                name: E::NAME,
                priority,
                timestamp: event.timestamp(),
                sequence,
                event: Arc::new(event),
                record,
            };

            if priority == Priority::High && !state.paused && !reentrant {
                Some(queued)
            } else {
                state.queue.push(queued);
                if !state.paused {
                    self.inner.arm_timer(&mut state);
                }
                None
            }
        };

        if let Some(queued) = immediate {
            self.inner.run_cycle(|inner| inner.deliver(&queued));
            return;
        }
        if reentrant {
            return;
        }

        let full = {
            let state = lock(&self.inner.state);
            !state.paused && state.queue.len() >= self.inner.config.max_batch_size
        };
        if full {
            self.inner.flush(FlushMode::One);
        }
    }

    // ── Subscribing ──────────────────────────────────────────────

    /// Registers a listener for `E`. Listeners run in registration order.
    pub fn on<E, F>(&self, handler: F) -> Subscription
    where
        E: BusEvent,
        F: Fn(&Event<E>) + Send + Sync + 'static,
    {
        self.subscribe(handler, false, None)
    }

    /// Registers a listener labelled with the subscribing component, used in
    /// logs and diagnostics.
    pub fn on_named<E, F>(&self, subscriber: &str, handler: F) -> Subscription
    where
        E: BusEvent,
        F: Fn(&Event<E>) + Send + Sync + 'static,
    {
        self.subscribe(handler, false, Some(subscriber.to_string()))
    }

    /// Registers a listener removed after its first delivery.
    pub fn once<E, F>(&self, handler: F) -> Subscription
    where
        E: BusEvent,
        F: Fn(&Event<E>) + Send + Sync + 'static,
    {
        self.subscribe(handler, true, None)
    }

    /// Registers a tap that sees every dispatched event in erased form.
    pub fn on_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        let entry = SubscriptionEntry::new(Arc::new(handler) as TapHandler, false, None);
        let subscription = Subscription::new(&entry, WILDCARD, Arc::downgrade(&self.inner));
        let mut state = lock(&self.inner.state);
        if state.disposed {
            entry.retire();
        } else {
            state.taps.push(entry);
        }
        subscription
    }

    fn subscribe<E, F>(&self, handler: F, once: bool, subscriber: Option<String>) -> Subscription
    where
        E: BusEvent,
        F: Fn(&Event<E>) + Send + Sync + 'static,
    {
        let erased: ErasedHandler = Arc::new(move |any: &(dyn Any + Send + Sync)| {
            match any.downcast_ref::<Event<E>>() {
                Some(event) => handler(event),
                None => debug!(event = E::NAME, "payload type mismatch, handler skipped"),
            }
        });
        let entry = SubscriptionEntry::new(erased, once, subscriber);
        let subscription = Subscription::new(&entry, E::NAME, Arc::downgrade(&self.inner));

        let mut state = lock(&self.inner.state);
        if state.disposed {
            warn!(event = E::NAME, "subscribe on disposed event bus ignored");
            entry.retire();
        } else {
            state.handlers.entry(E::NAME).or_default().push(entry);
        }
        subscription
    }

    /// Number of listeners registered for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        lock(&self.inner.state)
            .handlers
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Returns true if `event_type` has a listener bucket.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        lock(&self.inner.state).handlers.contains_key(event_type)
    }

    /// Describes every registered listener.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let state = lock(&self.inner.state);
        let typed = state.handlers.iter().flat_map(|(name, entries)| {
            entries.iter().map(move |e| SubscriptionInfo {
                id: e.id,
                event_type: (*name).to_string(),
                once: e.once,
                active: e.is_active(),
                source: e.subscriber.clone(),
            })
        });
        let taps = state.taps.iter().map(|t| SubscriptionInfo {
            id: t.id,
            event_type: WILDCARD.to_string(),
            once: false,
            active: t.is_active(),
            source: None,
        });
        typed.chain(taps).collect()
    }

    // ── Flow control ─────────────────────────────────────────────

    /// Runs a flush cycle now, regardless of size or timeout.
    pub fn flush(&self) {
        self.inner.flush(FlushMode::One);
    }

    /// Stops dispatch. Emits keep queueing; nothing is dropped.
    pub fn pause(&self) {
        let mut state = lock(&self.inner.state);
        if state.disposed || state.paused {
            return;
        }
        state.paused = true;
        state.cancel_timer();
        debug!(queued = state.queue.len(), "event bus paused");
    }

    /// Restarts dispatch and flushes everything queued while paused.
    pub fn resume(&self) {
        {
            let mut state = lock(&self.inner.state);
            if state.disposed || !state.paused {
                return;
            }
            state.paused = false;
            debug!(queued = state.queue.len(), "event bus resumed");
        }
        self.inner.flush(FlushMode::All);
    }

    /// Whether dispatch is paused.
    pub fn is_paused(&self) -> bool {
        lock(&self.inner.state).paused
    }

    // ── Diagnostics ──────────────────────────────────────────────

    /// Oldest-first copy of the recent event history.
    pub fn history(&self) -> Vec<EventRecord> {
        lock(&self.inner.state).history.snapshot()
    }

    /// Drops the recorded history.
    pub fn clear_history(&self) {
        lock(&self.inner.state).history.clear();
    }

    /// Current traffic counters.
    pub fn stats(&self) -> BusStats {
        let state = lock(&self.inner.state);
        BusStats {
            queued: state.queue.len(),
            subscriptions: state.subscription_count(),
            paused: state.paused,
            ..state.stats
        }
    }

    /// Number of events waiting in the queue.
    pub fn queued(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Clears listeners, queue, timers and history. Idempotent.
    ///
    /// Called from inside a handler, disposal happens after the current
    /// dispatch cycle completes.
    pub fn dispose(&self) {
        if self.inner.is_dispatching_here() {
            lock(&self.inner.state).dispose_pending = true;
            return;
        }
        self.inner.dispose_now();
    }

    /// Whether [`EventBus::dispose`] has taken effect.
    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.state).disposed
    }
}
