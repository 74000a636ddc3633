//! Event fan-out from the tracker to open watches
//!
//! Every tracker mutation is turned into a [`WatchEvent`] and pushed, without
//! blocking, onto the bounded queue of each subscription whose filter matches.
//! A subscription that cannot keep up loses its oldest events (or is closed,
//! depending on [`OverflowPolicy`]) and is told so with [`Error::Expired`].

use crate::tracker::{ResourceCoordinate, GVR};
use crate::unstructured::Unstructured;
use crate::{Error, Result};
use futures::Stream;
use kube::core::{Selector, SelectorExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Queue length of a watch unless configured otherwise.
pub const DEFAULT_WATCH_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub event_type: EventType,
    pub object: Unstructured,
    pub coordinate: ResourceCoordinate,
}

impl WatchEvent {
    pub fn new(event_type: EventType, object: Unstructured, coordinate: ResourceCoordinate) -> Self {
        Self {
            event_type,
            object,
            coordinate,
        }
    }
}

/// What to do when an event arrives for a subscription whose queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop the oldest queued event and report the gap to the consumer.
    #[default]
    DropOldest,
    /// Discard the queue and close the subscription after reporting the gap.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_WATCH_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Which events a subscription receives
#[derive(Debug, Clone)]
pub struct WatchFilter {
    pub gvr: GVR,
    /// `None` watches every namespace.
    pub namespace: Option<String>,
    pub selector: Selector,
}

impl WatchFilter {
    pub fn new(gvr: GVR, namespace: Option<&str>, selector: Selector) -> Self {
        Self {
            gvr,
            namespace: namespace.map(str::to_string),
            selector,
        }
    }

    fn matches_coordinate(&self, coordinate: &ResourceCoordinate) -> bool {
        self.gvr == coordinate.gvr
            && self
                .namespace
                .as_ref()
                .is_none_or(|ns| *ns == coordinate.namespace)
    }

    fn matches_labels(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selector.matches(labels)
    }

    /// The event this filter should see, if any.
    ///
    /// A modification that moves an object into the selector is seen as an
    /// addition, and one that moves it out is seen as a deletion.
    fn translate(
        &self,
        event: &WatchEvent,
        labels: &BTreeMap<String, String>,
        previous_labels: Option<&BTreeMap<String, String>>,
    ) -> Option<EventType> {
        if !self.matches_coordinate(&event.coordinate) {
            return None;
        }
        let now = self.matches_labels(labels);
        match (event.event_type, previous_labels.map(|l| self.matches_labels(l))) {
            (EventType::Modified, Some(before)) => match (before, now) {
                (true, true) => Some(EventType::Modified),
                (false, true) => Some(EventType::Added),
                (true, false) => Some(EventType::Deleted),
                (false, false) => None,
            },
            (event_type, _) => now.then_some(event_type),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<WatchEvent>,
    /// Events dropped ahead of the queue front that the consumer has not been told about.
    pending_gap: u64,
    missed_total: u64,
    closed: bool,
}

enum Next {
    Item(Result<WatchEvent>),
    Closed,
    Empty,
}

impl QueueState {
    fn next(&mut self) -> Next {
        if self.pending_gap > 0 {
            let missed = std::mem::take(&mut self.pending_gap);
            return Next::Item(Err(Error::Expired { missed }));
        }
        match self.events.pop_front() {
            Some(event) => Next::Item(Ok(event)),
            None if self.closed => Next::Closed,
            None => Next::Empty,
        }
    }
}

enum Delivery {
    Queued,
    Overflowed,
    Closed,
}

#[derive(Debug)]
struct Shared {
    id: u64,
    filter: WatchFilter,
    config: WatchConfig,
    state: Mutex<QueueState>,
    ready: Condvar,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, event: WatchEvent) -> Delivery {
        let mut state = self.lock();
        if state.closed {
            return Delivery::Closed;
        }

        let mut outcome = Delivery::Queued;
        if state.events.len() >= self.config.capacity {
            match self.config.overflow {
                OverflowPolicy::DropOldest => {
                    state.events.pop_front();
                    state.pending_gap += 1;
                    state.missed_total += 1;
                    outcome = Delivery::Overflowed;
                }
                OverflowPolicy::Close => {
                    let dropped = state.events.len() as u64 + 1;
                    state.events = VecDeque::new();
                    state.pending_gap += dropped;
                    state.missed_total += dropped;
                    state.closed = true;
                    drop(state);
                    self.wake();
                    return Delivery::Closed;
                }
            }
        }
        state.events.push_back(event);
        drop(state);
        self.wake();
        outcome
    }

    /// Returns false if the subscription was already closed.
    fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.pending_gap = 0;
        state.events = VecDeque::new();
        drop(state);
        self.wake();
        true
    }

    fn wake(&self) {
        self.ready.notify_all();
        self.notify.notify_one();
    }
}

#[derive(Debug, Default)]
struct Registry {
    subscribers: RwLock<HashMap<u64, Arc<Shared>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Delivers tracker events to the subscriptions whose filters match
#[derive(Debug)]
pub struct EventBroadcaster {
    registry: Arc<Registry>,
    config: WatchConfig,
}

impl EventBroadcaster {
    /// A capacity of 0 is raised to 1, since an empty queue could never hold an event.
    pub fn new(mut config: WatchConfig) -> Self {
        if config.capacity == 0 {
            warn!("Watch capacity 0 raised to 1");
            config.capacity = 1;
        }
        Self {
            registry: Arc::new(Registry::default()),
            config,
        }
    }

    pub fn config(&self) -> WatchConfig {
        self.config
    }

    pub fn subscribe(&self, filter: WatchFilter) -> WatchSubscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared {
            id,
            filter,
            config: self.config,
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            notify: Notify::new(),
        });

        self.registry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&shared));

        debug!(
            "Opened watch {} on {:?} in namespace {:?}",
            id, shared.filter.gvr, shared.filter.namespace
        );
        WatchSubscription {
            shared,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Push `event` to every matching subscription. Never blocks on a consumer.
    ///
    /// `previous_labels` are the object's labels before a modification, used to
    /// turn selector transitions into additions and deletions.
    pub fn broadcast(&self, event: &WatchEvent, previous_labels: Option<&BTreeMap<String, String>>) {
        let labels = event.object.labels();
        let mut closed = Vec::new();

        {
            let subscribers = self
                .registry
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            for shared in subscribers.values() {
                let Some(event_type) = shared.filter.translate(event, &labels, previous_labels) else {
                    continue;
                };
                trace!("Delivering {:?} to watch {}", event_type, shared.id);

                let delivered = WatchEvent {
                    event_type,
                    ..event.clone()
                };
                match shared.deliver(delivered) {
                    Delivery::Queued => {}
                    Delivery::Overflowed => {
                        warn!("Watch {} is full, dropped its oldest event", shared.id)
                    }
                    Delivery::Closed => closed.push(shared.id),
                }
            }
        }

        for id in closed {
            debug!("Removing closed watch {}", id);
            self.registry.remove(id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Close every open subscription.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Shared>> = self
            .registry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, shared)| shared)
            .collect();

        for shared in drained {
            shared.close();
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}

impl Drop for EventBroadcaster {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn stop_shared(shared: &Shared, registry: &Weak<Registry>) {
    if shared.close() {
        debug!("Stopped watch {}", shared.id);
    }
    if let Some(registry) = registry.upgrade() {
        registry.remove(shared.id);
    }
}

/// One open watch
///
/// Items are `Ok(event)` in mutation order, or `Err(Error::Expired)` where
/// events were dropped because the queue was full. `None` means the watch is
/// closed. Dropping the subscription stops it.
#[derive(Debug)]
pub struct WatchSubscription {
    shared: Arc<Shared>,
    registry: Weak<Registry>,
}

impl WatchSubscription {
    /// Wait for the next item.
    pub async fn recv(&mut self) -> Option<Result<WatchEvent>> {
        loop {
            let next = self.shared.lock().next();
            match next {
                Next::Item(item) => return Some(item),
                Next::Closed => return None,
                Next::Empty => {}
            }
            self.shared.notify.notified().await;
        }
    }

    /// Block the current thread until the next item arrives or the watch closes.
    pub fn recv_blocking(&mut self) -> Option<Result<WatchEvent>> {
        let mut state = self.shared.lock();
        loop {
            match state.next() {
                Next::Item(item) => return Some(item),
                Next::Closed => return None,
                Next::Empty => {
                    state = self
                        .shared
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Like [`recv_blocking`](Self::recv_blocking), giving up after `timeout`.
    ///
    /// Returns `None` on timeout as well as on close; check
    /// [`is_closed`](Self::is_closed) to tell the two apart.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Result<WatchEvent>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            match state.next() {
                Next::Item(item) => return Some(item),
                Next::Closed => return None,
                Next::Empty => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    state = self
                        .shared
                        .ready
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Result<WatchEvent>> {
        match self.shared.lock().next() {
            Next::Item(item) => Some(item),
            Next::Closed | Next::Empty => None,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<WatchEvent>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let item = subscription.recv().await?;
            Some((item, subscription))
        })
    }

    /// Stop delivery and release the queue. Safe to call more than once.
    pub fn stop(&self) {
        stop_shared(&self.shared, &self.registry);
    }

    /// A handle that can stop this watch from another thread or task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
            registry: self.registry.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Total number of events this watch has lost to overflow.
    pub fn missed_events(&self) -> u64 {
        self.shared.lock().missed_total
    }

    pub fn filter(&self) -> &WatchFilter {
        &self.shared.filter
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
    registry: Weak<Registry>,
}

impl StopHandle {
    pub fn stop(&self) {
        stop_shared(&self.shared, &self.registry);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}
