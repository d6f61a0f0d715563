//! Priority-ordered observer registry
//!
//! Every node carries an [`ObserverBus`]. Observers are kept sorted by
//! descending priority; observers with equal priority run in the order they
//! were added. A notification with `min_priority` stops at the first entry
//! whose priority is `<= min_priority`.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Priority for ordinary subscribers.
pub const PRIORITY_DEFAULT: i64 = 0;

/// Priority at which a container runs its own `parameters_changed` hook.
pub const PRIORITY_PARAMETERS_CHANGED: i64 = -100;

/// Priority at which a container listens to its children. Always last.
pub const PRIORITY_PASS_THROUGH: i64 = i64::MIN;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscriber (and of every node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// A process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback invoked with the object that started the notification.
pub type Callback<T> = Rc<dyn Fn(&T)>;

struct Entry<T> {
    priority: i64,
    subscriber: ObserverId,
    callback: Callback<T>,
}

/// Sorted list of `(priority, subscriber, callback)` triples.
pub struct ObserverBus<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for ObserverBus<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> ObserverBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every entry with priority `>= priority`.
    pub fn add(&mut self, priority: i64, subscriber: ObserverId, callback: Callback<T>) {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            Entry {
                priority,
                subscriber,
                callback,
            },
        );
    }

    /// Remove every entry of `subscriber`, returning how many were dropped.
    pub fn remove(&mut self, subscriber: ObserverId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.subscriber != subscriber);
        before - self.entries.len()
    }

    pub fn contains(&self, subscriber: ObserverId) -> bool {
        self.entries.iter().any(|entry| entry.subscriber == subscriber)
    }

    /// Callbacks to run, in order, for a notification with `min_priority`.
    ///
    /// Returned as clones so the caller can release any borrow of the bus
    /// before invoking them.
    pub fn callbacks(&self, min_priority: Option<i64>) -> Vec<Callback<T>> {
        self.entries
            .iter()
            .take_while(|entry| min_priority.map_or(true, |min| entry.priority > min))
            .map(|entry| Rc::clone(&entry.callback))
            .collect()
    }

    /// `(priority, subscriber)` pairs in dispatch order.
    pub fn subscribers(&self) -> Vec<(i64, ObserverId)> {
        self.entries
            .iter()
            .map(|entry| (entry.priority, entry.subscriber))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> fmt::Debug for ObserverBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.subscribers()).finish()
    }
}

/// Something that reports its mutations to subscribers.
pub trait Observable: Sized {
    /// Identity used for subscriptions and argument matching.
    fn observer_id(&self) -> ObserverId;

    fn add_observer(&self, subscriber: ObserverId, priority: i64, callback: Callback<Self>);

    fn remove_observer(&self, subscriber: ObserverId);

    /// Run the callbacks with priority above `min_priority` (all if `None`).
    /// `origin` defaults to `self`.
    fn notify_observers(&self, origin: Option<&Self>, min_priority: Option<i64>);
}
