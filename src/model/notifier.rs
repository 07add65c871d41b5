//! Multicast change notification.
//!
//! A `Notifier<E>` is the Rust stand-in for a multicast event: handlers are
//! registered with `subscribe`, removed with `unsubscribe`, and invoked in
//! registration order by `notify`.
//!
//! Handlers run with no internal lock held. `notify` snapshots the handler
//! list first, so a handler may subscribe, unsubscribe, or trigger further
//! notifications on the same notifier without deadlocking.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Handle returned by `subscribe`, used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// "Property `name` on this object changed."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyChanged {
    pub name: String,
}

impl PropertyChanged {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Multicast event source.
pub struct Notifier<E> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
    next_id: AtomicU64,
}

/// The change capability exposed by observable domain objects.
pub type ChangeNotifier = Notifier<PropertyChanged>;

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler. It stays registered until `unsubscribe` is called
    /// with the returned id.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Deliver `event` to every handler registered at the time of the call.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in snapshot {
            handler(event);
        }
    }
}

impl Notifier<PropertyChanged> {
    /// Raise a property change for `name`.
    pub fn notify(&self, name: &str) {
        self.emit(&PropertyChanged::new(name));
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
