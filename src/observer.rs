//! Identity-keyed change notification.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// A fresh identity, unique within the process.
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an identity the caller already manages (a widget handle, say).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct ObserverRegistry {
    listeners: Mutex<Vec<(SubscriberId, Listener)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `id`. Re-registering an id replaces the
    /// callback but keeps its original place in the notification order.
    pub fn subscribe(&self, id: SubscriberId, listener: Listener) {
        let mut listeners = self.listeners.lock();
        match listeners.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = listener,
            None => listeners.push((id, listener)),
        }
    }

    /// Returns whether `id` was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Call every listener in registration order.
    ///
    /// Listeners run outside the registry lock so they may subscribe or
    /// unsubscribe. A panicking listener is logged and skipped.
    pub(crate) fn notify(&self) {
        let snapshot: Vec<(SubscriberId, Listener)> = self.listeners.lock().clone();

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| (*listener)())).is_err() {
                log::error!("Subscriber {:?} panicked during notification", id);
            }
        }
    }
}
