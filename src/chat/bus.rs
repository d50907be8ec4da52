//! Multicast delivery of [`Event`]s.
//!
//! Subscribers are plain callbacks, registered or removed at any time from
//! any thread. `publish` calls each subscriber of a snapshot taken at the
//! start of the call, synchronously and in registration order, so a slow
//! subscriber delays the next line. Late subscribers get no replay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::chat::event::Event;

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Subscribe with a channel instead of a callback. The subscription
    /// removes itself once the receiver is dropped.
    pub fn subscribe_channel(self: &Arc<Self>) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Arc::downgrade(self);
        let id_slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&id_slot);
        let id = self.subscribe(move |event| {
            if tx.send(event.clone()).is_err() {
                if let (Some(bus), Some(id)) = (bus.upgrade(), *slot.lock()) {
                    bus.unsubscribe(id);
                }
            }
        });
        *id_slot.lock() = Some(id);
        (id, rx)
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish(&self, event: &Event) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let snapshot: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }
}
