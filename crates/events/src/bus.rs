//! In-process change bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`ChangeBus`] fans every [`ChangeEvent`] out to all receivers. It is
//! how an in-process backend delivers realtime changes, and is designed
//! to be shared via `Arc<ChangeBus>`.

use tokio::sync::broadcast;

use crate::change::ChangeEvent;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for row changes.
///
/// # Usage
///
/// ```rust
/// use keepmd_events::bus::ChangeBus;
/// use keepmd_events::change::{ChangeEvent, Table};
///
/// let bus = ChangeBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ChangeEvent::insert(Table::Notes, serde_json::json!({})));
/// ```
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a change to all current subscribers.
    ///
    /// If there are no active subscribers the change is silently dropped.
    pub fn publish(&self, event: ChangeEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
