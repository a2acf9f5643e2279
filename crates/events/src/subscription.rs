//! Subscription handles for realtime change streams.
//!
//! A subscription is a pair: the [`SubscriptionFeed`] is held by whatever
//! produces events (an in-process bus forwarder or a WebSocket channel
//! task), the [`Subscription`] by the consumer. Cancelling the
//! subscription, or dropping it, stops the producer.

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::change::ChangeEvent;

/// Consumer half of a realtime subscription.
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    cancel: CancellationToken,
}

/// Producer half of a realtime subscription.
#[derive(Clone)]
pub struct SubscriptionFeed {
    sender: mpsc::UnboundedSender<ChangeEvent>,
    cancel: CancellationToken,
}

/// Create a connected feed/subscription pair for `channel`.
pub fn subscription_channel(channel: impl Into<String>) -> (SubscriptionFeed, Subscription) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    (
        SubscriptionFeed {
            sender,
            cancel: cancel.clone(),
        },
        Subscription {
            channel: channel.into(),
            receiver,
            cancel,
        },
    )
}

impl Subscription {
    /// Name of the channel this subscription was opened on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next change.
    ///
    /// Returns `None` once the subscription is cancelled or the producer
    /// has gone away.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            event = self.receiver.recv() => event,
        }
    }

    /// Stop delivery. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// A token that cancels this subscription, for owners that hand the
    /// subscription itself to a background task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SubscriptionFeed {
    /// Deliver a change. Returns `false` when the subscription is gone
    /// and the producer should stop.
    pub fn send(&self, event: ChangeEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.sender.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves when the consumer unsubscribes or drops the subscription.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Table;
    use serde_json::json;

    #[tokio::test]
    async fn feed_delivers_in_order() {
        let (feed, mut sub) = subscription_channel("notes-changes");
        assert_eq!(sub.channel(), "notes-changes");

        assert!(feed.send(ChangeEvent::insert(Table::Notes, json!({ "n": 1 }))));
        assert!(feed.send(ChangeEvent::insert(Table::Notes, json!({ "n": 2 }))));

        assert_eq!(sub.next().await.unwrap().change.row()["n"], 1);
        assert_eq!(sub.next().await.unwrap().change.row()["n"], 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_both_halves() {
        let (feed, mut sub) = subscription_channel("c");
        sub.unsubscribe();
        sub.unsubscribe();

        assert!(!sub.is_active());
        assert!(feed.is_closed());
        assert!(!feed.send(ChangeEvent::insert(Table::Tags, json!({}))));
        assert!(sub.next().await.is_none());
        feed.cancelled().await;
    }

    #[tokio::test]
    async fn dropping_subscription_closes_feed() {
        let (feed, sub) = subscription_channel("c");
        drop(sub);
        assert!(feed.is_closed());
    }
}
