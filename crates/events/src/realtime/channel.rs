//! A joined realtime channel driven by a background task.
//!
//! [`spawn_channel`] connects, joins the channel with its bindings, sends
//! heartbeats and forwards row changes to the returned [`Subscription`].
//! Dropped connections are re-established with backoff and the channel
//! is rejoined. Unsubscribing sends `phx_leave` and ends the task.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use super::client::{RealtimeClient, RealtimeError, RealtimeStream};
use super::messages::{
    heartbeat_frame, join_frame, leave_frame, parse_message, topic_for, OutgoingFrame,
    RealtimeMessage,
};
use super::reconnect::{redial, BackoffPolicy};
use crate::change::ChangeBinding;
use crate::subscription::{subscription_channel, Subscription, SubscriptionFeed};

/// Interval between `phoenix` heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// What to join and how.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub name: String,
    pub bindings: Vec<ChangeBinding>,
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, bindings: Vec<ChangeBinding>) -> Self {
        Self {
            name: name.into(),
            bindings,
            access_token: None,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }
}

/// Join `config` on `client` in a background task.
///
/// Must be called from within a tokio runtime.
pub fn spawn_channel(client: RealtimeClient, config: ChannelConfig) -> Subscription {
    let (feed, subscription) = subscription_channel(config.name.clone());
    tokio::spawn(run_channel(client, config, feed));
    subscription
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The subscriber went away. Do not reconnect.
    Cancelled,
    /// The connection or channel failed. Reconnect and rejoin.
    Disconnected,
}

/// Outcome of handling one text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameAction {
    Continue,
    Rejoin,
    Stop,
}

async fn run_channel(client: RealtimeClient, config: ChannelConfig, feed: SubscriptionFeed) {
    let cancel = feed.cancel_token().clone();

    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        result = client.connect() => result,
    };
    let mut connection = match first {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(channel = %config.name, error = %e, "Realtime connect failed");
            match redial(&client, config.backoff, &config.name, &cancel).await {
                Some(conn) => conn,
                None => return,
            }
        }
    };

    loop {
        match run_session(connection.ws_stream, &config, &feed).await {
            SessionEnd::Cancelled => {
                tracing::info!(channel = %config.name, "Realtime channel closed");
                return;
            }
            SessionEnd::Disconnected => {
                tracing::warn!(channel = %config.name, "Realtime session ended, reconnecting");
            }
        }
        connection = match redial(&client, config.backoff, &config.name, &cancel).await {
            Some(conn) => conn,
            None => return,
        };
    }
}

/// Drive one WebSocket session: join, heartbeat, forward changes.
async fn run_session(
    ws_stream: RealtimeStream,
    config: &ChannelConfig,
    feed: &SubscriptionFeed,
) -> SessionEnd {
    let (mut sink, mut stream) = ws_stream.split();
    let topic = topic_for(&config.name);
    let mut next_ref = 0u64;
    let mut reference = move || {
        next_ref += 1;
        next_ref.to_string()
    };

    let join_ref = reference();
    let join = join_frame(
        &config.name,
        &config.bindings,
        config.access_token.as_deref(),
        join_ref.clone(),
    );
    if let Err(e) = send_frame(&mut sink, &join).await {
        tracing::error!(channel = %config.name, error = %e, "Failed to join channel");
        return SessionEnd::Disconnected;
    }

    let mut ticker = tokio::time::interval(config.heartbeat_interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = feed.cancelled() => {
                let leave = leave_frame(&config.name, reference());
                if let Err(e) = send_frame(&mut sink, &leave).await {
                    tracing::debug!(channel = %config.name, error = %e, "Failed to send leave");
                }
                let _ = sink.close().await;
                return SessionEnd::Cancelled;
            }
            _ = ticker.tick() => {
                if let Err(e) = send_frame(&mut sink, &heartbeat_frame(reference())).await {
                    tracing::error!(channel = %config.name, error = %e, "Failed to send heartbeat");
                    return SessionEnd::Disconnected;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handle_text(&text, &topic, &join_ref, feed) {
                            FrameAction::Continue => {}
                            FrameAction::Rejoin => return SessionEnd::Disconnected,
                            FrameAction::Stop => return SessionEnd::Cancelled,
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(channel = %config.name, ?frame, "Realtime closed WebSocket");
                        return SessionEnd::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(channel = %config.name, error = %e, "Realtime receive error");
                        return SessionEnd::Disconnected;
                    }
                    None => return SessionEnd::Disconnected,
                }
            }
        }
    }
}

/// React to one incoming text frame.
fn handle_text(text: &str, topic: &str, join_ref: &str, feed: &SubscriptionFeed) -> FrameAction {
    let message = match parse_message(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Malformed realtime frame");
            return FrameAction::Continue;
        }
    };

    match message {
        RealtimeMessage::PostgresChanges { topic: t, data } if t == topic => {
            let Some(event) = data.into_event() else {
                return FrameAction::Continue;
            };
            tracing::debug!(table = %event.table, kind = ?event.change.kind(), "Realtime change");
            if feed.send(event) {
                FrameAction::Continue
            } else {
                FrameAction::Stop
            }
        }
        RealtimeMessage::Reply {
            topic: t,
            reference,
            ok,
            response,
        } if t == topic && reference.as_deref() == Some(join_ref) => {
            if ok {
                tracing::info!(topic, "Joined realtime channel");
                FrameAction::Continue
            } else {
                tracing::error!(topic, %response, "Realtime channel join rejected");
                FrameAction::Rejoin
            }
        }
        RealtimeMessage::System { topic: t, payload } if t == topic => {
            tracing::debug!(topic, %payload, "Realtime system message");
            FrameAction::Continue
        }
        RealtimeMessage::ChannelError { topic: t } | RealtimeMessage::ChannelClosed { topic: t }
            if t == topic =>
        {
            tracing::warn!(topic, "Realtime channel dropped by server");
            FrameAction::Rejoin
        }
        _ => FrameAction::Continue,
    }
}

async fn send_frame<S>(sink: &mut S, frame: &OutgoingFrame) -> Result<(), RealtimeError>
where
    S: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(frame).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| RealtimeError::Connection(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{RowChange, Table};

    const TOPIC: &str = "realtime:notes-changes";

    fn change_frame(topic: &str, table: &str) -> String {
        format!(
            r#"{{"topic":"{topic}","event":"postgres_changes","ref":null,
            "payload":{{"data":{{"type":"UPDATE","table":"{table}","record":{{"id":"n1"}}}}}}}}"#
        )
    }

    #[tokio::test]
    async fn forwards_changes_on_own_topic() {
        let (feed, mut sub) = subscription_channel("notes-changes");

        let action = handle_text(&change_frame(TOPIC, "notes"), TOPIC, "1", &feed);
        assert_eq!(action, FrameAction::Continue);

        let event = sub.next().await.unwrap();
        assert_eq!(event.table, Table::Notes);
        assert!(matches!(event.change, RowChange::Update { .. }));
    }

    #[tokio::test]
    async fn ignores_other_topics_and_tables() {
        let (feed, mut sub) = subscription_channel("notes-changes");

        handle_text(&change_frame("realtime:other", "notes"), TOPIC, "1", &feed);
        handle_text(&change_frame(TOPIC, "profiles"), TOPIC, "1", &feed);
        handle_text("garbage", TOPIC, "1", &feed);
        handle_text(&change_frame(TOPIC, "tags"), TOPIC, "1", &feed);

        // Only the tags change made it through.
        let event = sub.next().await.unwrap();
        assert_eq!(event.table, Table::Tags);
    }

    #[test]
    fn rejected_join_triggers_rejoin() {
        let (feed, _sub) = subscription_channel("notes-changes");
        let reply = format!(
            r#"{{"topic":"{TOPIC}","event":"phx_reply","ref":"1","payload":{{"status":"error","response":{{}}}}}}"#
        );
        assert_eq!(handle_text(&reply, TOPIC, "1", &feed), FrameAction::Rejoin);

        let heartbeat_ack = r#"{"topic":"phoenix","event":"phx_reply","ref":"2","payload":{"status":"ok"}}"#;
        assert_eq!(handle_text(heartbeat_ack, TOPIC, "1", &feed), FrameAction::Continue);
    }

    #[test]
    fn channel_error_triggers_rejoin() {
        let (feed, _sub) = subscription_channel("notes-changes");
        let frame = format!(r#"{{"topic":"{TOPIC}","event":"phx_error","payload":{{}}}}"#);
        assert_eq!(handle_text(&frame, TOPIC, "1", &feed), FrameAction::Rejoin);
    }

    #[test]
    fn closed_subscription_stops_session() {
        let (feed, sub) = subscription_channel("notes-changes");
        drop(sub);
        assert_eq!(
            handle_text(&change_frame(TOPIC, "notes"), TOPIC, "1", &feed),
            FrameAction::Stop
        );
    }
}
