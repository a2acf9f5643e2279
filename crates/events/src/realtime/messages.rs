//! Realtime WebSocket frame types and parser.
//!
//! The realtime service speaks a Phoenix-channel style protocol: every
//! frame is a JSON object `{"topic", "event", "payload", "ref"}`. This
//! module builds the outgoing frames a client needs (join, heartbeat,
//! leave) and parses incoming frames into [`RealtimeMessage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::change::{ChangeBinding, ChangeEvent, ChangeKind, RowChange, Table};

/// Topic used for connection-level heartbeats.
const PHOENIX_TOPIC: &str = "phoenix";

/// Database schema all bindings refer to.
pub const DEFAULT_SCHEMA: &str = "public";

// ---------------------------------------------------------------------------
// Outgoing
// ---------------------------------------------------------------------------

/// A frame sent to the realtime service.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingFrame {
    pub topic: String,
    pub event: &'static str,
    pub payload: Value,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Channel topic for a channel name.
pub fn topic_for(channel: &str) -> String {
    format!("realtime:{channel}")
}

/// Build the `phx_join` frame registering `bindings` on `channel`.
pub fn join_frame(
    channel: &str,
    bindings: &[ChangeBinding],
    access_token: Option<&str>,
    reference: String,
) -> OutgoingFrame {
    let changes: Vec<Value> = bindings
        .iter()
        .map(|b| {
            let mut entry = json!({
                "event": "*",
                "schema": DEFAULT_SCHEMA,
                "table": b.table.as_str(),
            });
            if let Some(filter) = &b.filter {
                entry["filter"] = Value::String(filter.to_string());
            }
            entry
        })
        .collect();

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    OutgoingFrame {
        topic: topic_for(channel),
        event: "phx_join",
        payload,
        join_ref: Some(reference.clone()),
        reference,
    }
}

pub fn heartbeat_frame(reference: String) -> OutgoingFrame {
    OutgoingFrame {
        topic: PHOENIX_TOPIC.to_string(),
        event: "heartbeat",
        payload: json!({}),
        reference,
        join_ref: None,
    }
}

pub fn leave_frame(channel: &str, reference: String) -> OutgoingFrame {
    OutgoingFrame {
        topic: topic_for(channel),
        event: "phx_leave",
        payload: json!({}),
        reference,
        join_ref: None,
    }
}

// ---------------------------------------------------------------------------
// Incoming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct IncomingFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

/// Body of a `postgres_changes` frame.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresChangeData {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub record: Value,
    #[serde(default)]
    pub old_record: Value,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

impl PostgresChangeData {
    /// Convert to a [`ChangeEvent`]. Changes on tables this client does
    /// not know about yield `None`.
    pub fn into_event(self) -> Option<ChangeEvent> {
        let table = Table::parse(&self.table)?;
        let change = match self.kind {
            ChangeKind::Insert => RowChange::Insert { new: self.record },
            ChangeKind::Update => RowChange::Update { new: self.record },
            ChangeKind::Delete => RowChange::Delete {
                old: self.old_record,
            },
        };
        let commit_timestamp = self
            .commit_timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Some(ChangeEvent {
            table,
            change,
            commit_timestamp,
        })
    }
}

/// Incoming frames a channel session reacts to.
#[derive(Debug, Clone)]
pub enum RealtimeMessage {
    /// Reply to a frame we sent (`phx_reply`).
    Reply {
        topic: String,
        reference: Option<String>,
        ok: bool,
        response: Value,
    },
    /// A row change on a joined channel.
    PostgresChanges {
        topic: String,
        data: PostgresChangeData,
    },
    /// Server-side status notice (subscription established, errors).
    System { topic: String, payload: Value },
    /// The channel crashed on the server (`phx_error`).
    ChannelError { topic: String },
    /// The server closed the channel (`phx_close`).
    ChannelClosed { topic: String },
    /// Anything else (presence, broadcast, access-token acks).
    Other { topic: String, event: String },
}

/// Parse a realtime text frame.
///
/// Returns `Err` for malformed JSON or a `postgres_changes` frame with
/// an undecodable body. Callers should log and continue.
pub fn parse_message(text: &str) -> Result<RealtimeMessage, serde_json::Error> {
    let frame: IncomingFrame = serde_json::from_str(text)?;
    let message = match frame.event.as_str() {
        "phx_reply" => RealtimeMessage::Reply {
            ok: frame.payload.get("status").and_then(Value::as_str) == Some("ok"),
            response: frame
                .payload
                .get("response")
                .cloned()
                .unwrap_or(Value::Null),
            topic: frame.topic,
            reference: frame.reference,
        },
        "postgres_changes" => {
            let data = frame.payload.get("data").cloned().unwrap_or(Value::Null);
            RealtimeMessage::PostgresChanges {
                topic: frame.topic,
                data: serde_json::from_value(data)?,
            }
        }
        "system" => RealtimeMessage::System {
            topic: frame.topic,
            payload: frame.payload,
        },
        "phx_error" => RealtimeMessage::ChannelError { topic: frame.topic },
        "phx_close" => RealtimeMessage::ChannelClosed { topic: frame.topic },
        _ => RealtimeMessage::Other {
            topic: frame.topic,
            event: frame.event,
        },
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeFilter;

    #[test]
    fn join_frame_lists_bindings_with_filters() {
        let bindings = vec![
            ChangeBinding::filtered(Table::Notes, ChangeFilter::eq("user_id", "u1")),
            ChangeBinding::table(Table::NoteTags),
        ];
        let frame = join_frame("notes-changes", &bindings, Some("tok"), "1".into());
        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["topic"], "realtime:notes-changes");
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        assert_eq!(value["join_ref"], "1");
        assert_eq!(value["payload"]["access_token"], "tok");

        let changes = &value["payload"]["config"]["postgres_changes"];
        assert_eq!(changes[0]["table"], "notes");
        assert_eq!(changes[0]["filter"], "user_id=eq.u1");
        assert_eq!(changes[1]["table"], "note_tags");
        assert!(changes[1].get("filter").is_none());
    }

    #[test]
    fn heartbeat_targets_phoenix_topic() {
        let value = serde_json::to_value(heartbeat_frame("7".into())).unwrap();
        assert_eq!(value["topic"], "phoenix");
        assert_eq!(value["event"], "heartbeat");
        assert!(value.get("join_ref").is_none());
    }

    #[test]
    fn parse_insert_change() {
        let text = r#"{"topic":"realtime:c","event":"postgres_changes","ref":null,
            "payload":{"ids":[1],"data":{"type":"INSERT","table":"notes","schema":"public",
            "record":{"id":"n1"},"old_record":{},"commit_timestamp":"2024-05-01T12:00:00Z"}}}"#;
        let msg = parse_message(text).unwrap();
        match msg {
            RealtimeMessage::PostgresChanges { data, .. } => {
                let event = data.into_event().unwrap();
                assert_eq!(event.table, Table::Notes);
                assert_eq!(event.change, RowChange::Insert { new: json!({"id": "n1"}) });
                assert_eq!(event.commit_timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
            }
            other => panic!("Expected PostgresChanges, got {other:?}"),
        }
    }

    #[test]
    fn parse_delete_uses_old_record() {
        let text = r#"{"topic":"realtime:c","event":"postgres_changes",
            "payload":{"data":{"type":"DELETE","table":"note_tags",
            "record":{},"old_record":{"note_id":"n","tag_id":"t"}}}}"#;
        let RealtimeMessage::PostgresChanges { data, .. } = parse_message(text).unwrap() else {
            panic!("Expected PostgresChanges");
        };
        let event = data.into_event().unwrap();
        assert_eq!(event.table, Table::NoteTags);
        assert_eq!(event.change.row()["tag_id"], "t");
    }

    #[test]
    fn unknown_table_is_dropped() {
        let data: PostgresChangeData =
            serde_json::from_value(json!({"type": "UPDATE", "table": "profiles"})).unwrap();
        assert!(data.into_event().is_none());
    }

    #[test]
    fn parse_reply_status() {
        let text = r#"{"topic":"realtime:c","event":"phx_reply","ref":"1",
            "payload":{"status":"error","response":{"reason":"unauthorized"}}}"#;
        match parse_message(text).unwrap() {
            RealtimeMessage::Reply { ok, reference, response, .. } => {
                assert!(!ok);
                assert_eq!(reference.as_deref(), Some("1"));
                assert_eq!(response["reason"], "unauthorized");
            }
            other => panic!("Expected Reply, got {other:?}"),
        }
    }

    #[test]
    fn parse_other_and_invalid() {
        let text = r#"{"topic":"realtime:c","event":"presence_state","payload":{}}"#;
        assert!(matches!(
            parse_message(text).unwrap(),
            RealtimeMessage::Other { .. }
        ));
        assert!(parse_message("not json at all").is_err());
    }
}
