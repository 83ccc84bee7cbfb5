//! Typed events streamed by the backend during a reply

use serde::{Deserialize, Serialize};

use crate::types::{Message, TokenUsage};

/// Side-channel progress/telemetry from the backend, separate from the
/// message stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNotification {
    /// Request the notification belongs to, when the backend scopes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One unit of server-pushed data within a single reply's event sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// New message or a streamed delta of the message being built up
    Message {
        message: Message,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// The stream failed; terminal
    Error { error: String },
    /// The stream completed; terminal
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Server-declared authoritative rewrite of the whole history
    /// (e.g. after compaction)
    UpdateConversation { messages: Vec<Message> },
    /// Side-channel notification
    Notification { notification: SessionNotification },
    /// The serving model or mode changed mid-session
    ModelChange { model: String, mode: String },
    /// Liveness only
    Ping,
}

impl StreamEvent {
    /// Check if this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finish { .. } | StreamEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::Finish { reason: None }.is_terminal());
        assert!(StreamEvent::Error { error: "boom".into() }.is_terminal());
        assert!(!StreamEvent::Ping.is_terminal());
        let msg = Message::assistant("m1", vec![Content::text("hi")]);
        assert!(!StreamEvent::Message { message: msg, usage: None }.is_terminal());
    }

    #[test]
    fn test_event_serde_tagging() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"type":"model_change","model":"wren-large","mode":"auto"}"#,
        )
        .unwrap();
        match event {
            StreamEvent::ModelChange { model, mode } => {
                assert_eq!(model, "wren-large");
                assert_eq!(mode, "auto");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let json = serde_json::to_value(StreamEvent::Ping).unwrap();
        assert_eq!(json["type"], "ping");
    }
}
