//! Core conversation types

use serde::{Deserialize, Serialize};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Kinds of side-band status text injected into the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemNoteKind {
    /// Plain inline status line
    Inline,
    /// The backend is compacting the conversation context
    Compaction,
}

/// Content blocks within a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Text content
    Text { text: String },
    /// Thinking/reasoning content; the signature usually arrives only on the
    /// final delta of a streamed thinking block
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Tool invocation requested by the model
    ToolRequest {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Result of a tool invocation
    ToolResponse {
        id: String,
        result: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    /// The backend is waiting for the user to approve a tool call
    ToolConfirmation {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The backend is waiting for structured user input
    Elicitation { id: String, prompt: String },
    /// Side-band status text from the backend
    SystemNote { kind: SystemNoteKind, text: String },
}

impl Content {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create thinking content without a signature
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            signature: None,
        }
    }

    /// Create thinking content carrying a signature
    pub fn thinking_signed(thinking: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            signature: Some(signature.into()),
        }
    }

    /// Create a tool request
    pub fn tool_request(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool response
    pub fn tool_response(id: impl Into<String>, result: serde_json::Value, is_error: bool) -> Self {
        Self::ToolResponse {
            id: id.into(),
            result,
            is_error,
        }
    }

    /// Create a tool confirmation request
    pub fn tool_confirmation(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolConfirmation {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create an elicitation request
    pub fn elicitation(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::Elicitation {
            id: id.into(),
            prompt: prompt.into(),
        }
    }

    /// Create a system note
    pub fn system_note(kind: SystemNoteKind, text: impl Into<String>) -> Self {
        Self::SystemNote {
            kind,
            text: text.into(),
        }
    }

    /// Get text if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One transcript entry. The id is assigned by the backend and is stable
/// across the streamed deltas that build the message up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<Content>,
    /// Creation time in milliseconds since the epoch
    #[serde(default)]
    pub created: i64,
}

impl Message {
    /// Create a user message with text content
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: vec![Content::text(text)],
            created: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an assistant message with the given content blocks
    pub fn assistant(id: impl Into<String>, content: Vec<Content>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content,
            created: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Append a content block
    pub fn push(&mut self, content: Content) {
        self.content.push(content);
    }

    /// Get combined text content
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Instantaneous token counters attached to a stream event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text_joins_text_blocks() {
        let mut msg = Message::assistant("m1", vec![Content::text("Hello, ")]);
        msg.push(Content::thinking("hidden"));
        msg.push(Content::text("world"));
        assert_eq!(msg.text(), "Hello, world");
    }

    #[test]
    fn test_content_serde_tagging() {
        let json = serde_json::to_value(Content::text("hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");

        let json = serde_json::to_value(Content::thinking("hm")).unwrap();
        assert_eq!(json["type"], "thinking");
        assert!(json.get("signature").is_none());
    }

    #[test]
    fn test_thinking_signature_roundtrip() {
        let block = Content::thinking_signed("reasoning", "sig-abc");
        let json = serde_json::to_string(&block).unwrap();
        let back: Content = serde_json::from_str(&json).unwrap();
        match back {
            Content::Thinking { signature, .. } => assert_eq!(signature.as_deref(), Some("sig-abc")),
            other => panic!("unexpected content: {:?}", other),
        }
    }
}
