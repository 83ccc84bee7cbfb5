//! Per-session stream state: chat status, token counters, and the snapshot
//! handed to subscribers.

use serde::{Deserialize, Serialize};
use wren_chat::{Content, Message, Session, SessionNotification, SystemNoteKind, TokenUsage};

/// Coarse UI-facing status of a session's active stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    #[default]
    Idle,
    Streaming,
    Thinking,
    Compacting,
    WaitingForUserInput,
    LoadingConversation,
}

/// Derive the chat state from a streamed message's content.
///
/// Priority: waiting-for-input beats compaction beats thinking. Models
/// without native thinking blocks emit `<thinking>` tags inline, so an
/// unclosed tag in the trailing text block also counts as thinking.
pub fn chat_state_for(message: &Message) -> ChatState {
    let mut compacting = false;
    let mut thinking = false;

    for block in &message.content {
        match block {
            Content::ToolConfirmation { .. } | Content::Elicitation { .. } => {
                return ChatState::WaitingForUserInput;
            }
            Content::SystemNote { kind: SystemNoteKind::Compaction, .. } => compacting = true,
            Content::Thinking { .. } => thinking = true,
            _ => {}
        }
    }

    if compacting {
        return ChatState::Compacting;
    }
    if thinking {
        return ChatState::Thinking;
    }
    if let Some(text) = message.content.last().and_then(|c| c.as_text()) {
        if text.contains("<thinking>") && !text.contains("</thinking>") {
            return ChatState::Thinking;
        }
    }
    ChatState::Streaming
}

/// Running token counters for one session.
///
/// Instantaneous values mirror the latest reading from the stream; the
/// accumulated values only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub accumulated_input_tokens: u64,
    pub accumulated_output_tokens: u64,
    pub accumulated_total_tokens: u64,
}

impl TokenState {
    /// Seed counters from persisted session metadata
    pub fn from_session(session: &Session) -> Self {
        Self {
            input_tokens: session.input_tokens.unwrap_or(0),
            output_tokens: session.output_tokens.unwrap_or(0),
            total_tokens: session.total_tokens.unwrap_or(0),
            accumulated_input_tokens: session.accumulated_input_tokens.unwrap_or(0),
            accumulated_output_tokens: session.accumulated_output_tokens.unwrap_or(0),
            accumulated_total_tokens: session.accumulated_total_tokens.unwrap_or(0),
        }
    }

    /// Fold one usage reading in. Readings are running totals for the
    /// current turn, so the accumulated counters advance by the delta since
    /// the previous reading; a reading lower than its predecessor means a
    /// new turn began and is added in full.
    pub fn apply(&mut self, usage: &TokenUsage) {
        self.accumulated_input_tokens += turn_delta(self.input_tokens, usage.input) as u64;
        self.accumulated_output_tokens += turn_delta(self.output_tokens, usage.output) as u64;
        self.accumulated_total_tokens += turn_delta(self.total_tokens, usage.total) as u64;
        self.input_tokens = usage.input;
        self.output_tokens = usage.output;
        self.total_tokens = usage.total;
    }
}

fn turn_delta(prev: u32, next: u32) -> u32 {
    if next >= prev { next - prev } else { next }
}

/// Everything the UI needs to render one session. Subscribers receive
/// snapshots of this; the manager owns the only mutable copy.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    /// Transcript in chronological order; never reordered
    pub messages: Vec<Message>,
    /// Last adopted session metadata; may lag behind `messages` while a
    /// stream is active
    pub session: Option<Session>,
    pub chat_state: ChatState,
    pub token_state: TokenState,
    /// Side-channel notification log, append-only within one stream
    pub notifications: Vec<SessionNotification>,
    /// Last stream-level failure; does not invalidate prior messages
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(content: Vec<Content>) -> Message {
        Message::assistant("m1", content)
    }

    #[test]
    fn test_chat_state_plain_text_is_streaming() {
        let msg = assistant(vec![Content::text("hello")]);
        assert_eq!(chat_state_for(&msg), ChatState::Streaming);
    }

    #[test]
    fn test_chat_state_thinking_block() {
        let msg = assistant(vec![Content::thinking("let me see")]);
        assert_eq!(chat_state_for(&msg), ChatState::Thinking);
    }

    #[test]
    fn test_chat_state_unclosed_thinking_tag() {
        let msg = assistant(vec![Content::text("<thinking>considering the")]);
        assert_eq!(chat_state_for(&msg), ChatState::Thinking);

        let closed = assistant(vec![Content::text("<thinking>done</thinking> answer")]);
        assert_eq!(chat_state_for(&closed), ChatState::Streaming);
    }

    #[test]
    fn test_chat_state_compaction_note() {
        let msg = assistant(vec![
            Content::thinking("irrelevant"),
            Content::system_note(SystemNoteKind::Compaction, "compacting the conversation"),
        ]);
        assert_eq!(chat_state_for(&msg), ChatState::Compacting);
    }

    #[test]
    fn test_chat_state_confirmation_wins() {
        let msg = assistant(vec![
            Content::system_note(SystemNoteKind::Compaction, "compacting"),
            Content::tool_confirmation("t1", "shell", serde_json::json!({})),
        ]);
        assert_eq!(chat_state_for(&msg), ChatState::WaitingForUserInput);

        let elicit = assistant(vec![Content::elicitation("e1", "pick a directory")]);
        assert_eq!(chat_state_for(&elicit), ChatState::WaitingForUserInput);
    }

    #[test]
    fn test_token_apply_advances_by_delta() {
        let mut tokens = TokenState::default();
        tokens.apply(&TokenUsage { input: 100, output: 10, total: 110 });
        tokens.apply(&TokenUsage { input: 100, output: 25, total: 125 });
        assert_eq!(tokens.output_tokens, 25);
        assert_eq!(tokens.accumulated_output_tokens, 25);
        assert_eq!(tokens.accumulated_total_tokens, 125);
    }

    #[test]
    fn test_token_apply_new_turn_adds_in_full() {
        let mut tokens = TokenState::default();
        tokens.apply(&TokenUsage { input: 100, output: 50, total: 150 });
        // New turn: readings reset below the previous ones
        tokens.apply(&TokenUsage { input: 120, output: 8, total: 128 });
        assert_eq!(tokens.output_tokens, 8);
        assert_eq!(tokens.accumulated_output_tokens, 58);
        assert_eq!(tokens.accumulated_input_tokens, 120);
    }

    #[test]
    fn test_token_seed_from_session_defaults_to_zero() {
        let session: Session = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "name": "untitled",
            "workingDir": "/tmp",
            "createdAt": "2025-08-07T00:00:00Z",
            "updatedAt": "2025-08-07T00:00:00Z",
            "inputTokens": 40,
            "outputTokens": null,
            "totalTokens": null,
            "accumulatedInputTokens": 400,
            "accumulatedOutputTokens": null,
            "accumulatedTotalTokens": null,
        }))
        .unwrap();
        let tokens = TokenState::from_session(&session);
        assert_eq!(tokens.input_tokens, 40);
        assert_eq!(tokens.output_tokens, 0);
        assert_eq!(tokens.accumulated_input_tokens, 400);
    }
}
