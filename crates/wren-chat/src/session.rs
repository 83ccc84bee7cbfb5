//! Persisted session metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::Message;

/// Metadata for one persistent conversation, as returned by the backend's
/// resume operation. Token counters come in two flavors: instantaneous
/// (the most recent turn) and accumulated (across the session's lifetime).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(alias = "description")]
    pub name: String,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: usize,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub accumulated_input_tokens: Option<u64>,
    pub accumulated_output_tokens: Option<u64>,
    pub accumulated_total_tokens: Option<u64>,
    /// Message history, present when the resume operation includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Vec<Message>>,
}

impl Session {
    /// Take the embedded history, leaving metadata-only state behind
    pub fn take_conversation(&mut self) -> Vec<Message> {
        self.conversation.take().unwrap_or_default()
    }
}
