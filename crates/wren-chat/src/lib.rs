//! wren-chat: Conversation data model and backend wire events
//!
//! This crate defines the message/content types shared across the client and
//! the typed event union streamed by the agent backend. It performs no I/O.

pub mod events;
pub mod session;
pub mod types;

pub use events::{SessionNotification, StreamEvent};
pub use session::Session;
pub use types::{Content, Message, Role, SystemNoteKind, TokenUsage};
