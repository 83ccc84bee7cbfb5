//! Transport abstraction over the agent backend

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use wren_chat::{Message, Session, StreamEvent};

use crate::error::Result;

/// A cancellable sequence of backend stream events
pub type SessionEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// The backend boundary the manager drives. How bytes arrive (SSE,
/// WebSocket, IPC) is the implementor's concern.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Fetch a session's persisted metadata, including its message history
    /// when available.
    async fn resume(&self, session_id: &str) -> Result<Session>;

    /// Send messages to a session and open the server-driven event
    /// sequence for the reply. The stream must stop yielding promptly once
    /// `cancel` fires.
    async fn reply(
        &self,
        session_id: &str,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<SessionEventStream>;
}
