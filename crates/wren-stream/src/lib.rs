//! wren-stream: Session stream manager
//!
//! This crate multiplexes concurrent, long-lived conversation streams
//! between UI surfaces and the agent backend, independent of any single
//! view's lifetime. It tracks per-session stream state, folds streamed
//! deltas into message history, fans updates out to subscribers, and caches
//! session snapshots across navigation.

pub mod error;
pub mod manager;
pub mod merge;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
pub use manager::{CachedSession, SessionStreamManager, Subscription};
pub use state::{ChatState, StreamState, TokenState};
pub use transport::{SessionEventStream, SessionTransport};
