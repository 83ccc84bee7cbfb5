//! The session stream manager: per-session registry, subscription hub,
//! stream driver, and session cache.
//!
//! One instance serves the whole process; the composition root constructs
//! it with a transport and hands it to every UI surface. Sessions share the
//! instance but are isolated by session id.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{
    Arc, LazyLock,
    atomic::{AtomicU64, Ordering},
};

use futures::StreamExt;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use wren_chat::{Message, Session, StreamEvent};

use crate::error::Result;
use crate::merge::merge_message;
use crate::state::{ChatState, StreamState, TokenState, chat_state_for};
use crate::transport::SessionTransport;

/// Ids the backend assigns to sessions created on the fly: date, underscore,
/// per-day counter. A finished first stream on such an id means the session
/// list shown elsewhere is stale.
static FRESH_SESSION_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8}_\d+$").unwrap());

type SubscriberFn = Arc<dyn Fn(&StreamState) + Send + Sync>;

/// Last known-good materialized view of a session, kept across UI
/// navigation so re-entering a view does not require a full reload.
#[derive(Debug, Clone)]
pub struct CachedSession {
    pub session: Session,
    pub messages: Vec<Message>,
}

struct ActiveStream {
    token: CancellationToken,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    states: HashMap<String, StreamState>,
    subscribers: HashMap<String, Vec<(u64, SubscriberFn)>>,
    active: HashMap<String, ActiveStream>,
    cache: HashMap<String, CachedSession>,
}

/// Registration handle returned by [`SessionStreamManager::subscribe`].
/// Dropping it (or calling [`Subscription::unsubscribe`]) removes the
/// callback; the last removal for a session drops its subscriber set.
pub struct Subscription {
    inner: Arc<Mutex<Inner>>,
    session_id: String,
    subscriber_id: u64,
}

impl Subscription {
    /// Remove the callback this subscription registered.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(subs) = inner.subscribers.get_mut(&self.session_id) {
            subs.retain(|(id, _)| *id != self.subscriber_id);
            if subs.is_empty() {
                inner.subscribers.remove(&self.session_id);
            }
        }
    }
}

/// Coordinates every live conversation stream in the process.
pub struct SessionStreamManager {
    transport: Arc<dyn SessionTransport>,
    inner: Arc<Mutex<Inner>>,
    seq: AtomicU64,
    refresh_tx: broadcast::Sender<String>,
}

impl SessionStreamManager {
    /// Create a manager driving the given transport. Build one per process
    /// and share it; do not construct per-view instances.
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        let (refresh_tx, _) = broadcast::channel(32);
        Self {
            transport,
            inner: Arc::new(Mutex::new(Inner::default())),
            seq: AtomicU64::new(1),
            refresh_tx,
        }
    }

    /// Register a callback for a session's state updates. If state already
    /// exists for the id the callback is invoked once immediately, so late
    /// subscribers never observe a stale "nothing loaded" flash.
    pub fn subscribe(
        &self,
        session_id: &str,
        callback: impl Fn(&StreamState) + Send + Sync + 'static,
    ) -> Subscription {
        let subscriber_id = self.seq.fetch_add(1, Ordering::Relaxed);
        let callback: SubscriberFn = Arc::new(callback);

        let replay = {
            let mut inner = self.inner.lock();
            inner
                .subscribers
                .entry(session_id.to_string())
                .or_default()
                .push((subscriber_id, callback.clone()));
            inner.states.get(session_id).cloned()
        };
        if let Some(state) = replay {
            invoke_subscriber(session_id, subscriber_id, &callback, &state);
        }

        Subscription {
            inner: Arc::clone(&self.inner),
            session_id: session_id.to_string(),
            subscriber_id,
        }
    }

    /// Snapshot of a session's current stream state, if any.
    pub fn get_state(&self, session_id: &str) -> Option<StreamState> {
        self.inner.lock().states.get(session_id).cloned()
    }

    /// Last cached (metadata, messages) snapshot, if any. Advisory: absence
    /// just means "re-fetch".
    pub fn get_cached_session(&self, session_id: &str) -> Option<CachedSession> {
        self.inner.lock().cache.get(session_id).cloned()
    }

    /// Store a known-good (metadata, messages) snapshot for a session.
    pub fn update_cache(&self, session_id: &str, session: Session, messages: Vec<Message>) {
        self.inner
            .lock()
            .cache
            .insert(session_id.to_string(), CachedSession { session, messages });
    }

    /// True while a stream is running for the session. Loading a
    /// conversation does not count.
    pub fn is_stream_active(&self, session_id: &str) -> bool {
        self.inner.lock().states.get(session_id).is_some_and(|state| {
            !matches!(
                state.chat_state,
                ChatState::Idle | ChatState::LoadingConversation
            )
        })
    }

    /// Ids of sessions with a live stream handle.
    pub fn active_session_ids(&self) -> Vec<String> {
        self.inner.lock().active.keys().cloned().collect()
    }

    /// Receiver for session-list refresh events: yields the session id when
    /// a freshly created session finishes its first stream.
    pub fn session_list_refreshed(&self) -> broadcast::Receiver<String> {
        self.refresh_tx.subscribe()
    }

    /// Fetch session metadata and history from the backend and reconcile
    /// them with local state.
    ///
    /// With no stream active the fetched history replaces local messages.
    /// With a stream in flight the longer message list wins (streamed
    /// content is authoritative once it outgrows the fetch), while the
    /// fetched metadata is adopted unconditionally and the token counters
    /// are re-seeded from it.
    pub async fn initialize_session(&self, session_id: &str) -> Result<Session> {
        let mark_loading = {
            let mut inner = self.inner.lock();
            let state = inner.states.entry(session_id.to_string()).or_default();
            if state.chat_state == ChatState::Idle {
                state.chat_state = ChatState::LoadingConversation;
                true
            } else {
                false
            }
        };
        if mark_loading {
            self.notify(session_id);
        }

        let mut session = match self.transport.resume(session_id).await {
            Ok(session) => session,
            Err(e) => {
                let reset = {
                    let mut inner = self.inner.lock();
                    match inner.states.get_mut(session_id) {
                        Some(state) if state.chat_state == ChatState::LoadingConversation => {
                            state.chat_state = ChatState::Idle;
                            true
                        }
                        _ => false,
                    }
                };
                if reset {
                    self.notify(session_id);
                }
                return Err(e);
            }
        };
        let fetched = session.take_conversation();

        {
            let mut inner = self.inner.lock();
            let streaming = inner.active.contains_key(session_id);
            let state = inner.states.entry(session_id.to_string()).or_default();
            if !streaming || fetched.len() > state.messages.len() {
                state.messages = fetched;
            }
            state.session = Some(session.clone());
            state.token_state = TokenState::from_session(&session);
            if state.chat_state == ChatState::LoadingConversation {
                state.chat_state = ChatState::Idle;
            }
            let messages = state.messages.clone();
            inner.cache.insert(
                session_id.to_string(),
                CachedSession { session: session.clone(), messages },
            );
        }
        self.notify(session_id);
        Ok(session)
    }

    /// Send messages to a session and drive its reply stream to completion.
    ///
    /// Any prior stream for the session is cancelled first; there is at
    /// most one live stream per session and no queueing. The future
    /// resolves when the stream terminates; expected failures surface
    /// through [`StreamState::error`], never as a return value.
    pub async fn start_stream(&self, session_id: &str, messages: Vec<Message>) {
        self.stop_stream(session_id);

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut inner = self.inner.lock();
            inner.active.insert(
                session_id.to_string(),
                ActiveStream { token: token.clone(), seq },
            );
            let state = inner.states.entry(session_id.to_string()).or_default();
            state.chat_state = ChatState::Streaming;
            state.notifications.clear();
            state.error = None;
        }
        tracing::debug!(session_id, "stream started");
        self.notify(session_id);

        let mut events = match self
            .transport
            .reply(session_id, messages, token.clone())
            .await
        {
            Ok(events) => events,
            Err(e) if e.is_aborted() || token.is_cancelled() => {
                self.settle_cancelled(session_id, seq);
                return;
            }
            Err(e) => {
                self.fail_stream(session_id, seq, e.to_string());
                return;
            }
        };

        while let Some(event) = events.next().await {
            // Cancellation contract: if our handle is gone (stopped,
            // preempted, or cleaned up), nothing we received may touch
            // state anymore.
            if !self.is_current(session_id, seq) {
                return;
            }
            match event {
                Ok(StreamEvent::Message { message, usage }) => {
                    {
                        let mut inner = self.inner.lock();
                        if let Some(state) = inner.states.get_mut(session_id) {
                            state.chat_state = chat_state_for(&message);
                            merge_message(&mut state.messages, message);
                            if let Some(usage) = usage {
                                state.token_state.apply(&usage);
                            }
                        }
                    }
                    self.notify(session_id);
                }
                Ok(StreamEvent::UpdateConversation { messages }) => {
                    {
                        let mut inner = self.inner.lock();
                        if let Some(state) = inner.states.get_mut(session_id) {
                            state.messages = messages;
                        }
                    }
                    self.notify(session_id);
                }
                Ok(StreamEvent::Notification { notification }) => {
                    {
                        let mut inner = self.inner.lock();
                        if let Some(state) = inner.states.get_mut(session_id) {
                            state.notifications.push(notification);
                        }
                    }
                    self.notify(session_id);
                }
                Ok(StreamEvent::ModelChange { .. } | StreamEvent::Ping) => {}
                Ok(StreamEvent::Error { error }) => {
                    self.fail_stream(session_id, seq, error);
                    return;
                }
                Ok(StreamEvent::Finish { .. }) => {
                    self.finish_stream(session_id, seq);
                    return;
                }
                Err(e) if e.is_aborted() => {
                    self.settle_cancelled(session_id, seq);
                    return;
                }
                Err(e) => {
                    self.fail_stream(session_id, seq, e.to_string());
                    return;
                }
            }
        }

        // The transport closed the sequence without a terminal event.
        self.finish_stream(session_id, seq);
    }

    /// Abort the session's active stream, if any. Leaves messages alone;
    /// a session already idle is untouched.
    pub fn stop_stream(&self, session_id: &str) {
        let changed = {
            let mut inner = self.inner.lock();
            if let Some(active) = inner.active.remove(session_id) {
                active.token.cancel();
                tracing::debug!(session_id, "stream cancelled");
            }
            match inner.states.get_mut(session_id) {
                Some(state) if state.chat_state != ChatState::Idle => {
                    state.chat_state = ChatState::Idle;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.notify(session_id);
        }
    }

    /// Drop everything the manager holds for a session: stream, state,
    /// subscribers, cache. Irreversible; the next access starts from
    /// scratch.
    pub fn cleanup(&self, session_id: &str) {
        self.stop_stream(session_id);
        let mut inner = self.inner.lock();
        inner.states.remove(session_id);
        inner.subscribers.remove(session_id);
        inner.cache.remove(session_id);
        tracing::debug!(session_id, "session cleaned up");
    }

    fn is_current(&self, session_id: &str, seq: u64) -> bool {
        self.inner.lock().active.get(session_id).map(|a| a.seq) == Some(seq)
    }

    /// Terminal error: record it, idle the session, drop the handle. Prior
    /// messages stay so the conversation is not lost.
    fn fail_stream(&self, session_id: &str, seq: u64, error: String) {
        let notify = {
            let mut inner = self.inner.lock();
            if inner.active.get(session_id).map(|a| a.seq) != Some(seq) {
                false
            } else {
                inner.active.remove(session_id);
                if let Some(state) = inner.states.get_mut(session_id) {
                    tracing::warn!(session_id, error = %error, "session stream failed");
                    state.error = Some(error);
                    state.chat_state = ChatState::Idle;
                }
                true
            }
        };
        if notify {
            self.notify(session_id);
        }
    }

    /// Normal completion: idle the session, write the snapshot through to
    /// the cache, and flag freshly created sessions to list observers.
    fn finish_stream(&self, session_id: &str, seq: u64) {
        let freshly_created = {
            let mut inner = self.inner.lock();
            if inner.active.get(session_id).map(|a| a.seq) != Some(seq) {
                return;
            }
            inner.active.remove(session_id);
            if let Some(state) = inner.states.get_mut(session_id) {
                state.chat_state = ChatState::Idle;
                if let Some(session) = state.session.clone() {
                    let messages = state.messages.clone();
                    inner
                        .cache
                        .insert(session_id.to_string(), CachedSession { session, messages });
                }
            }
            FRESH_SESSION_ID.is_match(session_id)
        };
        tracing::debug!(session_id, "stream finished");
        if freshly_created {
            let _ = self.refresh_tx.send(session_id.to_string());
        }
        self.notify(session_id);
    }

    /// The stream went away through cancellation rather than a terminal
    /// event; tidy up without recording an error.
    fn settle_cancelled(&self, session_id: &str, seq: u64) {
        let notify = {
            let mut inner = self.inner.lock();
            if inner.active.get(session_id).map(|a| a.seq) != Some(seq) {
                false
            } else {
                inner.active.remove(session_id);
                match inner.states.get_mut(session_id) {
                    Some(state) if state.chat_state != ChatState::Idle => {
                        state.chat_state = ChatState::Idle;
                        true
                    }
                    _ => false,
                }
            }
        };
        if notify {
            self.notify(session_id);
        }
    }

    /// Fan a state snapshot out to every subscriber of the session. The
    /// snapshot and subscriber list are taken under the lock; callbacks run
    /// outside it, so a callback may re-enter the manager.
    fn notify(&self, session_id: &str) {
        let (state, subscribers) = {
            let inner = self.inner.lock();
            let Some(state) = inner.states.get(session_id) else {
                return;
            };
            let subscribers = inner
                .subscribers
                .get(session_id)
                .cloned()
                .unwrap_or_default();
            (state.clone(), subscribers)
        };
        for (subscriber_id, callback) in &subscribers {
            invoke_subscriber(session_id, *subscriber_id, callback, &state);
        }
    }
}

/// Run one subscriber callback, containing panics so one bad observer
/// cannot break delivery to the rest.
fn invoke_subscriber(
    session_id: &str,
    subscriber_id: u64,
    callback: &SubscriberFn,
    state: &StreamState,
) {
    if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
        tracing::error!(
            session_id,
            subscriber_id,
            "subscriber callback panicked; continuing fan-out"
        );
    }
}
