//! Session lifecycle and event-id generation.
//!
//! A session is created by the first `initialize` over Streamable HTTP and
//! identified by the `MCP-Session-Id` header. It owns a monotonic event
//! counter and a bounded replay buffer. Sessions expire after an idle
//! timeout; expired sessions are purged on next access and by a periodic
//! sweep.

pub mod buffer;
pub mod subscriptions;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use buffer::{BufferedEvent, MessageBuffer};

/// Monotonic event-id source.
///
/// Ids are `{session}-{n}` within a session and plain `{n}` for sessionless
/// (global) events; `n` starts at 1 and increments atomically.
#[derive(Debug, Default)]
pub struct EventIdGenerator {
    counter: AtomicU64,
}

impl EventIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id, scoped to `session_id` when present.
    #[must_use]
    pub fn next(&self, session_id: Option<&str>) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        match session_id {
            Some(session) => format!("{session}-{n}"),
            None => n.to_string(),
        }
    }

    /// How many ids have been handed out.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// One MCP session.
pub struct Session {
    /// 32-hex session identifier.
    pub id: String,
    /// When the session was created.
    pub created_at: Instant,
    events: EventIdGenerator,
    buffer: Mutex<MessageBuffer>,
    last_activity: RwLock<Instant>,
}

impl Session {
    #[must_use]
    pub fn new(id: String, buffer_size: usize) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            events: EventIdGenerator::new(),
            buffer: Mutex::new(MessageBuffer::new(buffer_size)),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Next event id for this session (`{id}-{n}`).
    #[must_use]
    pub fn next_event_id(&self) -> String {
        self.events.next(Some(&self.id))
    }

    /// Assign an event id, buffer the payload, and return the stored event.
    pub async fn buffer_event(
        &self,
        event_type: impl Into<String>,
        data: impl Into<String>,
    ) -> BufferedEvent {
        let event = BufferedEvent::new(self.next_event_id(), event_type, data);
        self.buffer.lock().await.add(event.clone());
        event
    }

    /// Buffered events strictly after `last_event_id` (see [`MessageBuffer`]).
    pub async fn replay_after(&self, last_event_id: Option<&str>) -> Vec<BufferedEvent> {
        self.buffer.lock().await.events_after(last_event_id)
    }

    /// Number of buffered events.
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Drop all buffered events.
    pub async fn clear_buffer(&self) {
        self.buffer.lock().await.clear();
    }

    /// Bump the activity timestamp.
    pub async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    /// Whether the session has been idle past `timeout`.
    pub async fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().await.elapsed() > timeout
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("events_issued", &self.events.issued())
            .finish()
    }
}

/// Registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    timeout: Duration,
    buffer_size: usize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(timeout: Duration, buffer_size: usize) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), timeout, buffer_size }
    }

    /// Create a fresh session with a 32-hex id.
    pub async fn create(&self) -> Arc<Session> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let session = Arc::new(Session::new(id.clone(), self.buffer_size));
        self.sessions.write().await.insert(id, Arc::clone(&session));

        tracing::info!(session_id = %session.id, "Created session");
        session
    }

    /// Validate a session id: bumps activity on success, purges the entry
    /// and returns `None` when the session is unknown or expired.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        if session.is_expired(self.timeout).await {
            self.remove(id).await;
            return None;
        }
        session.touch().await;
        Some(session)
    }

    /// Remove a session. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = &removed {
            session.clear_buffer().await;
            tracing::info!(session_id = %id, "Removed session");
        }
        removed.is_some()
    }

    /// Remove every expired session and return the removed ids so callers
    /// can release per-session state held elsewhere.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.is_expired(self.timeout).await {
                    expired.push(id.clone());
                }
            }
        }

        if !expired.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in &expired {
                sessions.remove(id);
                tracing::info!(session_id = %id, "Expired session");
            }
        }
        expired
    }

    /// Ids of all live sessions (snapshot).
    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Session lookup without expiry check or activity bump; used by the
    /// notification router, which must not keep idle sessions alive.
    pub async fn peek(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Live session count.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").field("timeout", &self.timeout).finish()
    }
}
