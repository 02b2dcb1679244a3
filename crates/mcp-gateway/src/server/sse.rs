//! Registry of live SSE streams.
//!
//! Each `GET /mcp` registers an unbounded channel per stream; broadcasts
//! iterate a snapshot taken under the lock so the actual sends happen
//! lock-free. A send to a disconnected stream fails and evicts the handle,
//! so dead writers are cleaned up on the next delivery. The legacy `/sse`
//! endpoint registers into a sessionless bucket fed by global broadcasts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};

use crate::session::buffer::BufferedEvent;

#[derive(Debug)]
struct StreamHandle {
    id: u64,
    tx: mpsc::UnboundedSender<BufferedEvent>,
}

/// Live SSE writer registry, keyed by session.
#[derive(Debug, Default)]
pub struct SseStreamRegistry {
    next_handle: AtomicU64,
    by_session: RwLock<HashMap<String, Vec<StreamHandle>>>,
    sessionless: RwLock<Vec<StreamHandle>>,
}

impl SseStreamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self) -> (u64, StreamHandle, mpsc::UnboundedReceiver<BufferedEvent>) {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        (id, StreamHandle { id, tx }, rx)
    }

    /// Register a stream for a session; returns the handle id and the
    /// receiving end the transport drains into the response body.
    pub async fn register(
        &self,
        session_id: &str,
    ) -> (u64, mpsc::UnboundedReceiver<BufferedEvent>) {
        let (id, handle, rx) = self.handle();
        self.by_session
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(handle);
        tracing::debug!(session_id = %session_id, stream = id, "Registered SSE stream");
        (id, rx)
    }

    /// Register a sessionless stream (legacy `/sse`).
    pub async fn register_sessionless(&self) -> (u64, mpsc::UnboundedReceiver<BufferedEvent>) {
        let (id, handle, rx) = self.handle();
        self.sessionless.write().await.push(handle);
        (id, rx)
    }

    /// Drop one stream explicitly (client disconnect noticed by the transport).
    pub async fn unregister(&self, session_id: &str, handle_id: u64) {
        let mut streams = self.by_session.write().await;
        if let Some(handles) = streams.get_mut(session_id) {
            handles.retain(|h| h.id != handle_id);
            if handles.is_empty() {
                streams.remove(session_id);
            }
        }
    }

    /// Deliver an event to every live stream of a session. Streams whose
    /// send fails are evicted.
    pub async fn broadcast(&self, session_id: &str, event: &BufferedEvent) {
        let snapshot: Vec<(u64, mpsc::UnboundedSender<BufferedEvent>)> = {
            let streams = self.by_session.read().await;
            match streams.get(session_id) {
                Some(handles) => handles.iter().map(|h| (h.id, h.tx.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(event.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut streams = self.by_session.write().await;
            if let Some(handles) = streams.get_mut(session_id) {
                handles.retain(|h| !dead.contains(&h.id));
                if handles.is_empty() {
                    streams.remove(session_id);
                }
            }
            tracing::debug!(session_id = %session_id, evicted = dead.len(), "Evicted dead SSE streams");
        }
    }

    /// Deliver an event to every sessionless stream.
    pub async fn broadcast_sessionless(&self, event: &BufferedEvent) {
        let snapshot: Vec<(u64, mpsc::UnboundedSender<BufferedEvent>)> = {
            let streams = self.sessionless.read().await;
            streams.iter().map(|h| (h.id, h.tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(event.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            self.sessionless.write().await.retain(|h| !dead.contains(&h.id));
        }
    }

    /// Drop every stream belonging to a session (deletion/expiry).
    pub async fn clear_session(&self, session_id: &str) {
        self.by_session.write().await.remove(session_id);
    }

    /// Number of live streams for a session.
    pub async fn stream_count(&self, session_id: &str) -> usize {
        self.by_session.read().await.get(session_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> BufferedEvent {
        BufferedEvent::new(id, "message", "{}")
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_streams() {
        let registry = SseStreamRegistry::new();
        let (_, mut rx1) = registry.register("s").await;
        let (_, mut rx2) = registry.register("s").await;

        registry.broadcast("s", &event("s-1")).await;

        assert_eq!(rx1.recv().await.unwrap().event_id, "s-1");
        assert_eq!(rx2.recv().await.unwrap().event_id, "s-1");
    }

    #[tokio::test]
    async fn test_broadcast_is_per_session() {
        let registry = SseStreamRegistry::new();
        let (_, mut rx_a) = registry.register("a").await;
        let (_, mut rx_b) = registry.register("b").await;

        registry.broadcast("a", &event("a-1")).await;

        assert_eq!(rx_a.recv().await.unwrap().event_id, "a-1");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_stream_evicted_on_broadcast() {
        let registry = SseStreamRegistry::new();
        let (_, rx) = registry.register("s").await;
        drop(rx);
        let (_, mut live) = registry.register("s").await;

        registry.broadcast("s", &event("s-1")).await;

        assert_eq!(registry.stream_count("s").await, 1);
        assert_eq!(live.recv().await.unwrap().event_id, "s-1");
    }

    #[tokio::test]
    async fn test_unregister_and_clear() {
        let registry = SseStreamRegistry::new();
        let (id, _rx) = registry.register("s").await;
        registry.unregister("s", id).await;
        assert_eq!(registry.stream_count("s").await, 0);

        let (_, _rx2) = registry.register("s").await;
        registry.clear_session("s").await;
        assert_eq!(registry.stream_count("s").await, 0);
    }

    #[tokio::test]
    async fn test_sessionless_broadcast() {
        let registry = SseStreamRegistry::new();
        let (_, mut rx) = registry.register_sessionless().await;
        registry.broadcast_sessionless(&event("7")).await;
        assert_eq!(rx.recv().await.unwrap().event_id, "7");
    }
}
