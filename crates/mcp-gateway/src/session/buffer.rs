//! Bounded per-session message buffer with `Last-Event-ID` replay.

use std::collections::VecDeque;
use std::time::Instant;

/// A buffered server-to-client event, keyed by its event id.
#[derive(Clone, Debug)]
pub struct BufferedEvent {
    /// Event id (`{session}-{n}`, or `{n}` for sessionless events).
    pub event_id: String,
    /// SSE event type (`message`, `done`, `error`).
    pub event_type: String,
    /// JSON payload.
    pub data: String,
    /// When the event was accepted.
    pub created_at: Instant,
}

impl BufferedEvent {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            data: data.into(),
            created_at: Instant::now(),
        }
    }
}

/// Bounded FIFO of events. On overflow the oldest entry is discarded, so
/// the buffer always holds the most recent `max_size` events in order.
#[derive(Debug)]
pub struct MessageBuffer {
    entries: VecDeque<BufferedEvent>,
    max_size: usize,
}

impl MessageBuffer {
    /// Create a buffer holding at most `max_size` events (minimum 1).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self { entries: VecDeque::with_capacity(max_size), max_size }
    }

    /// Append an event, evicting the oldest entry when full.
    pub fn add(&mut self, event: BufferedEvent) {
        if self.entries.len() >= self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Events strictly after `last_event_id`, in FIFO order.
    ///
    /// When the id is unknown (evicted, or the client is too far behind) the
    /// entire buffer is returned so the client can resynchronize.
    #[must_use]
    pub fn events_after(&self, last_event_id: Option<&str>) -> Vec<BufferedEvent> {
        match last_event_id {
            None => self.entries.iter().cloned().collect(),
            Some(last) => self
                .entries
                .iter()
                .position(|e| e.event_id == last)
                .map_or_else(
                    || self.entries.iter().cloned().collect(),
                    |pos| self.entries.iter().skip(pos + 1).cloned().collect(),
                ),
        }
    }

    /// Drop every buffered event.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
