//! Stream connector for WebSocket streaming tools.
//!
//! The WebSocket read loop feeds inbound frames into a [`StreamInbox`],
//! which validates sequencing (no data after `done`, chunk modality must
//! match the announced `meta.binary`) and turns frames into [`StreamEvent`]s
//! for the handler. Outbound, handlers open text or binary writers that
//! frame chunks with monotonically increasing indices. All writes go
//! through one channel per connection, so frames stay atomic on the wire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::jsonrpc::{JsonRpcError, code};
use crate::protocol::stream::{
    self, StreamMessage, StreamMessageType, StreamMeta, decode_binary_frame, encode_binary_frame,
};

/// An outbound WebSocket frame, already serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl WsFrame {
    fn message(msg: &StreamMessage) -> Self {
        // StreamMessage contains only serializable fields.
        Self::Text(serde_json::to_string(msg).unwrap_or_default())
    }
}

/// Inbound event delivered to a streaming tool handler.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A (sub-)stream opened by the peer.
    Started { id: Uuid, meta: StreamMeta },
    /// Text chunk with its sequence index.
    TextChunk { id: Uuid, index: u64, data: String },
    /// Binary chunk with its sequence index.
    BinaryChunk { id: Uuid, index: u64, payload: Bytes },
    /// The peer finished the stream.
    Done { id: Uuid, summary: Option<serde_json::Value> },
    /// The stream failed (peer-sent, validation, or idle timeout).
    Error { id: Uuid, error: JsonRpcError },
}

#[derive(Debug, Default)]
struct InboundState {
    binary: bool,
    done: bool,
    errored: bool,
}

/// State shared between the read-loop side and the handler side.
#[derive(Debug)]
struct Shared {
    outbound: mpsc::UnboundedSender<WsFrame>,
    states: Mutex<HashMap<Uuid, InboundState>>,
}

impl Shared {
    fn send(&self, frame: WsFrame) {
        // A closed channel means the connection is gone; nothing to do.
        let _ = self.outbound.send(frame);
    }

    fn fail_stream(&self, id: Uuid, message: &str) -> StreamEvent {
        if let Some(state) = self.states.lock().expect("stream state lock").get_mut(&id) {
            state.errored = true;
        }
        let frame = StreamMessage::error(id.to_string(), code::TRANSPORT_ERROR, message);
        self.send(WsFrame::message(&frame));
        StreamEvent::Error {
            id,
            error: JsonRpcError {
                code: code::TRANSPORT_ERROR,
                message: message.to_string(),
                data: None,
            },
        }
    }

    /// The single live inbound stream, when unambiguous.
    fn sole_active_stream(&self) -> Option<Uuid> {
        let states = self.states.lock().expect("stream state lock");
        let mut live = states.iter().filter(|(_, s)| !s.done && !s.errored);
        match (live.next(), live.next()) {
            (Some((id, _)), None) => Some(*id),
            _ => None,
        }
    }
}

/// Read-loop side: validates inbound frames and emits [`StreamEvent`]s.
pub struct StreamInbox {
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl StreamInbox {
    fn emit(&self, event: StreamEvent) {
        let _ = self.events.send(event);
    }

    /// Process an inbound `StreamMessage` text frame.
    pub fn accept_message(&self, msg: StreamMessage) {
        let Ok(id) = Uuid::parse_str(&msg.id) else {
            let frame = StreamMessage::error(
                msg.id.clone(),
                code::INVALID_REQUEST,
                "Stream id is not a UUID",
            );
            self.shared.send(WsFrame::message(&frame));
            return;
        };

        match msg.message_type {
            StreamMessageType::Start => {
                let meta = msg.meta.unwrap_or_default();
                self.shared
                    .states
                    .lock()
                    .expect("stream state lock")
                    .insert(id, InboundState { binary: meta.binary, ..InboundState::default() });
                self.emit(StreamEvent::Started { id, meta });
            }
            StreamMessageType::Chunk => {
                match self.check_data(id, false) {
                    DataCheck::Ok => {
                        self.emit(StreamEvent::TextChunk {
                            id,
                            index: msg.index.unwrap_or(0),
                            data: msg.data.unwrap_or_default(),
                        });
                    }
                    DataCheck::Dropped => {}
                    DataCheck::Failed(event) => self.emit(event),
                }
            }
            StreamMessageType::Done => {
                let known = {
                    let mut states = self.shared.states.lock().expect("stream state lock");
                    states.get_mut(&id).map(|s| s.done = true).is_some()
                };
                if known {
                    self.emit(StreamEvent::Done { id, summary: msg.summary });
                }
            }
            StreamMessageType::Error => {
                if let Some(state) =
                    self.shared.states.lock().expect("stream state lock").get_mut(&id)
                {
                    state.errored = true;
                }
                self.emit(StreamEvent::Error {
                    id,
                    error: msg.error.unwrap_or(JsonRpcError {
                        code: code::TRANSPORT_ERROR,
                        message: "Stream error".to_string(),
                        data: None,
                    }),
                });
            }
        }
    }

    /// Process an inbound binary frame (24-byte header + payload).
    pub fn accept_binary(&self, frame: &Bytes) {
        match decode_binary_frame(frame) {
            Ok(chunk) => match self.check_data(chunk.stream_id, true) {
                DataCheck::Ok => {
                    self.emit(StreamEvent::BinaryChunk {
                        id: chunk.stream_id,
                        index: chunk.index,
                        payload: chunk.payload,
                    });
                }
                DataCheck::Dropped => {}
                DataCheck::Failed(event) => self.emit(event),
            },
            Err(stream::FrameError::TooShort(_)) => {
                // No header to attribute the frame; fail the sole live
                // stream when that is unambiguous.
                let id = self.shared.sole_active_stream().unwrap_or(Uuid::nil());
                let event = self.shared.fail_stream(id, "Binary frame shorter than header");
                self.emit(event);
            }
        }
    }

    /// Fail every live stream. Used on idle timeout and connection teardown.
    pub fn fail_all(&self, message: &str) {
        let live: Vec<Uuid> = {
            let states = self.shared.states.lock().expect("stream state lock");
            states
                .iter()
                .filter(|(_, s)| !s.done && !s.errored)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in live {
            let event = self.shared.fail_stream(id, message);
            self.emit(event);
        }
    }

    /// Whether any inbound stream is still live.
    #[must_use]
    pub fn has_active_streams(&self) -> bool {
        self.shared
            .states
            .lock()
            .expect("stream state lock")
            .values()
            .any(|s| !s.done && !s.errored)
    }

    fn check_data(&self, id: Uuid, is_binary: bool) -> DataCheck {
        let verdict = {
            let states = self.shared.states.lock().expect("stream state lock");
            match states.get(&id) {
                None => Verdict::Unknown,
                Some(s) if s.errored => Verdict::Drop,
                Some(s) if s.done => Verdict::AfterDone,
                Some(s) if s.binary != is_binary => Verdict::Mismatch,
                Some(_) => Verdict::Ok,
            }
        };
        match verdict {
            Verdict::Ok => DataCheck::Ok,
            Verdict::Drop => DataCheck::Dropped,
            Verdict::Unknown => {
                DataCheck::Failed(self.shared.fail_stream(id, "Unknown stream"))
            }
            Verdict::AfterDone => {
                DataCheck::Failed(self.shared.fail_stream(id, "Data received after done"))
            }
            Verdict::Mismatch => DataCheck::Failed(
                self.shared.fail_stream(id, "Chunk modality does not match stream"),
            ),
        }
    }
}

enum Verdict {
    Ok,
    Drop,
    Unknown,
    AfterDone,
    Mismatch,
}

enum DataCheck {
    Ok,
    Dropped,
    Failed(StreamEvent),
}

/// Handler-facing side of a streaming connection.
pub struct StreamConnector {
    shared: Arc<Shared>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<StreamEvent>>,
    idle_timeout: Duration,
}

impl StreamConnector {
    /// Create a connector pair: the connector for the handler and the inbox
    /// for the connection read loop.
    #[must_use]
    pub fn new(
        outbound: mpsc::UnboundedSender<WsFrame>,
        idle_timeout: Duration,
    ) -> (Arc<Self>, StreamInbox) {
        let shared = Arc::new(Shared { outbound, states: Mutex::new(HashMap::new()) });
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let connector = Arc::new(Self {
            shared: Arc::clone(&shared),
            events: tokio::sync::Mutex::new(events_rx),
            idle_timeout,
        });
        let inbox = StreamInbox { shared, events: events_tx };
        (connector, inbox)
    }

    /// Next inbound event.
    ///
    /// Returns `None` when the connection closed. If no frame arrives within
    /// the idle timeout, every live inbound stream is failed and the timeout
    /// error is returned as an event.
    pub async fn next_event(&self) -> Option<StreamEvent> {
        let mut events = self.events.lock().await;
        match tokio::time::timeout(self.idle_timeout, events.recv()).await {
            Ok(event) => event,
            Err(_) => {
                let id = self.shared.sole_active_stream().unwrap_or(Uuid::nil());
                Some(self.shared.fail_stream(id, "Stream timeout"))
            }
        }
    }

    /// Open an outbound text stream; sends the `start` frame.
    #[must_use]
    pub fn open_text(&self, mut meta: StreamMeta) -> TextStreamWriter {
        meta.binary = false;
        let id = Uuid::new_v4();
        self.shared.send(WsFrame::message(&StreamMessage::start(id.to_string(), meta)));
        TextStreamWriter { inner: OutboundStream::new(Arc::clone(&self.shared), id) }
    }

    /// Open an outbound binary stream; sends the `start` frame.
    #[must_use]
    pub fn open_binary(&self, mut meta: StreamMeta) -> BinaryStreamWriter {
        meta.binary = true;
        let id = Uuid::new_v4();
        self.shared.send(WsFrame::message(&StreamMessage::start(id.to_string(), meta)));
        BinaryStreamWriter { inner: OutboundStream::new(Arc::clone(&self.shared), id) }
    }
}

impl std::fmt::Debug for StreamConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnector").field("idle_timeout", &self.idle_timeout).finish()
    }
}

struct OutboundStream {
    shared: Arc<Shared>,
    id: Uuid,
    next_index: u64,
    closed: bool,
}

impl OutboundStream {
    fn new(shared: Arc<Shared>, id: Uuid) -> Self {
        Self { shared, id, next_index: 0, closed: false }
    }

    fn complete(&mut self, summary: Option<serde_json::Value>) {
        if !self.closed {
            self.closed = true;
            self.shared.send(WsFrame::message(&StreamMessage::done(self.id.to_string(), summary)));
        }
    }

    fn fail(&mut self, code: i32, message: &str) {
        if !self.closed {
            self.closed = true;
            self.shared
                .send(WsFrame::message(&StreamMessage::error(self.id.to_string(), code, message)));
        }
    }
}

/// Outbound text stream handle.
pub struct TextStreamWriter {
    inner: OutboundStream,
}

impl TextStreamWriter {
    /// Stream id announced in the `start` frame.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Send one text chunk. No-op after `complete`/`fail`.
    pub fn write_chunk(&mut self, data: impl Into<String>) {
        if self.inner.closed {
            return;
        }
        let index = self.inner.next_index;
        self.inner.next_index += 1;
        self.inner.shared.send(WsFrame::message(&StreamMessage::chunk(
            self.inner.id.to_string(),
            index,
            data,
        )));
    }

    /// Finish the stream with an optional summary.
    pub fn complete(mut self, summary: Option<serde_json::Value>) {
        self.inner.complete(summary);
    }

    /// Fail the stream.
    pub fn fail(mut self, code: i32, message: &str) {
        self.inner.fail(code, message);
    }
}

/// Outbound binary stream handle.
pub struct BinaryStreamWriter {
    inner: OutboundStream,
}

impl BinaryStreamWriter {
    /// Stream id announced in the `start` frame.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Send one binary chunk framed as `[UUID][index][payload]`.
    pub fn write(&mut self, payload: &[u8]) {
        if self.inner.closed {
            return;
        }
        let index = self.inner.next_index;
        self.inner.next_index += 1;
        self.inner
            .shared
            .send(WsFrame::Binary(encode_binary_frame(self.inner.id, index, payload)));
    }

    /// Finish the stream with an optional summary.
    pub fn complete(mut self, summary: Option<serde_json::Value>) {
        self.inner.complete(summary);
    }

    /// Fail the stream.
    pub fn fail(mut self, code: i32, message: &str) {
        self.inner.fail(code, message);
    }
}
