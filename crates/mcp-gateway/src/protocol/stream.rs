//! WebSocket streaming sub-protocol.
//!
//! Text frames carry [`StreamMessage`] JSON (`start`/`chunk`/`done`/`error`).
//! Binary frames are not JSON: the first 24 bytes are a fixed header of
//! `[16B stream UUID][8B big-endian chunk index]`, the remainder is payload.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jsonrpc::JsonRpcError;

/// Length of the binary chunk header.
pub const BINARY_HEADER_LEN: usize = 24;

/// Frame type of a stream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMessageType {
    Start,
    Chunk,
    Done,
    Error,
}

/// Metadata announced by a `start` frame.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StreamMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub binary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, rename = "totalSize", skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

/// One frame of the start/chunk/done/error streaming protocol.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub message_type: StreamMessageType,
    /// Stream UUID in hyphenated form.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<StreamMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl StreamMessage {
    #[must_use]
    pub fn start(id: impl Into<String>, meta: StreamMeta) -> Self {
        Self {
            message_type: StreamMessageType::Start,
            id: id.into(),
            index: None,
            meta: Some(meta),
            data: None,
            summary: None,
            error: None,
        }
    }

    #[must_use]
    pub fn chunk(id: impl Into<String>, index: u64, data: impl Into<String>) -> Self {
        Self {
            message_type: StreamMessageType::Chunk,
            id: id.into(),
            index: Some(index),
            meta: None,
            data: Some(data.into()),
            summary: None,
            error: None,
        }
    }

    #[must_use]
    pub fn done(id: impl Into<String>, summary: Option<serde_json::Value>) -> Self {
        Self {
            message_type: StreamMessageType::Done,
            id: id.into(),
            index: None,
            meta: None,
            data: None,
            summary,
            error: None,
        }
    }

    #[must_use]
    pub fn error(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            message_type: StreamMessageType::Error,
            id: id.into(),
            index: None,
            meta: None,
            data: None,
            summary: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
        }
    }
}

/// A decoded binary chunk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryChunk {
    pub stream_id: Uuid,
    pub index: u64,
    pub payload: Bytes,
}

/// Binary frame decoding failure.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than the fixed 24-byte header.
    #[error("binary frame too short: {0} bytes, need at least {BINARY_HEADER_LEN}")]
    TooShort(usize),
}

/// Encode a binary chunk frame: `[UUID(16)][index(8, big-endian)][payload]`.
///
/// The UUID is laid out in canonical RFC 4122 byte order.
#[must_use]
pub fn encode_binary_frame(stream_id: Uuid, index: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(BINARY_HEADER_LEN + payload.len());
    frame.extend_from_slice(stream_id.as_bytes());
    frame.extend_from_slice(&index.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Decode a binary chunk frame into its header fields and payload.
pub fn decode_binary_frame(frame: &Bytes) -> Result<BinaryChunk, FrameError> {
    if frame.len() < BINARY_HEADER_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }
    let mut uuid_bytes = [0u8; 16];
    uuid_bytes.copy_from_slice(&frame[..16]);
    let mut index_bytes = [0u8; 8];
    index_bytes.copy_from_slice(&frame[16..24]);

    Ok(BinaryChunk {
        stream_id: Uuid::from_bytes(uuid_bytes),
        index: u64::from_be_bytes(index_bytes),
        payload: frame.slice(BINARY_HEADER_LEN..),
    })
}
