//! JSON-RPC 2.0 envelopes.
//!
//! Requests, notifications (requests without an `id`) and responses, plus
//! the error-code vocabulary the dispatcher maps failures onto.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// JSON-RPC error codes used across the gateway.
pub mod code {
    /// Malformed JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Structurally invalid envelope.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Unknown method, or tool not invocable on this transport.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Missing or ill-typed parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Unexpected handler or hook failure.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Generic transport failure (also used for stream faults).
    pub const TRANSPORT_ERROR: i32 = -32000;
    /// Unsupported protocol version.
    pub const VERSION_MISMATCH: i32 = -32001;
    /// Authorization rejected.
    pub const UNAUTHORIZED: i32 = -32002;
}

/// JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// A notification is a request without an `id`; it yields no response.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The envelope is structurally valid iff `jsonrpc` is exactly "2.0"
    /// and the method name is non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == JsonRpcResponse::VERSION && !self.method.is_empty()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// JSON-RPC version constant.
    pub const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: Some(result),
            error: None,
            id,
        }
    }

    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self::error_with_data(id, code, message, None)
    }

    #[must_use]
    pub fn error_with_data(
        id: Option<serde_json::Value>,
        code: i32,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data }),
            id,
        }
    }

    /// A response with both `result` and `error` set is a programmer error;
    /// the error wins.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A decoded POST body: one envelope or a batch.
#[derive(Debug, Clone)]
pub enum RpcBody {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

impl RpcBody {
    /// Decode a request body, distinguishing a single envelope from a batch.
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        if value.is_array() {
            Ok(Self::Batch(serde_json::from_value(value)?))
        } else {
            Ok(Self::Single(serde_json::from_value(value)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_notification_detection() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#).unwrap();
        assert!(!req.is_notification());
        assert!(req.is_valid());

        let note: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(note.is_notification());
    }

    #[test]
    fn test_invalid_envelope() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"1.0","method":"x","id":1}"#).unwrap();
        assert!(!req.is_valid());

        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"","id":1}"#).unwrap();
        assert!(!req.is_valid());
    }

    #[test]
    fn test_response_id_round_trip() {
        let response = JsonRpcResponse::success(
            Some(serde_json::json!("abc")),
            serde_json::json!({"ok": true}),
        );
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["id"], "abc");
        assert_eq!(encoded["jsonrpc"], "2.0");
        assert!(encoded.get("error").is_none());
    }

    #[test]
    fn test_error_response_shape() {
        let response = JsonRpcResponse::error(None, code::METHOD_NOT_FOUND, "no such method");
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["error"]["code"], -32601);
        // Parse errors carry a null id on the wire.
        assert!(encoded["id"].is_null());
        assert!(encoded.get("result").is_none());
    }

    #[test]
    fn test_body_decode_single_and_batch() {
        let single = RpcBody::decode(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
        assert!(matches!(single, RpcBody::Single(_)));

        let batch = RpcBody::decode(
            br#"[{"jsonrpc":"2.0","method":"ping","id":1},{"jsonrpc":"2.0","method":"ping"}]"#,
        )
        .unwrap();
        match batch {
            RpcBody::Batch(requests) => assert_eq!(requests.len(), 2),
            RpcBody::Single(_) => panic!("expected batch"),
        }
    }

    #[test]
    fn test_body_decode_malformed() {
        assert!(RpcBody::decode(b"{not json").is_err());
    }
}
