//! Wire formats: JSON-RPC 2.0 envelopes, stream frames, protocol versions.

pub mod jsonrpc;
pub mod stream;
pub mod version;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcBody};
pub use stream::{StreamMessage, StreamMessageType, StreamMeta, BINARY_HEADER_LEN};
