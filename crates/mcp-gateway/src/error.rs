//! Error types for the MCP gateway.
//!
//! Uses `thiserror` for structured error handling. Handler failures stay
//! typed internally; the dispatcher boundary maps them onto JSON-RPC error
//! codes.

use crate::protocol::jsonrpc::{self, JsonRpcError};

/// Errors raised by procedure handlers (and the dispatcher around them).
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// Missing or ill-typed arguments.
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// What was wrong with the input.
        message: String,
    },

    /// The named procedure or resource does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was being looked up.
        message: String,
    },

    /// An invocation hook rejected the call.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Rejection reason.
        message: String,
    },

    /// An invocation hook vetoed the call; the hook's message is surfaced.
    #[error("{0}")]
    Vetoed(String),

    /// Argument (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected handler failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Create an invalid-params error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams { message: message.into() }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The JSON-RPC error code this failure maps to.
    #[must_use]
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::InvalidParams { .. } | Self::Serialization(_) => jsonrpc::code::INVALID_PARAMS,
            Self::NotFound { .. } => jsonrpc::code::METHOD_NOT_FOUND,
            Self::Unauthorized { .. } => jsonrpc::code::UNAUTHORIZED,
            Self::Vetoed(_) | Self::Internal(_) => jsonrpc::code::INTERNAL_ERROR,
        }
    }

    /// Convert into a wire error object. Internal failures carry the detail
    /// string in `data` so the top-level message stays stable.
    #[must_use]
    pub fn to_rpc_error(&self) -> JsonRpcError {
        match self {
            Self::Internal(detail) => JsonRpcError {
                code: jsonrpc::code::INTERNAL_ERROR,
                message: "Internal error".to_string(),
                data: Some(serde_json::json!({ "detail": detail })),
            },
            other => JsonRpcError {
                code: other.rpc_code(),
                message: other.to_string(),
                data: None,
            },
        }
    }
}

/// Errors raised while populating the catalog.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// Name does not match `^[A-Za-z0-9_.-]{1,128}$`.
    #[error("Invalid procedure name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A procedure of the same kind already uses this name.
    #[error("Duplicate {kind} name: {name:?}")]
    DuplicateName {
        /// Entry kind ("tool", "prompt", "resource").
        kind: &'static str,
        /// The conflicting name.
        name: String,
    },

    /// Resource URI is not a valid `scheme://path` URI.
    #[error("Invalid resource URI: {0}")]
    InvalidUri(#[from] url::ParseError),
}

/// Result type alias for handler operations.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Result type alias for catalog registration.
pub type CatalogResult<T> = Result<T, CatalogError>;
