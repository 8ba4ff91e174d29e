//! # JSON-RPC 2.0 Wire Layer
//!
//! Pure, transport-agnostic JSON-RPC 2.0 message types and parsing with a
//! clean domain/protocol separation. This crate owns the four envelope
//! shapes (request, response, error, notification), the reserved error
//! codes, and batch-aware message parsing; it carries no transport or
//! MCP-specific code.
//!
//! Handlers elsewhere return domain errors; the dispatch layer converts
//! them into [`JsonRpcError`] envelopes exactly once — an envelope that is
//! already an error is never wrapped again.

pub mod error;
pub mod message;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

pub use error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcTransportError};
pub use message::{parse_message, IncomingMessage, MessageBatch};
pub use notification::JsonRpcNotification;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::{JsonRpcMessage, JsonRpcResponse};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
