//! The JSON-RPC error code space and error envelope.
//!
//! Three layers, outermost first: [`JsonRpcError`] is the on-wire
//! envelope (typed [`JsonRpcVersion`], optional id, error object),
//! [`JsonRpcErrorObject`] is its `error` member, and
//! [`JsonRpcErrorCode`] names the reserved code space. The object is
//! composed builder-style — start from a code, attach a message or
//! `data` as needed — so every call site states only what it overrides.
//!
//! Error envelopes flow in both directions here: the dispatcher emits
//! them for failed client requests, and clients POST them back to answer
//! server-initiated requests (ids in the `srv-` namespace, see
//! [`RequestId::is_server_initiated`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::types::{JsonRpcVersion, RequestId};

/// The reserved JSON-RPC 2.0 codes plus the implementation-defined
/// server range (`-32099..=-32000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError(i64),
}

impl JsonRpcErrorCode {
    /// Classify a numeric code. Codes outside the reserved space and
    /// the server range are not representable and yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(JsonRpcErrorCode::ParseError),
            -32600 => Some(JsonRpcErrorCode::InvalidRequest),
            -32601 => Some(JsonRpcErrorCode::MethodNotFound),
            -32602 => Some(JsonRpcErrorCode::InvalidParams),
            -32603 => Some(JsonRpcErrorCode::InternalError),
            code if (-32099..=-32000).contains(&code) => {
                Some(JsonRpcErrorCode::ServerError(code))
            }
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => -32700,
            JsonRpcErrorCode::InvalidRequest => -32600,
            JsonRpcErrorCode::MethodNotFound => -32601,
            JsonRpcErrorCode::InvalidParams => -32602,
            JsonRpcErrorCode::InternalError => -32603,
            JsonRpcErrorCode::ServerError(code) => *code,
        }
    }

    /// The message used when a call site does not supply its own.
    pub fn default_message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
            JsonRpcErrorCode::ServerError(_) => "Server error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.code())
    }
}

/// The `error` member of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    /// An object carrying the code's default message and no data.
    pub fn new(code: JsonRpcErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Replace the default message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach supplementary data (the dispatcher puts panic text here).
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The code space entry this object's numeric code falls into, when
    /// it falls into any.
    pub fn kind(&self) -> Option<JsonRpcErrorCode> {
        JsonRpcErrorCode::from_code(self.code)
    }
}

impl From<JsonRpcErrorCode> for JsonRpcErrorObject {
    fn from(code: JsonRpcErrorCode) -> Self {
        Self::new(code)
    }
}

/// The error envelope.
///
/// `id` is `None` only when the failing request's id could not be read
/// (a parse error); everywhere else the envelope echoes the request id
/// so the peer can correlate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            error,
        }
    }

    /// `-32700` with a null id: the body never yielded a request id.
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorCode::ParseError.into())
    }

    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorCode::InvalidRequest.into())
    }

    /// `-32600` carrying the rejection reason in `data`.
    pub fn invalid_request_with_reason(id: Option<RequestId>, reason: &str) -> Self {
        Self::new(
            id,
            JsonRpcErrorObject::new(JsonRpcErrorCode::InvalidRequest)
                .with_data(Value::String(reason.to_string())),
        )
    }

    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorObject::new(JsonRpcErrorCode::MethodNotFound)
                .with_message(format!("Method '{}' not found", method)),
        )
    }

    pub fn invalid_params(id: RequestId, message: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorObject::new(JsonRpcErrorCode::InvalidParams).with_message(message),
        )
    }

    pub fn internal_error(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorObject::new(JsonRpcErrorCode::InternalError).with_message(message),
        )
    }

    /// Whether this envelope answers a server-initiated request — its
    /// id sits in the `srv-` namespace, so it arrived (or is about to
    /// be sent) as a POSTed-back reply rather than as the response to a
    /// client call.
    pub fn concerns_peer_request(&self) -> bool {
        self.id
            .as_ref()
            .is_some_and(RequestId::is_server_initiated)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JSON-RPC Error {}: {}",
            self.error.code, self.error.message
        )
    }
}

impl std::error::Error for JsonRpcError {}

/// Transport-level failures around message handling. These never reach
/// the wire; the envelope types above do.
#[derive(Debug, Error)]
pub enum JsonRpcTransportError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_space_roundtrip() {
        for code in [-32700, -32600, -32601, -32602, -32603, -32000, -32099] {
            let kind = JsonRpcErrorCode::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        // outside the reserved space and the server range
        assert!(JsonRpcErrorCode::from_code(-32100).is_none());
        assert!(JsonRpcErrorCode::from_code(0).is_none());
        assert!(JsonRpcErrorCode::from_code(-31999).is_none());
    }

    #[test]
    fn test_object_builder_composition() {
        let object = JsonRpcErrorObject::new(JsonRpcErrorCode::InternalError)
            .with_message("handler failed")
            .with_data(Value::String("stack".to_string()));

        assert_eq!(object.code, -32603);
        assert_eq!(object.message, "handler failed");
        assert_eq!(object.data, Some(Value::String("stack".to_string())));
        assert_eq!(object.kind(), Some(JsonRpcErrorCode::InternalError));
    }

    #[test]
    fn test_default_messages() {
        let object = JsonRpcErrorObject::new(JsonRpcErrorCode::MethodNotFound);
        assert_eq!(object.message, "Method not found");
        assert!(object.data.is_none());
    }

    #[test]
    fn test_envelope_version_is_typed() {
        let error = JsonRpcError::method_not_found(RequestId::Number(1), "bogus/method");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(json["error"]["message"], "Method 'bogus/method' not found");

        let decoded: JsonRpcError = serde_json::from_str(&json.to_string()).unwrap();
        assert_eq!(decoded.version, JsonRpcVersion::V2_0);
        assert_eq!(decoded, error);
    }

    #[test]
    fn test_parse_error_has_null_id() {
        let json = serde_json::to_value(JsonRpcError::parse_error()).unwrap();
        assert!(json["id"].is_null());
        assert_eq!(json["error"]["code"], -32700);
    }

    #[test]
    fn test_invalid_request_reason_lands_in_data() {
        let error = JsonRpcError::invalid_request_with_reason(None, "jsonrpc version missing");
        assert_eq!(error.error.code, -32600);
        assert_eq!(
            error.error.data,
            Some(Value::String("jsonrpc version missing".to_string()))
        );
    }

    #[test]
    fn test_peer_reply_namespace() {
        // a client answering a server-initiated request echoes its srv- id
        let reply = JsonRpcError::method_not_found(RequestId::from("srv-4"), "roots/list");
        assert!(reply.concerns_peer_request());

        let ordinary = JsonRpcError::invalid_params(RequestId::Number(7), "missing 'name'");
        assert!(!ordinary.concerns_peer_request());

        let parse = JsonRpcError::parse_error();
        assert!(!parse.concerns_peer_request());
    }

    #[test]
    fn test_display() {
        let error = JsonRpcError::internal_error(Some(RequestId::Number(1)), "boom");
        assert_eq!(error.to_string(), "JSON-RPC Error -32603: boom");
        assert_eq!(
            JsonRpcErrorCode::ParseError.to_string(),
            "Parse error (-32700)"
        );
    }
}
