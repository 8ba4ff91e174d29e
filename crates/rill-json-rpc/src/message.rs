//! Inbound message parsing.
//!
//! A POST body may hold a single JSON-RPC message or a batch (JSON
//! array). Parsing inspects the object shape rather than relying on
//! untagged deserialization order: a `method` with an `id` is a request,
//! a `method` without one is a notification, an `error` field is an
//! error envelope, and a `result` field is a response — the latter two
//! arrive when a client posts back the answer to a server-initiated
//! request.

use serde_json::Value;

use crate::error::JsonRpcError;
use crate::notification::JsonRpcNotification;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcMessage;

/// Any message a peer may legally send us.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A response or error posted back for a server-initiated request.
    Reply(JsonRpcMessage),
}

impl IncomingMessage {
    pub fn method(&self) -> Option<&str> {
        match self {
            IncomingMessage::Request(req) => Some(&req.method),
            IncomingMessage::Notification(n) => Some(&n.method),
            IncomingMessage::Reply(_) => None,
        }
    }
}

/// A parsed POST body: a single message or a batch.
#[derive(Debug, Clone)]
pub enum MessageBatch {
    Single(IncomingMessage),
    Batch(Vec<IncomingMessage>),
}

impl MessageBatch {
    pub fn is_batch(&self) -> bool {
        matches!(self, MessageBatch::Batch(_))
    }

    pub fn into_messages(self) -> Vec<IncomingMessage> {
        match self {
            MessageBatch::Single(msg) => vec![msg],
            MessageBatch::Batch(msgs) => msgs,
        }
    }
}

/// Parse a request body into one message or a batch.
///
/// Returns a ready-to-send [`JsonRpcError`] on malformed input:
/// `-32700` when the body is not JSON, `-32600` when it is JSON of the
/// wrong shape (including an empty batch).
pub fn parse_message(body: &str) -> Result<MessageBatch, JsonRpcError> {
    let value: Value = serde_json::from_str(body).map_err(|_| JsonRpcError::parse_error())?;

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(JsonRpcError::invalid_request(None));
            }
            let mut messages = Vec::with_capacity(items.len());
            for item in items {
                messages.push(parse_single(item)?);
            }
            Ok(MessageBatch::Batch(messages))
        }
        other => Ok(MessageBatch::Single(parse_single(other)?)),
    }
}

fn parse_single(value: Value) -> Result<IncomingMessage, JsonRpcError> {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return Err(JsonRpcError::invalid_request(None)),
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(crate::JSONRPC_VERSION) {
        return Err(JsonRpcError::invalid_request_with_reason(
            None,
            "jsonrpc version must be \"2.0\"",
        ));
    }

    let has_id = obj.get("id").is_some_and(|id| !id.is_null());

    if obj.contains_key("method") {
        if has_id {
            serde_json::from_value::<JsonRpcRequest>(value)
                .map(IncomingMessage::Request)
                .map_err(|_| JsonRpcError::invalid_request(None))
        } else {
            serde_json::from_value::<JsonRpcNotification>(value)
                .map(IncomingMessage::Notification)
                .map_err(|_| JsonRpcError::invalid_request(None))
        }
    } else if obj.contains_key("error") || obj.contains_key("result") {
        serde_json::from_value::<JsonRpcMessage>(value)
            .map(IncomingMessage::Reply)
            .map_err(|_| JsonRpcError::invalid_request(None))
    } else {
        Err(JsonRpcError::invalid_request(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;

    #[test]
    fn test_parse_request() {
        let batch = parse_message(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        match batch {
            MessageBatch::Single(IncomingMessage::Request(req)) => {
                assert_eq!(req.id, RequestId::Number(1));
                assert_eq!(req.method, "ping");
            }
            other => panic!("expected request, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_notification() {
        let batch =
            parse_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(
            batch,
            MessageBatch::Single(IncomingMessage::Notification(_))
        ));
    }

    #[test]
    fn test_parse_posted_back_response() {
        let batch =
            parse_message(r#"{"jsonrpc":"2.0","id":"srv-1","result":{"answer":42}}"#).unwrap();
        match batch {
            MessageBatch::Single(IncomingMessage::Reply(JsonRpcMessage::Response(resp))) => {
                assert_eq!(resp.id, RequestId::from("srv-1"));
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_posted_back_error() {
        let batch = parse_message(
            r#"{"jsonrpc":"2.0","id":"srv-2","error":{"code":-32603,"message":"boom"}}"#,
        )
        .unwrap();
        assert!(matches!(
            batch,
            MessageBatch::Single(IncomingMessage::Reply(JsonRpcMessage::Error(_)))
        ));
    }

    #[test]
    fn test_parse_batch() {
        let batch = parse_message(
            r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","method":"notifications/initialized"}]"#,
        )
        .unwrap();
        let messages = batch.into_messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], IncomingMessage::Request(_)));
        assert!(matches!(messages[1], IncomingMessage::Notification(_)));
    }

    #[test]
    fn test_parse_error_on_invalid_json() {
        let err = parse_message("{not json").unwrap_err();
        assert_eq!(err.error.code, crate::error_codes::PARSE_ERROR);
    }

    #[test]
    fn test_invalid_request_on_wrong_shape() {
        let err = parse_message(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert_eq!(err.error.code, crate::error_codes::INVALID_REQUEST);

        let err = parse_message("[]").unwrap_err();
        assert_eq!(err.error.code, crate::error_codes::INVALID_REQUEST);

        let err = parse_message("42").unwrap_err();
        assert_eq!(err.error.code, crate::error_codes::INVALID_REQUEST);
    }

    #[test]
    fn test_missing_version_rejected() {
        let err = parse_message(r#"{"id":1,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.error.code, crate::error_codes::INVALID_REQUEST);
    }
}
