use rill_json_rpc::{error_codes, JsonRpcErrorCode, JsonRpcErrorObject};
use thiserror::Error;

/// Result alias for MCP operations.
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Domain errors for MCP method handlers.
///
/// Handlers return these; the dispatch layer converts them into JSON-RPC
/// error envelopes exactly once. Application-level tool failures do NOT
/// belong here — they travel as `CallToolResult { isError: true }`.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method '{0}' not found")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Resource '{0}' not found")]
    ResourceNotFound(String),

    #[error("Prompt '{0}' not found")]
    PromptNotFound(String),

    #[error("Missing required parameter: {0}")]
    MissingParam(String),

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("Session terminated")]
    SessionTerminated,

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("Handler panicked: {0}")]
    HandlerPanic(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn missing_param(name: impl Into<String>) -> Self {
        Self::MissingParam(name.into())
    }

    /// The JSON-RPC error code this maps to.
    pub fn code(&self) -> i64 {
        match self {
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_)
            | McpError::ToolNotFound(_)
            | McpError::PromptNotFound(_)
            | McpError::MissingParam(_) => error_codes::INVALID_PARAMS,
            // MCP-specific codes in the reserved server range
            McpError::ResourceNotFound(_) => -32002,
            McpError::SessionNotFound(_) | McpError::SessionTerminated => -32001,
            McpError::RequestCancelled => -32000,
            McpError::HandlerPanic(_) | McpError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert into a JSON-RPC error object.
    ///
    /// Handler panics carry the stringified panic in `data` so clients
    /// can distinguish them from ordinary internal errors.
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            McpError::HandlerPanic(panic) => {
                JsonRpcErrorObject::new(JsonRpcErrorCode::InternalError)
                    .with_data(serde_json::Value::String(panic.clone()))
            }
            other => JsonRpcErrorObject {
                code: other.code(),
                message: other.to_string(),
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert_eq!(McpError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(McpError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(McpError::Internal("x".into()).code(), -32603);
        assert_eq!(McpError::ResourceNotFound("u".into()).code(), -32002);
    }

    #[test]
    fn test_panic_carries_data() {
        let obj = McpError::HandlerPanic("index out of bounds".into()).to_error_object();
        assert_eq!(obj.code, -32603);
        assert_eq!(
            obj.data,
            Some(serde_json::Value::String("index out of bounds".into()))
        );
    }
}
