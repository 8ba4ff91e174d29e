//! Client error taxonomy.
//!
//! Errors carry typed kinds so retry classification can avoid string
//! matching wherever the cause is known; the textual classifier in
//! [`crate::retry`] remains for errors that arrive as bare messages.

use rill_json_rpc::JsonRpcError;
use rill_mcp_oauth::OAuthError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection-level failures: refused, reset, timed out, lost.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The server answered with a JSON-RPC error envelope.
    #[error(transparent)]
    Rpc(#[from] JsonRpcError),

    /// Malformed frames, missing responses, protocol violations.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authorization failures (both flow and bearer rejections).
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// A 401 bearer rejection, with the `resource_metadata` challenge
    /// parameter when the server advertised one.
    #[error("unauthorized: {error}")]
    Unauthorized {
        error: OAuthError,
        resource_metadata: Option<String>,
    },

    /// The authorization flow needs the caller to complete a browser
    /// round-trip before the call can be retried.
    #[error("authorization required")]
    AuthorizationRequired,

    #[error("request timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Typed retry classification; `None` defers to the textual
    /// classifier.
    pub fn retryable_hint(&self) -> Option<bool> {
        match self {
            ClientError::Transport(_) | ClientError::Timeout => Some(true),
            ClientError::Http { status, .. } => Some(matches!(status, 408 | 409 | 429 | 500..=511)),
            ClientError::Rpc(_)
            | ClientError::OAuth(_)
            | ClientError::Unauthorized { .. }
            | ClientError::AuthorizationRequired
            | ClientError::Serialization(_) => Some(false),
            ClientError::Protocol(_) => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if let Some(status) = err.status() {
            ClientError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_retry_hints() {
        assert_eq!(
            ClientError::Transport("connection refused".into()).retryable_hint(),
            Some(true)
        );
        assert_eq!(ClientError::Timeout.retryable_hint(), Some(true));
        assert_eq!(
            ClientError::Http {
                status: 503,
                message: "unavailable".into()
            }
            .retryable_hint(),
            Some(true)
        );
        assert_eq!(
            ClientError::Http {
                status: 404,
                message: "not found".into()
            }
            .retryable_hint(),
            Some(false)
        );
        assert_eq!(
            ClientError::AuthorizationRequired.retryable_hint(),
            Some(false)
        );
        assert_eq!(
            ClientError::Protocol("odd frame".into()).retryable_hint(),
            None
        );
    }
}
