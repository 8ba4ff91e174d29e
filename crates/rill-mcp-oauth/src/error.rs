//! The OAuth error vocabulary (RFC 6749/6750/7009).

use serde::{Deserialize, Serialize};

/// Flat enum of OAuth error codes, serialized as their canonical
/// underscore spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    InvalidScope,
    InvalidToken,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    AccessDenied,
    InsufficientScope,
    ServerError,
    TemporarilyUnavailable,
}

impl OAuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthErrorCode::InvalidRequest => "invalid_request",
            OAuthErrorCode::InvalidClient => "invalid_client",
            OAuthErrorCode::InvalidGrant => "invalid_grant",
            OAuthErrorCode::InvalidScope => "invalid_scope",
            OAuthErrorCode::InvalidToken => "invalid_token",
            OAuthErrorCode::UnauthorizedClient => "unauthorized_client",
            OAuthErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            OAuthErrorCode::UnsupportedResponseType => "unsupported_response_type",
            OAuthErrorCode::AccessDenied => "access_denied",
            OAuthErrorCode::InsufficientScope => "insufficient_scope",
            OAuthErrorCode::ServerError => "server_error",
            OAuthErrorCode::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invalid_request" => Some(Self::InvalidRequest),
            "invalid_client" => Some(Self::InvalidClient),
            "invalid_grant" => Some(Self::InvalidGrant),
            "invalid_scope" => Some(Self::InvalidScope),
            "invalid_token" => Some(Self::InvalidToken),
            "unauthorized_client" => Some(Self::UnauthorizedClient),
            "unsupported_grant_type" => Some(Self::UnsupportedGrantType),
            "unsupported_response_type" => Some(Self::UnsupportedResponseType),
            "access_denied" => Some(Self::AccessDenied),
            "insufficient_scope" => Some(Self::InsufficientScope),
            "server_error" => Some(Self::ServerError),
            "temporarily_unavailable" => Some(Self::TemporarilyUnavailable),
            _ => None,
        }
    }
}

impl std::fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed OAuth error: the wire body is
/// `{"error", "error_description"?, "error_uri"?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error}: {}", error_description.as_deref().unwrap_or("(no description)"))]
pub struct OAuthError {
    pub error: OAuthErrorCode,
    #[serde(rename = "error_description", skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(rename = "error_uri", skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuthError {
    pub fn new(error: OAuthErrorCode) -> Self {
        Self {
            error,
            error_description: None,
            error_uri: None,
        }
    }

    pub fn with_description(code: OAuthErrorCode, description: impl Into<String>) -> Self {
        Self {
            error: code,
            error_description: Some(description.into()),
            error_uri: None,
        }
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::with_description(OAuthErrorCode::InvalidToken, description)
    }

    pub fn insufficient_scope(description: impl Into<String>) -> Self {
        Self::with_description(OAuthErrorCode::InsufficientScope, description)
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::with_description(OAuthErrorCode::ServerError, description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_spellings() {
        assert_eq!(OAuthErrorCode::InvalidToken.as_str(), "invalid_token");
        assert_eq!(
            OAuthErrorCode::InsufficientScope.as_str(),
            "insufficient_scope"
        );
        assert_eq!(
            serde_json::to_string(&OAuthErrorCode::InvalidRequest).unwrap(),
            "\"invalid_request\""
        );
    }

    #[test]
    fn test_error_body_shape() {
        let err = OAuthError::invalid_token("Token has expired");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "invalid_token");
        assert_eq!(json["error_description"], "Token has expired");
        assert!(json.get("error_uri").is_none());
    }

    #[test]
    fn test_parse_rejects_space_spellings() {
        assert!(OAuthErrorCode::parse("invalid request").is_none());
        assert_eq!(
            OAuthErrorCode::parse("invalid_request"),
            Some(OAuthErrorCode::InvalidRequest)
        );
    }
}
