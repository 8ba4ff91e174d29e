//! The token verifier abstraction and the hybrid JWT→introspection
//! stack.

use async_trait::async_trait;

use crate::auth_info::AuthInfo;
use crate::error::OAuthError;
use crate::introspection::IntrospectionVerifier;
use crate::jwt::JwtVerifier;

/// Verifier failures.
///
/// OAuth-shaped failures drive the bearer policy's status mapping;
/// anything else collapses to a generic `invalid_token` rejection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("{0}")]
    Other(String),
}

impl VerifyError {
    pub fn other(message: impl Into<String>) -> Self {
        VerifyError::Other(message.into())
    }
}

/// Validates a bearer token and extracts its identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthInfo, VerifyError>;
}

/// JWT verification with introspection fallback.
///
/// With `use_on_jwt_fail` set, any JWT failure (malformed token, unknown
/// key, bad signature) falls through to the introspection endpoint —
/// the path opaque tokens take.
pub struct HybridVerifier {
    jwt: JwtVerifier,
    introspection: IntrospectionVerifier,
    use_on_jwt_fail: bool,
}

impl HybridVerifier {
    pub fn new(jwt: JwtVerifier, introspection: IntrospectionVerifier) -> Self {
        Self {
            jwt,
            introspection,
            use_on_jwt_fail: true,
        }
    }

    pub fn use_on_jwt_fail(mut self, enabled: bool) -> Self {
        self.use_on_jwt_fail = enabled;
        self
    }
}

#[async_trait]
impl TokenVerifier for HybridVerifier {
    async fn verify(&self, token: &str) -> Result<AuthInfo, VerifyError> {
        match self.jwt.verify(token).await {
            Ok(info) => Ok(info),
            Err(jwt_err) if self.use_on_jwt_fail => {
                tracing::debug!(error = %jwt_err, "JWT verification failed, trying introspection");
                self.introspection.verify(token).await
            }
            Err(jwt_err) => Err(jwt_err),
        }
    }
}
