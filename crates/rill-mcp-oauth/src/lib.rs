//! # OAuth 2.1 Resource-Server Support
//!
//! Bearer-token protection for MCP servers: the [`bearer`] policy
//! implementing the full rejection truth table (status codes,
//! `WWW-Authenticate` challenges, RFC 6749/6750 error bodies), stackable
//! token [`verifier`]s (local JWKS, remote JWKS with key rotation,
//! RFC 7662 introspection with positive/negative caching, and a hybrid
//! fallback), deterministic claim extraction, and the RFC 9728 / RFC 8414
//! metadata documents.
//!
//! Error code spellings are RFC-canonical throughout
//! (`invalid_token`, not `invalid token`).

pub mod auth_info;
pub mod bearer;
pub mod claims;
pub mod error;
pub mod introspection;
pub mod jwks;
pub mod jwt;
pub mod metadata;
pub mod verifier;

pub use auth_info::AuthInfo;
pub use bearer::{BearerConfig, BearerPolicy, BearerRejection};
pub use error::{OAuthError, OAuthErrorCode};
pub use introspection::{IntrospectionConfig, IntrospectionResponse, IntrospectionVerifier};
pub use jwks::{JwksFetcher, LocalKeySet, RemoteKeySet, RemoteKeySetConfig};
pub use jwt::JwtVerifier;
pub use metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};
pub use verifier::{HybridVerifier, TokenVerifier, VerifyError};
