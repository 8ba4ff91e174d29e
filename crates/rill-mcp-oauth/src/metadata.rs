//! OAuth discovery documents: RFC 9728 protected-resource metadata and
//! RFC 8414 authorization-server metadata.
//!
//! The server mounts these under `/.well-known/`; the client fetches
//! them during discovery, so both sides share the shapes.

use serde::{Deserialize, Serialize};

/// RFC 9728 protected resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The protected resource URL (the MCP endpoint).
    pub resource: String,
    /// Authorization servers that can issue tokens for this resource.
    #[serde(rename = "authorization_servers")]
    pub authorization_servers: Vec<String>,
    #[serde(rename = "scopes_supported", skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(
        rename = "bearer_methods_supported",
        skip_serializing_if = "Option::is_none"
    )]
    pub bearer_methods_supported: Option<Vec<String>>,
    #[serde(rename = "resource_name", skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

impl ProtectedResourceMetadata {
    pub fn new(resource: impl Into<String>, authorization_server: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![authorization_server.into()],
            scopes_supported: None,
            bearer_methods_supported: Some(vec!["header".to_string()]),
            resource_name: None,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes_supported = Some(scopes);
        self
    }

    /// The well-known path this document is served under.
    pub const WELL_KNOWN_PATH: &'static str = "/.well-known/oauth-protected-resource";
}

/// RFC 8414 authorization server metadata.
///
/// `registration_endpoint` is present iff the provider implements
/// dynamic client registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    #[serde(rename = "authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(rename = "token_endpoint")]
    pub token_endpoint: String,
    #[serde(rename = "registration_endpoint", skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    #[serde(rename = "jwks_uri", skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(
        rename = "introspection_endpoint",
        skip_serializing_if = "Option::is_none"
    )]
    pub introspection_endpoint: Option<String>,
    #[serde(rename = "revocation_endpoint", skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    #[serde(rename = "response_types_supported")]
    pub response_types_supported: Vec<String>,
    #[serde(
        rename = "grant_types_supported",
        skip_serializing_if = "Option::is_none"
    )]
    pub grant_types_supported: Option<Vec<String>>,
    #[serde(
        rename = "code_challenge_methods_supported",
        skip_serializing_if = "Option::is_none"
    )]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    #[serde(
        rename = "token_endpoint_auth_methods_supported",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
    #[serde(rename = "scopes_supported", skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

impl AuthorizationServerMetadata {
    pub fn new(
        issuer: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            registration_endpoint: None,
            jwks_uri: None,
            introspection_endpoint: None,
            revocation_endpoint: None,
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: Some(vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]),
            code_challenge_methods_supported: Some(vec!["S256".to_string()]),
            token_endpoint_auth_methods_supported: None,
            scopes_supported: None,
        }
    }

    pub fn with_registration_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.registration_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_jwks_uri(mut self, uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(uri.into());
        self
    }

    /// Whether the provider supports RFC 7591 dynamic registration.
    pub fn supports_registration(&self) -> bool {
        self.registration_endpoint.is_some()
    }

    /// The well-known path this document is served under.
    pub const WELL_KNOWN_PATH: &'static str = "/.well-known/oauth-authorization-server";
}
