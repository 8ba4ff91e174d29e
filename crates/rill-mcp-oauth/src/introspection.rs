//! RFC 7662 token introspection with positive and negative caching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::auth_info::AuthInfo;
use crate::claims::auth_info_from_claims;
use crate::error::OAuthError;
use crate::verifier::{TokenVerifier, VerifyError};

/// Introspection response per RFC 7662 §2.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

impl IntrospectionResponse {
    /// Flatten back into a claim map so extraction shares the JWT rules.
    fn to_claims(&self) -> Map<String, Value> {
        let mut claims = Map::new();
        if let Some(scope) = &self.scope {
            claims.insert("scope".into(), Value::String(scope.clone()));
        }
        if let Some(client_id) = &self.client_id {
            claims.insert("client_id".into(), Value::String(client_id.clone()));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".into(), Value::from(exp));
        }
        if let Some(iat) = self.iat {
            claims.insert("iat".into(), Value::from(iat));
        }
        if let Some(sub) = &self.sub {
            claims.insert("sub".into(), Value::String(sub.clone()));
        }
        if let Some(aud) = &self.aud {
            claims.insert("aud".into(), aud.clone());
        }
        if let Some(iss) = &self.iss {
            claims.insert("iss".into(), Value::String(iss.clone()));
        }
        if let Some(jti) = &self.jti {
            claims.insert("jti".into(), Value::String(jti.clone()));
        }
        for (key, value) in &self.additional {
            claims.insert(key.clone(), value.clone());
        }
        claims
    }
}

/// Client credentials for the introspection call.
#[derive(Debug, Clone)]
pub struct IntrospectionCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Introspection verifier configuration.
#[derive(Debug, Clone)]
pub struct IntrospectionConfig {
    /// The introspection endpoint URL.
    pub endpoint: String,
    /// Default client credentials.
    pub credentials: IntrospectionCredentials,
    /// Per-issuer credential overrides.
    pub issuer_credentials: HashMap<String, IntrospectionCredentials>,
    /// How long `active: true` responses are cached.
    pub cache_ttl: Duration,
    /// How long `active: false` responses are cached.
    pub negative_cache_ttl: Duration,
}

impl IntrospectionConfig {
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: IntrospectionCredentials {
                client_id: client_id.into(),
                client_secret: None,
            },
            issuer_credentials: HashMap::new(),
            cache_ttl: Duration::from_secs(60),
            negative_cache_ttl: Duration::from_secs(15),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.credentials.client_secret = Some(secret.into());
        self
    }
}

/// Performs the introspection POST. Abstracted for tests.
#[async_trait]
pub trait IntrospectionTransport: Send + Sync {
    async fn introspect(
        &self,
        endpoint: &str,
        credentials: &IntrospectionCredentials,
        token: &str,
    ) -> Result<IntrospectionResponse, VerifyError>;
}

/// Default transport, posting the RFC 7662 form via reqwest.
#[derive(Debug, Clone)]
pub struct HttpIntrospectionTransport {
    client: reqwest::Client,
}

impl HttpIntrospectionTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpIntrospectionTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntrospectionTransport for HttpIntrospectionTransport {
    async fn introspect(
        &self,
        endpoint: &str,
        credentials: &IntrospectionCredentials,
        token: &str,
    ) -> Result<IntrospectionResponse, VerifyError> {
        let mut form = vec![
            ("token", token.to_string()),
            ("client_id", credentials.client_id.clone()),
        ];
        if let Some(secret) = &credentials.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self
            .client
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|err| VerifyError::OAuth(OAuthError::server_error(format!(
                "introspection request failed: {err}"
            ))))?;

        if !response.status().is_success() {
            return Err(VerifyError::OAuth(OAuthError::server_error(format!(
                "introspection endpoint returned status {}",
                response.status()
            ))));
        }

        response
            .json::<IntrospectionResponse>()
            .await
            .map_err(|err| VerifyError::OAuth(OAuthError::server_error(format!(
                "malformed introspection response: {err}"
            ))))
    }
}

struct CacheEntry {
    response: IntrospectionResponse,
    expires_at: Instant,
}

/// RFC 7662 verifier with result caching.
///
/// Tokens are cached under their SHA-256 digest so raw secrets never sit
/// in the cache map.
pub struct IntrospectionVerifier {
    config: IntrospectionConfig,
    transport: Box<dyn IntrospectionTransport>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl IntrospectionVerifier {
    pub fn new(config: IntrospectionConfig) -> Self {
        Self::with_transport(config, Box::new(HttpIntrospectionTransport::new()))
    }

    pub fn with_transport(
        config: IntrospectionConfig,
        transport: Box<dyn IntrospectionTransport>,
    ) -> Self {
        Self {
            config,
            transport,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Verify with an issuer hint, selecting per-issuer credentials when
    /// configured (the hybrid JWT→introspection path knows the issuer).
    pub async fn verify_with_issuer(
        &self,
        token: &str,
        issuer: Option<&str>,
    ) -> Result<AuthInfo, VerifyError> {
        let key = cache_key(token);

        if let Some(response) = self.cached(&key).await {
            debug!("introspection cache hit");
            return self.into_auth_info(token, response);
        }

        let credentials = issuer
            .and_then(|iss| self.config.issuer_credentials.get(iss))
            .unwrap_or(&self.config.credentials);

        let response = self
            .transport
            .introspect(&self.config.endpoint, credentials, token)
            .await?;

        let ttl = if response.active {
            self.config.cache_ttl
        } else {
            self.config.negative_cache_ttl
        };
        {
            let mut cache = self.cache.lock().await;
            cache.retain(|_, entry| entry.expires_at > Instant::now());
            cache.insert(
                key,
                CacheEntry {
                    response: response.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }

        self.into_auth_info(token, response)
    }

    async fn cached(&self, key: &str) -> Option<IntrospectionResponse> {
        let cache = self.cache.lock().await;
        cache
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.response.clone())
    }

    fn into_auth_info(
        &self,
        token: &str,
        response: IntrospectionResponse,
    ) -> Result<AuthInfo, VerifyError> {
        if !response.active {
            return Err(VerifyError::OAuth(OAuthError::invalid_token(
                "Token is not active",
            )));
        }
        Ok(auth_info_from_claims(token, &response.to_claims()))
    }
}

#[async_trait]
impl TokenVerifier for IntrospectionVerifier {
    async fn verify(&self, token: &str) -> Result<AuthInfo, VerifyError> {
        self.verify_with_issuer(token, None).await
    }
}

fn cache_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{digest:x}")
}
