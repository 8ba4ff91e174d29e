//! JWT verification against local and remote key sets.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth_info::AuthInfo;
use crate::claims::auth_info_from_claims;
use crate::error::OAuthError;
use crate::jwks::{LocalKeySet, RemoteKeySet};
use crate::verifier::{TokenVerifier, VerifyError};

/// Verifies JWT bearer tokens by `kid` lookup.
///
/// Keys are resolved from the local set first, then the remote set.
/// Expiry, issuer, and audience checks are NOT performed here — the
/// bearer policy owns them, working off the extracted [`AuthInfo`].
pub struct JwtVerifier {
    local: Option<LocalKeySet>,
    remote: Option<RemoteKeySet>,
}

impl JwtVerifier {
    pub fn new() -> Self {
        Self {
            local: None,
            remote: None,
        }
    }

    pub fn with_local(mut self, local: LocalKeySet) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_remote(mut self, remote: RemoteKeySet) -> Self {
        self.remote = Some(remote);
        self
    }

    async fn resolve_key(&self, kid: &str, issuer: Option<&str>) -> Result<Jwk, VerifyError> {
        if let Some(local) = &self.local {
            if let Some(key) = local.find(kid) {
                return Ok(key.clone());
            }
        }
        if let Some(remote) = &self.remote {
            if let Some(key) = remote.key_for(kid, issuer).await? {
                return Ok(key);
            }
        }
        Err(VerifyError::OAuth(OAuthError::invalid_token(format!(
            "no key found for kid '{kid}'"
        ))))
    }
}

impl Default for JwtVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<AuthInfo, VerifyError> {
        let header = decode_header(token)
            .map_err(|err| VerifyError::OAuth(OAuthError::invalid_token(format!("malformed JWT: {err}"))))?;
        let kid = header.kid.as_deref().ok_or_else(|| {
            VerifyError::OAuth(OAuthError::invalid_token("JWT has no 'kid' header"))
        })?;

        // issuer peeked without verification, only to pick the JWKS URL
        let issuer = peek_issuer(token);
        let key = self.resolve_key(kid, issuer.as_deref()).await?;

        let decoding_key = DecodingKey::from_jwk(&key)
            .map_err(|err| VerifyError::other(format!("unusable JWK for kid '{kid}': {err}")))?;

        // temporal and audience policy live in the bearer middleware
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Map<String, Value>>(token, &decoding_key, &validation)
            .map_err(|err| VerifyError::OAuth(OAuthError::invalid_token(format!("signature verification failed: {err}"))))?;

        debug!(kid, "JWT signature verified");
        Ok(auth_info_from_claims(token, &data.claims))
    }
}

/// Extract `iss` from the (unverified) payload. Used only to route the
/// key lookup; every claim that reaches callers comes from the verified
/// decode above.
fn peek_issuer(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Map<String, Value> = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string)
}
