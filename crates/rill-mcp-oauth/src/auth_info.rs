//! Verified token identity, as seen by handlers.

use serde_json::{Map, Value};
use url::Url;

/// What a successful verification yields.
///
/// `expires_at` is Unix seconds; absent or `0` means the token carried
/// no expiration claim — the bearer policy rejects such tokens.
#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    /// The raw bearer token. Cleared before the value is injected into
    /// request context so it cannot leak into logs.
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<u64>,
    /// The resource this token is bound to (RFC 8707), if any.
    pub resource: Option<Url>,
    /// The raw `iss` claim. Kept untyped: the issuer check is skipped
    /// when this is absent, empty, or not a string.
    pub issuer: Option<Value>,
    /// Claims outside the standard set; `None` when empty.
    pub extra: Option<Map<String, Value>>,
}

impl AuthInfo {
    /// Whether the token carries every one of `required` scopes.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.scopes.contains(s))
    }

    /// Clear the raw token (done before context injection).
    pub fn redacted(mut self) -> Self {
        self.token.clear();
        self
    }
}
