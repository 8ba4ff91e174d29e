//! Deterministic claim extraction.
//!
//! The same rules apply to JWT payloads and introspection responses so
//! both verifier families yield identical [`AuthInfo`] for identical
//! claims:
//!
//! - `scope`: string → split on whitespace; array → string elements
//!   as-is; absent → empty.
//! - `aud` / `resource`: the first URL-shaped value wins, fragment
//!   stripped.
//! - `extra`: every claim outside the standard set, `None` when empty.

use serde_json::{Map, Value};
use url::Url;

use crate::auth_info::AuthInfo;

/// Claims that never land in `extra`.
const STANDARD_CLAIMS: [&str; 9] = [
    "iss", "sub", "aud", "exp", "iat", "nbf", "jti", "client_id", "scope",
];

/// Build an [`AuthInfo`] from a claim map. `token` is carried raw until
/// the bearer policy redacts it.
pub fn auth_info_from_claims(token: &str, claims: &Map<String, Value>) -> AuthInfo {
    AuthInfo {
        token: token.to_string(),
        client_id: claims
            .get("client_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        scopes: extract_scopes(claims.get("scope")),
        expires_at: claims.get("exp").and_then(Value::as_u64),
        resource: extract_resource(claims),
        issuer: claims.get("iss").cloned(),
        extra: extract_extra(claims),
    }
}

fn extract_scopes(scope: Option<&Value>) -> Vec<String> {
    match scope {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// First URL-shaped value among `aud` then `resource`, fragment stripped.
fn extract_resource(claims: &Map<String, Value>) -> Option<Url> {
    let candidates = claims
        .get("aud")
        .into_iter()
        .chain(claims.get("resource"))
        .flat_map(|value| match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        });

    for candidate in candidates {
        if let Ok(mut url) = Url::parse(candidate) {
            if url.scheme() == "http" || url.scheme() == "https" {
                url.set_fragment(None);
                return Some(url);
            }
        }
    }
    None
}

fn extract_extra(claims: &Map<String, Value>) -> Option<Map<String, Value>> {
    let extra: Map<String, Value> = claims
        .iter()
        .filter(|(key, _)| !STANDARD_CLAIMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    (!extra.is_empty()).then_some(extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_scope_string_splits_on_whitespace() {
        let info = auth_info_from_claims("t", &claims(json!({"scope": "read  write\tadmin"})));
        assert_eq!(info.scopes, vec!["read", "write", "admin"]);
    }

    #[test]
    fn test_scope_array_taken_as_is() {
        let info = auth_info_from_claims("t", &claims(json!({"scope": ["read", "write", 7]})));
        assert_eq!(info.scopes, vec!["read", "write"]);
    }

    #[test]
    fn test_scope_absent_is_empty() {
        let info = auth_info_from_claims("t", &claims(json!({})));
        assert!(info.scopes.is_empty());
    }

    #[test]
    fn test_resource_takes_first_url_shaped_aud() {
        let info = auth_info_from_claims(
            "t",
            &claims(json!({"aud": ["not a url", "https://api.example.com/mcp#frag"]})),
        );
        assert_eq!(
            info.resource.unwrap().as_str(),
            "https://api.example.com/mcp"
        );
    }

    #[test]
    fn test_resource_claim_is_fallback() {
        let info = auth_info_from_claims(
            "t",
            &claims(json!({"aud": "my-client-id", "resource": "https://rs.example.com/"})),
        );
        assert_eq!(info.resource.unwrap().as_str(), "https://rs.example.com/");
    }

    #[test]
    fn test_extra_excludes_standard_set() {
        let info = auth_info_from_claims(
            "t",
            &claims(json!({
                "iss": "https://as.example.com",
                "sub": "user-1",
                "exp": 100,
                "scope": "read",
                "department": "eng",
                "tier": 2
            })),
        );
        let extra = info.extra.unwrap();
        assert_eq!(extra.len(), 2);
        assert_eq!(extra["department"], "eng");
        assert_eq!(extra["tier"], 2);
    }

    #[test]
    fn test_extra_nil_when_empty() {
        let info = auth_info_from_claims("t", &claims(json!({"iss": "x", "exp": 100})));
        assert!(info.extra.is_none());
    }

    #[test]
    fn test_exp_and_issuer_carried() {
        let info = auth_info_from_claims(
            "t",
            &claims(json!({"exp": 1700000000u64, "iss": "https://as.example.com"})),
        );
        assert_eq!(info.expires_at, Some(1700000000));
        assert_eq!(info.issuer, Some(json!("https://as.example.com")));
    }
}
