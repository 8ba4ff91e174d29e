//! The bearer-token authorization policy.
//!
//! Transport-agnostic: the HTTP layer hands in the raw `Authorization`
//! header value and maps the returned rejection onto a response. The
//! policy owns the entire decision table — header parsing, verifier
//! error mapping, expiry, issuer, audience, and scope checks — and the
//! exact `WWW-Authenticate` challenge composition.

use std::sync::Arc;

use crate::auth_info::AuthInfo;
use crate::error::{OAuthError, OAuthErrorCode};
use crate::verifier::{TokenVerifier, VerifyError};

/// Policy configuration.
#[derive(Debug, Clone, Default)]
pub struct BearerConfig {
    /// When set, the token's `iss` claim must match (string claims only;
    /// absent, empty, or non-string `iss` skips the check).
    pub issuer: Option<String>,
    /// Allowed audiences. Matched against the token's resource URL with
    /// a single trailing `#` trimmed from both sides.
    pub audience: Vec<String>,
    /// Scopes the token must all carry.
    pub required_scopes: Vec<String>,
    /// RFC 9728 metadata URL, appended to every 401/403 challenge.
    pub resource_metadata_url: Option<String>,
}

/// A rejected request: HTTP status, optional `WWW-Authenticate` header,
/// and the OAuth error body.
#[derive(Debug, Clone, PartialEq)]
pub struct BearerRejection {
    pub status: u16,
    pub www_authenticate: Option<String>,
    pub body: OAuthError,
}

/// The policy: a verifier plus the checks around it.
pub struct BearerPolicy {
    config: BearerConfig,
    verifier: Arc<dyn TokenVerifier>,
}

impl BearerPolicy {
    pub fn new(config: BearerConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { config, verifier }
    }

    pub fn config(&self) -> &BearerConfig {
        &self.config
    }

    /// Run the full authorization decision for one request.
    ///
    /// On success the returned [`AuthInfo`] has its raw token cleared,
    /// ready for context injection.
    pub async fn authorize(&self, header: Option<&str>) -> Result<AuthInfo, BearerRejection> {
        // 1. extract the bearer token
        let header = match header {
            Some(header) => header,
            None => {
                return Err(self.challenge(
                    401,
                    OAuthError::invalid_token("Missing Authorization header"),
                ))
            }
        };
        let token = match parse_bearer(header) {
            Some(token) => token,
            None => {
                return Err(self.challenge(
                    401,
                    OAuthError::invalid_token(
                        "Invalid Authorization header format, expected 'Bearer TOKEN'",
                    ),
                ))
            }
        };

        // 2. verify, mapping verifier failures onto the status table
        let info = match self.verifier.verify(token).await {
            Ok(info) => info,
            Err(err) => return Err(self.map_verify_error(err)),
        };

        // 3. expiry: a token without an expiration claim is rejected
        match info.expires_at {
            None | Some(0) => {
                return Err(self.challenge(
                    401,
                    OAuthError::invalid_token("Token has no expiration time"),
                ))
            }
            Some(expires_at) if expires_at <= now_secs() => {
                return Err(self.challenge(401, OAuthError::invalid_token("Token has expired")))
            }
            Some(_) => {}
        }

        // 4. issuer, skipped silently unless both sides are non-empty strings
        if let Some(expected) = self.config.issuer.as_deref().filter(|s| !s.is_empty()) {
            if let Some(issuer) = info.issuer.as_ref().and_then(|v| v.as_str()) {
                if !issuer.is_empty() && issuer != expected {
                    return Err(
                        self.challenge(401, OAuthError::invalid_token("Invalid token issuer"))
                    );
                }
            }
        }

        // 5. audience, skipped unless both a resource and a config list exist
        if !self.config.audience.is_empty() {
            if let Some(resource) = &info.resource {
                let token_audience = trim_fragment_marker(resource.as_str());
                let matched = self
                    .config
                    .audience
                    .iter()
                    .any(|allowed| trim_fragment_marker(allowed) == token_audience);
                if !matched {
                    return Err(
                        self.challenge(401, OAuthError::invalid_token("Invalid token audience"))
                    );
                }
            }
        }

        // 6. required scopes: subset check
        if !self.config.required_scopes.is_empty() && !info.has_scopes(&self.config.required_scopes)
        {
            return Err(self.insufficient_scope_rejection(OAuthError::insufficient_scope(
                "Token is missing required scopes",
            )));
        }

        // 7. inject with the raw token cleared
        Ok(info.redacted())
    }

    fn map_verify_error(&self, err: VerifyError) -> BearerRejection {
        match err {
            VerifyError::OAuth(oauth) => match oauth.error {
                OAuthErrorCode::InvalidToken => self.challenge(401, oauth),
                OAuthErrorCode::InsufficientScope => self.insufficient_scope_rejection(oauth),
                OAuthErrorCode::ServerError => BearerRejection {
                    status: 500,
                    www_authenticate: None,
                    body: oauth,
                },
                _ => BearerRejection {
                    status: 400,
                    www_authenticate: None,
                    body: oauth,
                },
            },
            VerifyError::Other(_) => {
                self.challenge(401, OAuthError::invalid_token("Invalid access token"))
            }
        }
    }

    /// 401 with a `Bearer error=...` challenge.
    fn challenge(&self, status: u16, body: OAuthError) -> BearerRejection {
        BearerRejection {
            status,
            www_authenticate: Some(self.www_authenticate(&body, None)),
            body,
        }
    }

    /// 403 with the `scope="..."` parameter listing the requirement.
    fn insufficient_scope_rejection(&self, body: OAuthError) -> BearerRejection {
        let scope = self.config.required_scopes.join(" ");
        BearerRejection {
            status: 403,
            www_authenticate: Some(self.www_authenticate(&body, Some(&scope))),
            body,
        }
    }

    fn www_authenticate(&self, body: &OAuthError, scope: Option<&str>) -> String {
        let mut value = format!("Bearer error=\"{}\"", body.error.as_str());
        if let Some(description) = &body.error_description {
            value.push_str(&format!(", error_description=\"{description}\""));
        }
        if let Some(scope) = scope {
            value.push_str(&format!(", scope=\"{scope}\""));
        }
        if let Some(url) = &self.config.resource_metadata_url {
            value.push_str(&format!(", resource_metadata=\"{url}\""));
        }
        value
    }
}

/// Extract the token from `Bearer <token>`, scheme case-insensitive.
fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

/// Trim a single trailing `#` so `https://a/mcp#` and `https://a/mcp`
/// compare equal.
fn trim_fragment_marker(s: &str) -> &str {
    s.strip_suffix('#').unwrap_or(s)
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use url::Url;

    /// Verifier scripted per test case.
    struct StubVerifier {
        outcome: Result<AuthInfo, VerifyError>,
    }

    #[async_trait]
    impl TokenVerifier for StubVerifier {
        async fn verify(&self, _token: &str) -> Result<AuthInfo, VerifyError> {
            self.outcome.clone()
        }
    }

    fn valid_info() -> AuthInfo {
        AuthInfo {
            token: "tok".into(),
            client_id: "client-1".into(),
            scopes: vec!["read".into(), "write".into()],
            expires_at: Some(now_secs() + 600),
            resource: None,
            issuer: None,
            extra: None,
        }
    }

    fn policy(config: BearerConfig, outcome: Result<AuthInfo, VerifyError>) -> BearerPolicy {
        BearerPolicy::new(config, Arc::new(StubVerifier { outcome }))
    }

    #[tokio::test]
    async fn test_missing_header() {
        let policy = policy(BearerConfig::default(), Ok(valid_info()));
        let rejection = policy.authorize(None).await.unwrap_err();

        assert_eq!(rejection.status, 401);
        assert_eq!(
            rejection.www_authenticate.as_deref(),
            Some("Bearer error=\"invalid_token\", error_description=\"Missing Authorization header\"")
        );
        assert_eq!(rejection.body.error, OAuthErrorCode::InvalidToken);
    }

    #[tokio::test]
    async fn test_malformed_header() {
        let policy = policy(BearerConfig::default(), Ok(valid_info()));
        let rejection = policy.authorize(Some("InvalidFormat")).await.unwrap_err();

        assert_eq!(rejection.status, 401);
        assert_eq!(
            rejection.body.error_description.as_deref(),
            Some("Invalid Authorization header format, expected 'Bearer TOKEN'")
        );
    }

    #[tokio::test]
    async fn test_case_insensitive_scheme() {
        let policy = policy(BearerConfig::default(), Ok(valid_info()));
        let info = policy.authorize(Some("BeArEr tok")).await.unwrap();
        assert_eq!(info.client_id, "client-1");
        // token is cleared before context injection
        assert!(info.token.is_empty());
    }

    #[tokio::test]
    async fn test_expired_token() {
        let mut info = valid_info();
        info.expires_at = Some(now_secs() - 100);
        let policy = policy(BearerConfig::default(), Ok(info));

        let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(rejection.status, 401);
        assert_eq!(
            rejection.body.error_description.as_deref(),
            Some("Token has expired")
        );
    }

    #[tokio::test]
    async fn test_token_without_expiration() {
        for expires_at in [None, Some(0)] {
            let mut info = valid_info();
            info.expires_at = expires_at;
            let policy = policy(BearerConfig::default(), Ok(info));

            let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
            assert_eq!(rejection.status, 401);
            assert_eq!(
                rejection.body.error_description.as_deref(),
                Some("Token has no expiration time")
            );
        }
    }

    #[tokio::test]
    async fn test_insufficient_scope_from_verifier() {
        let policy = policy(
            BearerConfig {
                required_scopes: vec!["read".into(), "write".into()],
                ..Default::default()
            },
            Err(VerifyError::OAuth(OAuthError::insufficient_scope(
                "missing scope",
            ))),
        );

        let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(rejection.status, 403);
        let challenge = rejection.www_authenticate.unwrap();
        assert!(challenge.contains("error=\"insufficient_scope\""));
        assert!(challenge.contains("scope=\"read write\""));
    }

    #[tokio::test]
    async fn test_server_error_has_no_challenge() {
        let policy = policy(
            BearerConfig {
                resource_metadata_url: Some("https://api.example.com/.well-known/oauth-protected-resource".into()),
                ..Default::default()
            },
            Err(VerifyError::OAuth(OAuthError::server_error("backend down"))),
        );

        let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(rejection.status, 500);
        assert!(rejection.www_authenticate.is_none());
        assert_eq!(rejection.body.error, OAuthErrorCode::ServerError);
    }

    #[tokio::test]
    async fn test_other_oauth_error_is_400_without_challenge() {
        let policy = policy(
            BearerConfig::default(),
            Err(VerifyError::OAuth(OAuthError::new(
                OAuthErrorCode::InvalidRequest,
            ))),
        );

        let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(rejection.status, 400);
        assert!(rejection.www_authenticate.is_none());
    }

    #[tokio::test]
    async fn test_unknown_error_is_generic_invalid_token() {
        let policy = policy(
            BearerConfig::default(),
            Err(VerifyError::other("socket exploded")),
        );

        let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(rejection.status, 401);
        assert_eq!(
            rejection.body.error_description.as_deref(),
            Some("Invalid access token")
        );
    }

    #[tokio::test]
    async fn test_resource_metadata_appended_on_401_and_403() {
        let url = "https://api.example.com/.well-known/oauth-protected-resource";
        let config = BearerConfig {
            resource_metadata_url: Some(url.into()),
            ..Default::default()
        };

        let mut expired = valid_info();
        expired.expires_at = Some(now_secs() - 1);
        let policy_401 = policy(config.clone(), Ok(expired));
        let rejection = policy_401.authorize(Some("Bearer expired")).await.unwrap_err();
        assert_eq!(
            rejection.www_authenticate.as_deref(),
            Some(&format!(
                "Bearer error=\"invalid_token\", error_description=\"Token has expired\", resource_metadata=\"{url}\""
            ) as &str)
        );

        let policy_403 = policy(
            BearerConfig {
                required_scopes: vec!["admin".into()],
                ..config
            },
            Ok(valid_info()),
        );
        let rejection = policy_403.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(rejection.status, 403);
        assert!(rejection
            .www_authenticate
            .unwrap()
            .contains(&format!("resource_metadata=\"{url}\"")));
    }

    #[tokio::test]
    async fn test_issuer_enforced_when_string() {
        let mut info = valid_info();
        info.issuer = Some(json!("https://evil.example.com"));
        let policy = policy(
            BearerConfig {
                issuer: Some("https://as.example.com".into()),
                ..Default::default()
            },
            Ok(info),
        );

        let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(
            rejection.body.error_description.as_deref(),
            Some("Invalid token issuer")
        );
    }

    #[tokio::test]
    async fn test_issuer_skipped_for_absent_empty_or_nonstring() {
        for issuer in [None, Some(json!("")), Some(json!(42))] {
            let mut info = valid_info();
            info.issuer = issuer;
            let policy = policy(
                BearerConfig {
                    issuer: Some("https://as.example.com".into()),
                    ..Default::default()
                },
                Ok(info),
            );
            assert!(policy.authorize(Some("Bearer tok")).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_audience_normalization() {
        let allowed = "https://api.example.com/mcp";
        let cases = [
            ("https://api.example.com/mcp#", true),
            ("https://api.example.com/mcp", true),
            ("https://other/mcp", false),
        ];

        for (token_resource, expect_ok) in cases {
            let mut info = valid_info();
            info.resource = Some(Url::parse(token_resource).unwrap());
            let policy = policy(
                BearerConfig {
                    audience: vec![allowed.to_string()],
                    ..Default::default()
                },
                Ok(info),
            );

            let outcome = policy.authorize(Some("Bearer tok")).await;
            assert_eq!(outcome.is_ok(), expect_ok, "resource {token_resource}");
            if !expect_ok {
                assert_eq!(
                    outcome.unwrap_err().body.error_description.as_deref(),
                    Some("Invalid token audience")
                );
            }
        }
    }

    #[tokio::test]
    async fn test_audience_with_trailing_marker_in_config() {
        let mut info = valid_info();
        info.resource = Some(Url::parse("https://api.example.com/mcp").unwrap());
        let policy = policy(
            BearerConfig {
                audience: vec!["https://api.example.com/mcp#".to_string()],
                ..Default::default()
            },
            Ok(info),
        );
        assert!(policy.authorize(Some("Bearer tok")).await.is_ok());
    }

    #[tokio::test]
    async fn test_audience_skipped_without_resource() {
        let policy = policy(
            BearerConfig {
                audience: vec!["https://api.example.com/mcp".to_string()],
                ..Default::default()
            },
            Ok(valid_info()),
        );
        assert!(policy.authorize(Some("Bearer tok")).await.is_ok());
    }

    #[tokio::test]
    async fn test_required_scope_subset() {
        let policy = policy(
            BearerConfig {
                required_scopes: vec!["read".into(), "admin".into()],
                ..Default::default()
            },
            Ok(valid_info()), // carries read, write
        );

        let rejection = policy.authorize(Some("Bearer tok")).await.unwrap_err();
        assert_eq!(rejection.status, 403);
        assert_eq!(rejection.body.error, OAuthErrorCode::InsufficientScope);
        assert!(rejection
            .www_authenticate
            .unwrap()
            .contains("scope=\"read admin\""));
    }
}
