//! The client-side OAuth 2.1 authorization flow.
//!
//! Driven by the first `initialize` attempt against a protected server:
//!
//! 1. discover the protected-resource metadata (RFC 9728) — at the URL
//!    from the bearer challenge's `resource_metadata` parameter, or the
//!    resource's own well-known path;
//! 2. discover the authorization-server metadata (RFC 8414);
//! 3. reuse the persisted client registration or dynamically register
//!    (RFC 7591), persisting the full response;
//! 4. build the authorization URL with a PKCE S256 challenge, a random
//!    CSRF `state`, the resource indicator (RFC 8707), and the
//!    requested scopes, then hand it to the `on_redirect` hook;
//! 5. exchange the code delivered via [`AuthSession::complete_auth_flow`]
//!    for tokens using the configured client-auth method;
//! 6. attach `Authorization: Bearer` to every request, refreshing
//!    proactively near expiry and once reactively on a 401.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use rill_mcp_oauth::{AuthorizationServerMetadata, OAuthError, OAuthErrorCode, ProtectedResourceMetadata};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use url::Url;

use crate::error::{ClientError, Result};

/// How the client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAuthMethod {
    #[serde(rename = "client_secret_basic")]
    ClientSecretBasic,
    #[serde(rename = "client_secret_post")]
    ClientSecretPost,
    /// Public client (PKCE only).
    #[serde(rename = "none")]
    None,
}

impl ClientAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientAuthMethod::ClientSecretBasic => "client_secret_basic",
            ClientAuthMethod::ClientSecretPost => "client_secret_post",
            ClientAuthMethod::None => "none",
        }
    }
}

/// A persisted client registration. `raw` keeps the full RFC 7591
/// response so nothing the provider returned is lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub raw: Value,
}

/// A persisted token set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// When the set was obtained (Unix seconds); basis for expiry math.
    pub obtained_at: u64,
}

impl TokenSet {
    fn from_response(value: Value) -> Result<Self> {
        let mut set: TokenSet = serde_json::from_value(json!({
            "access_token": value.get("access_token").cloned().unwrap_or(Value::Null),
            "token_type": value.get("token_type").cloned().unwrap_or(json!("Bearer")),
            "expires_in": value.get("expires_in").cloned(),
            "refresh_token": value.get("refresh_token").cloned(),
            "scope": value.get("scope").cloned(),
            "id_token": value.get("id_token").cloned(),
            "obtained_at": 0
        }))
        .map_err(|err| ClientError::Protocol(format!("malformed token response: {err}")))?;
        set.obtained_at = now_secs();
        Ok(set)
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_in.map(|ttl| self.obtained_at + ttl)
    }

    /// Near-expiry means `now + 30s >= expires_at`.
    pub fn near_expiry(&self) -> bool {
        match self.expires_at() {
            Some(expires_at) => now_secs() + 30 >= expires_at,
            None => false,
        }
    }
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

/// Persists client registrations, keyed by issuer.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get(&self, issuer: &str) -> Option<ClientRegistration>;
    async fn save(&self, issuer: &str, registration: ClientRegistration);
}

/// Persists token sets, keyed by issuer.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, issuer: &str) -> Option<TokenSet>;
    async fn save(&self, issuer: &str, tokens: TokenSet);
    async fn clear(&self, issuer: &str);
}

#[derive(Debug, Default)]
pub struct InMemoryClientStore {
    entries: Mutex<HashMap<String, ClientRegistration>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn get(&self, issuer: &str) -> Option<ClientRegistration> {
        self.entries.lock().expect("store lock poisoned").get(issuer).cloned()
    }

    async fn save(&self, issuer: &str, registration: ClientRegistration) {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(issuer.to_string(), registration);
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    entries: Mutex<HashMap<String, TokenSet>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, issuer: &str) -> Option<TokenSet> {
        self.entries.lock().expect("store lock poisoned").get(issuer).cloned()
    }

    async fn save(&self, issuer: &str, tokens: TokenSet) {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(issuer.to_string(), tokens);
    }

    async fn clear(&self, issuer: &str) {
        self.entries.lock().expect("store lock poisoned").remove(issuer);
    }
}

/// The browser hand-off hook.
pub type RedirectHook = Arc<dyn Fn(String) + Send + Sync>;

/// Flow configuration.
#[derive(Clone)]
pub struct AuthFlowConfig {
    /// The protected resource URL (the MCP endpoint) — both the
    /// discovery anchor and the RFC 8707 resource indicator.
    pub resource_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub client_auth_method: ClientAuthMethod,
    /// Invoked with the authorization URL; the caller completes the
    /// browser round-trip and delivers the code via
    /// [`AuthSession::complete_auth_flow`].
    pub on_redirect: RedirectHook,
    /// Static credentials, skipping dynamic registration.
    pub preregistered: Option<ClientRegistration>,
}

impl AuthFlowConfig {
    pub fn new(
        resource_url: impl Into<String>,
        redirect_uri: impl Into<String>,
        on_redirect: RedirectHook,
    ) -> Self {
        Self {
            resource_url: resource_url.into(),
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            client_auth_method: ClientAuthMethod::None,
            on_redirect,
            preregistered: None,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
        self.client_auth_method = method;
        self
    }
}

/// HTTP operations the flow needs; abstracted so tests can script a
/// provider.
#[async_trait]
pub trait AuthHttp: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;
    async fn post_form(
        &self,
        url: &str,
        basic_auth: Option<(String, Option<String>)>,
        form: Vec<(String, String)>,
    ) -> Result<Value>;
    async fn post_json(&self, url: &str, body: Value) -> Result<Value>;
}

struct ReqwestAuthHttp {
    http: reqwest::Client,
}

#[async_trait]
impl AuthHttp for ReqwestAuthHttp {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Http {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    async fn post_form(
        &self,
        url: &str,
        basic_auth: Option<(String, Option<String>)>,
        form: Vec<(String, String)>,
    ) -> Result<Value> {
        let mut request = self.http.post(url).form(&form);
        if let Some((user, password)) = basic_auth {
            request = request.basic_auth(user, password);
        }
        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            if let Ok(oauth) = serde_json::from_value::<OAuthError>(body.clone()) {
                return Err(ClientError::OAuth(oauth));
            }
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: body.to_string(),
            });
        }
        Ok(body)
    }

    async fn post_json(&self, url: &str, body: Value) -> Result<Value> {
        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: body.to_string(),
            });
        }
        Ok(body)
    }
}

/// PKCE material for one authorization round-trip.
#[derive(Debug, Clone)]
struct PendingAuthorization {
    verifier: String,
    state: String,
    issuer: String,
    token_endpoint: String,
}

#[derive(Default)]
struct FlowState {
    authorization_server: Option<AuthorizationServerMetadata>,
    pending: Option<PendingAuthorization>,
}

/// The authorization state machine.
pub struct AuthSession {
    config: AuthFlowConfig,
    http: Arc<dyn AuthHttp>,
    clients: Arc<dyn ClientStore>,
    tokens: Arc<dyn TokenStore>,
    state: Mutex<FlowState>,
}

impl AuthSession {
    pub fn new(
        config: AuthFlowConfig,
        clients: Arc<dyn ClientStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self::with_http(
            config,
            Arc::new(ReqwestAuthHttp {
                http: reqwest::Client::new(),
            }),
            clients,
            tokens,
        )
    }

    pub fn with_http(
        config: AuthFlowConfig,
        http: Arc<dyn AuthHttp>,
        clients: Arc<dyn ClientStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            config,
            http,
            clients,
            tokens,
            state: Mutex::new(FlowState::default()),
        }
    }

    /// The bearer token for the next request, refreshed proactively
    /// when near expiry. `None` when no flow has completed yet.
    pub async fn bearer(&self) -> Result<Option<String>> {
        let issuer = match self.known_issuer() {
            Some(issuer) => issuer,
            None => return Ok(None),
        };
        let tokens = match self.tokens.get(&issuer).await {
            Some(tokens) => tokens,
            None => return Ok(None),
        };

        if tokens.near_expiry() && tokens.refresh_token.is_some() {
            debug!("access token near expiry, refreshing");
            if self.refresh().await? {
                if let Some(fresh) = self.tokens.get(&issuer).await {
                    return Ok(Some(fresh.access_token));
                }
            }
        }
        Ok(Some(tokens.access_token))
    }

    /// Begin the authorization-code flow: discovery, registration, and
    /// the `on_redirect` hand-off.
    pub async fn begin_authorization(&self, resource_metadata_url: Option<&str>) -> Result<()> {
        // 1. protected-resource metadata
        let metadata_url = match resource_metadata_url {
            Some(url) => url.to_string(),
            None => well_known_resource_url(&self.config.resource_url)?,
        };
        let resource: ProtectedResourceMetadata =
            serde_json::from_value(self.http.get_json(&metadata_url).await?)
                .map_err(|err| ClientError::Protocol(format!("malformed resource metadata: {err}")))?;
        let issuer = resource
            .authorization_servers
            .first()
            .cloned()
            .ok_or_else(|| {
                ClientError::Protocol("resource metadata lists no authorization server".to_string())
            })?;

        // 2. authorization-server metadata
        let as_metadata: AuthorizationServerMetadata = serde_json::from_value(
            self.http
                .get_json(&well_known_as_url(&issuer)?)
                .await?,
        )
        .map_err(|err| ClientError::Protocol(format!("malformed AS metadata: {err}")))?;

        // 3. client registration: reuse or register
        let registration = match self.clients.get(&issuer).await {
            Some(registration) => registration,
            None => match &self.config.preregistered {
                Some(registration) => {
                    self.clients.save(&issuer, registration.clone()).await;
                    registration.clone()
                }
                None => {
                    let registration = self.register(&as_metadata).await?;
                    self.clients.save(&issuer, registration.clone()).await;
                    registration
                }
            },
        };

        // 4. authorization URL with PKCE + state + resource indicator
        let verifier = random_verifier();
        let challenge = s256_challenge(&verifier);
        let state = random_state();

        let mut url = Url::parse(&as_metadata.authorization_endpoint)
            .map_err(|err| ClientError::Protocol(format!("bad authorization endpoint: {err}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &registration.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &state)
            .append_pair("resource", &self.config.resource_url);
        if !self.config.scopes.is_empty() {
            url.query_pairs_mut()
                .append_pair("scope", &self.config.scopes.join(" "));
        }

        {
            let mut flow = self.state.lock().expect("flow lock poisoned");
            flow.authorization_server = Some(as_metadata.clone());
            flow.pending = Some(PendingAuthorization {
                verifier,
                state,
                issuer: issuer.clone(),
                token_endpoint: as_metadata.token_endpoint.clone(),
            });
        }

        info!(issuer = %issuer, "authorization flow started");
        // 5. the caller completes the browser round-trip
        (self.config.on_redirect)(url.to_string());
        Ok(())
    }

    /// Exchange the authorization code and persist the tokens.
    pub async fn complete_auth_flow(&self, code: &str) -> Result<()> {
        let pending = self
            .state
            .lock()
            .expect("flow lock poisoned")
            .pending
            .take()
            .ok_or_else(|| {
                ClientError::Protocol("no authorization flow in progress".to_string())
            })?;

        let registration = self
            .clients
            .get(&pending.issuer)
            .await
            .ok_or_else(|| ClientError::Protocol("client registration vanished".to_string()))?;

        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), self.config.redirect_uri.clone()),
            ("code_verifier".to_string(), pending.verifier.clone()),
            ("resource".to_string(), self.config.resource_url.clone()),
        ];
        let basic_auth = self.apply_client_auth(&registration, &mut form);

        let response = self
            .http
            .post_form(&pending.token_endpoint, basic_auth, form)
            .await?;
        let tokens = TokenSet::from_response(response)?;
        self.tokens.save(&pending.issuer, tokens).await;
        info!(issuer = %pending.issuer, "token exchange complete");
        Ok(())
    }

    /// Refresh-token exchange. Returns whether a refresh happened.
    pub async fn refresh(&self) -> Result<bool> {
        let issuer = match self.known_issuer() {
            Some(issuer) => issuer,
            None => return Ok(false),
        };
        let token_endpoint = {
            let flow = self.state.lock().expect("flow lock poisoned");
            flow.authorization_server
                .as_ref()
                .map(|m| m.token_endpoint.clone())
        };
        let token_endpoint = match token_endpoint {
            Some(endpoint) => endpoint,
            None => return Ok(false),
        };

        let tokens = match self.tokens.get(&issuer).await {
            Some(tokens) => tokens,
            None => return Ok(false),
        };
        let refresh_token = match tokens.refresh_token {
            Some(token) => token,
            None => return Ok(false),
        };
        let registration = match self.clients.get(&issuer).await {
            Some(registration) => registration,
            None => return Ok(false),
        };

        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token),
            ("resource".to_string(), self.config.resource_url.clone()),
        ];
        let basic_auth = self.apply_client_auth(&registration, &mut form);

        match self.http.post_form(&token_endpoint, basic_auth, form).await {
            Ok(response) => {
                let fresh = TokenSet::from_response(response)?;
                self.tokens.save(&issuer, fresh).await;
                debug!(issuer = %issuer, "tokens refreshed");
                Ok(true)
            }
            Err(ClientError::OAuth(err)) if err.error == OAuthErrorCode::InvalidGrant => {
                // the refresh token is dead; force a new authorization
                self.tokens.clear(&issuer).await;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Drop persisted tokens (forces re-authorization).
    pub async fn forget_tokens(&self) {
        if let Some(issuer) = self.known_issuer() {
            self.tokens.clear(&issuer).await;
        }
    }

    fn known_issuer(&self) -> Option<String> {
        let flow = self.state.lock().expect("flow lock poisoned");
        flow.authorization_server
            .as_ref()
            .map(|m| m.issuer.clone())
            .or_else(|| flow.pending.as_ref().map(|p| p.issuer.clone()))
    }

    /// RFC 7591 dynamic registration.
    async fn register(
        &self,
        as_metadata: &AuthorizationServerMetadata,
    ) -> Result<ClientRegistration> {
        let endpoint = as_metadata.registration_endpoint.as_ref().ok_or_else(|| {
            ClientError::OAuth(OAuthError::with_description(
                OAuthErrorCode::InvalidClient,
                "provider does not support dynamic registration and no client is configured",
            ))
        })?;

        let response = self
            .http
            .post_json(
                endpoint,
                json!({
                    "client_name": "rill-mcp-client",
                    "redirect_uris": [self.config.redirect_uri],
                    "grant_types": ["authorization_code", "refresh_token"],
                    "response_types": ["code"],
                    "token_endpoint_auth_method": self.config.client_auth_method.as_str(),
                }),
            )
            .await?;

        let client_id = response
            .get("client_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ClientError::Protocol("registration response missing client_id".to_string())
            })?
            .to_string();
        let client_secret = response
            .get("client_secret")
            .and_then(Value::as_str)
            .map(str::to_string);

        debug!(client_id = %client_id, "dynamic registration complete");
        Ok(ClientRegistration {
            client_id,
            client_secret,
            raw: response,
        })
    }

    /// Apply the configured client-auth method to a token request.
    fn apply_client_auth(
        &self,
        registration: &ClientRegistration,
        form: &mut Vec<(String, String)>,
    ) -> Option<(String, Option<String>)> {
        match self.config.client_auth_method {
            ClientAuthMethod::ClientSecretBasic => Some((
                registration.client_id.clone(),
                registration.client_secret.clone(),
            )),
            ClientAuthMethod::ClientSecretPost => {
                form.push(("client_id".to_string(), registration.client_id.clone()));
                if let Some(secret) = &registration.client_secret {
                    form.push(("client_secret".to_string(), secret.clone()));
                }
                None
            }
            ClientAuthMethod::None => {
                form.push(("client_id".to_string(), registration.client_id.clone()));
                None
            }
        }
    }
}

/// Derive `/.well-known/oauth-protected-resource` from the resource URL
/// origin.
fn well_known_resource_url(resource_url: &str) -> Result<String> {
    let url = Url::parse(resource_url)
        .map_err(|err| ClientError::Protocol(format!("bad resource URL: {err}")))?;
    Ok(format!(
        "{}://{}{}",
        url.scheme(),
        url.authority(),
        ProtectedResourceMetadata::WELL_KNOWN_PATH
    ))
}

/// Derive `/.well-known/oauth-authorization-server` from the issuer.
fn well_known_as_url(issuer: &str) -> Result<String> {
    let url = Url::parse(issuer)
        .map_err(|err| ClientError::Protocol(format!("bad issuer URL: {err}")))?;
    Ok(format!(
        "{}://{}{}",
        url.scheme(),
        url.authority(),
        AuthorizationServerMetadata::WELL_KNOWN_PATH
    ))
}

const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// A 64-character PKCE verifier from the RFC 7636 unreserved set
/// (43–128 characters are legal).
fn random_verifier() -> String {
    let mut rng = rand::thread_rng();
    (0..64)
        .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
        .collect()
}

/// The S256 challenge: base64url(sha256(verifier)), unpadded.
fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// A random CSRF `state` value.
fn random_state() -> String {
    let bytes: [u8; 24] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}
