//! The high-level MCP client.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use rill_mcp_protocol::{
    CallToolResult, CompleteResult, GetPromptResult, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, LoggingLevel, methods,
    ReadResourceResult,
};

use crate::auth::{AuthSession, ClientStore, InMemoryClientStore, InMemoryTokenStore, TokenStore};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::retry::{retry, RetryPolicy};
use crate::transport::HttpTransport;

/// An MCP client over Streamable HTTP.
///
/// Calls retry transient failures per the configured policy. When an
/// auth flow is configured, bearer tokens are attached transparently:
/// near-expiry triggers a proactive refresh, a 401 triggers one
/// reactive refresh, and a dead session falls back to a fresh
/// authorization round-trip (surfaced as
/// [`ClientError::AuthorizationRequired`] until the caller delivers the
/// code).
pub struct McpClient {
    config: ClientConfig,
    transport: HttpTransport,
    auth: Option<AuthSession>,
    policy: RetryPolicy,
}

impl McpClient {
    /// Build a client with in-memory client/token stores.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryClientStore::new()),
            Arc::new(InMemoryTokenStore::new()),
        )
    }

    /// Build a client with host-supplied persistence hooks.
    pub fn with_stores(
        config: ClientConfig,
        clients: Arc<dyn ClientStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let transport = HttpTransport::new(&config.endpoint, &config.timeouts)
            .expect("HTTP client construction cannot fail with static TLS config");
        let auth = config
            .auth
            .clone()
            .map(|flow| AuthSession::new(flow, clients, tokens));
        let policy = config.retry.policy();

        Self {
            config,
            transport,
            auth,
            policy,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session id issued by the server, once initialized.
    pub fn session_id(&self) -> Option<String> {
        self.transport.session_id()
    }

    /// Register a handler for notifications delivered on SSE responses.
    pub fn on_notification(&self, handler: Box<dyn Fn(Value) + Send + Sync>) {
        self.transport.on_notification(handler);
    }

    /// Deliver the authorization code after the browser round-trip.
    pub async fn complete_auth_flow(&self, code: &str) -> Result<()> {
        match &self.auth {
            Some(auth) => auth.complete_auth_flow(code).await,
            None => Err(ClientError::Protocol(
                "no authorization flow configured".to_string(),
            )),
        }
    }

    /// `initialize`: the handshake. On a protected server the first
    /// attempt may return [`ClientError::AuthorizationRequired`] after
    /// launching the auth flow; retry once the code is delivered.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let params = json!({
            "protocolVersion": self.config.protocol_version,
            "clientInfo": self.config.client_info,
            "capabilities": {}
        });
        let value = self.request(methods::INITIALIZE, Some(params)).await?;
        let result: InitializeResult = serde_json::from_value(value)?;
        debug!(
            server = %result.server_info.name,
            version = %result.protocol_version,
            "initialized"
        );

        // handshake completion notification
        self.notify(methods::NOTIFICATION_INITIALIZED, None).await?;
        Ok(result)
    }

    pub async fn ping(&self) -> Result<()> {
        self.request(methods::PING, None).await.map(|_| ())
    }

    pub async fn list_tools(&self) -> Result<ListToolsResult> {
        let value = self.request(methods::TOOLS_LIST, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let value = self
            .request(
                methods::TOOLS_CALL,
                Some(json!({"name": name, "arguments": arguments})),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn list_resources(&self) -> Result<ListResourcesResult> {
        let value = self.request(methods::RESOURCES_LIST, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn list_resource_templates(&self) -> Result<ListResourceTemplatesResult> {
        let value = self.request(methods::RESOURCES_TEMPLATES_LIST, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        let value = self
            .request(methods::RESOURCES_READ, Some(json!({"uri": uri})))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        self.request(methods::RESOURCES_SUBSCRIBE, Some(json!({"uri": uri})))
            .await
            .map(|_| ())
    }

    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<()> {
        self.request(methods::RESOURCES_UNSUBSCRIBE, Some(json!({"uri": uri})))
            .await
            .map(|_| ())
    }

    pub async fn list_prompts(&self) -> Result<ListPromptsResult> {
        let value = self.request(methods::PROMPTS_LIST, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        let value = self
            .request(
                methods::PROMPTS_GET,
                Some(json!({"name": name, "arguments": arguments})),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn complete(&self, params: Value) -> Result<CompleteResult> {
        let value = self.request(methods::COMPLETION_COMPLETE, Some(params)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn set_log_level(&self, level: LoggingLevel) -> Result<()> {
        self.request(methods::LOGGING_SET_LEVEL, Some(json!({"level": level})))
            .await
            .map(|_| ())
    }

    /// Terminate the server-side session.
    pub async fn shutdown(&self) -> Result<()> {
        let bearer = self.bearer().await?;
        self.transport.delete_session(bearer.as_deref()).await
    }

    async fn bearer(&self) -> Result<Option<String>> {
        match &self.auth {
            Some(auth) => auth.bearer().await,
            None => Ok(None),
        }
    }

    /// One request with retry around the transient-failure cases.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        retry(&self.policy, || self.request_once(method, params.clone())).await
    }

    /// One attempt, including the reactive 401 path: a single refresh,
    /// then a fresh authorization round-trip.
    async fn request_once(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let bearer = self.bearer().await?;
        let first = self
            .transport
            .send_request(method, params.clone(), bearer.as_deref())
            .await;

        let (unauthorized, resource_metadata) = match first {
            Err(ClientError::Unauthorized {
                error,
                resource_metadata,
            }) => (error, resource_metadata),
            other => return other,
        };

        let auth = match &self.auth {
            Some(auth) => auth,
            None => {
                return Err(ClientError::Unauthorized {
                    error: unauthorized,
                    resource_metadata,
                })
            }
        };

        // one reactive refresh before falling back to re-authorization
        if auth.refresh().await? {
            let bearer = auth.bearer().await?;
            match self
                .transport
                .send_request(method, params, bearer.as_deref())
                .await
            {
                Err(ClientError::Unauthorized { .. }) => {}
                other => return other,
            }
        }

        auth.forget_tokens().await;
        auth.begin_authorization(resource_metadata.as_deref()).await?;
        Err(ClientError::AuthorizationRequired)
    }

    /// Open the long-lived server→client event channel and pump it
    /// until the server closes it.
    ///
    /// Notifications reach the handler registered with
    /// [`Self::on_notification`]; server-initiated requests are answered
    /// by `on_request` and posted back automatically.
    pub async fn listen(
        &self,
        on_request: impl Fn(rill_json_rpc::JsonRpcRequest) -> rill_json_rpc::JsonRpcMessage
            + Send
            + Sync,
    ) -> Result<()> {
        let bearer = self.bearer().await?;
        self.transport.listen(bearer.as_deref(), on_request).await
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let bearer = self.bearer().await?;
        self.transport
            .send_notification(method, params, bearer.as_deref())
            .await
    }
}
