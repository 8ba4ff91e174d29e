//! The top-level server: builder, options, and transport wiring.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rill_http_mcp_server::{HttpServer, HttpServerConfig, McpService, RequestContext};
use rill_mcp_oauth::{AuthorizationServerMetadata, BearerPolicy, ProtectedResourceMetadata};
use rill_mcp_protocol::{
    CallToolResult, GetPromptResult, Implementation, McpResult, Prompt, PromptsCapability,
    ReadResourceResult, Resource, ResourceTemplate, ResourcesCapability, ServerCapabilities,
    Tool, ToolsCapability,
};
use rill_mcp_session::{InMemorySessionStore, SessionConfig, SessionManager};

use crate::dispatch::{McpDispatcher, Router};
use crate::handler::{
    FnPrompt, FnResource, FnTool, McpCompletionHandler, McpPromptHandler, McpResourceHandler,
    McpTool,
};
use crate::middleware::Middleware;
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::DEFAULT_PAGE_SIZE;

/// Server identity and behavior knobs consulted by the router.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub implementation: Implementation,
    pub instructions: Option<String>,
    pub page_size: usize,
    /// Advertise `resources.subscribe`.
    pub resources_subscribe: bool,
    /// Experimental capability advertisement (`sampling`, `roots`, ...).
    pub experimental: Option<HashMap<String, Value>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            implementation: Implementation::default(),
            instructions: None,
            page_size: DEFAULT_PAGE_SIZE,
            resources_subscribe: false,
            experimental: None,
        }
    }
}

impl ServerOptions {
    /// Capabilities advertised on `initialize`, derived from what is
    /// actually registered.
    pub fn capabilities(
        &self,
        has_tools: bool,
        has_resources: bool,
        has_prompts: bool,
    ) -> ServerCapabilities {
        ServerCapabilities {
            tools: has_tools.then_some(ToolsCapability {
                list_changed: Some(true),
            }),
            resources: has_resources.then_some(ResourcesCapability {
                subscribe: Some(self.resources_subscribe),
                list_changed: Some(true),
            }),
            prompts: has_prompts.then_some(PromptsCapability {
                list_changed: Some(true),
            }),
            completions: Some(HashMap::new()),
            logging: Some(HashMap::new()),
            experimental: self.experimental.clone(),
        }
    }
}

/// Builder for [`McpServer`].
pub struct McpServerBuilder {
    options: ServerOptions,
    http_config: HttpServerConfig,
    session_config: SessionConfig,
    middleware: Vec<Arc<dyn Middleware>>,
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    prompts: Arc<PromptRegistry>,
    bearer: Option<Arc<BearerPolicy>>,
    resource_metadata: Option<ProtectedResourceMetadata>,
    authorization_server_metadata: Option<AuthorizationServerMetadata>,
    registration_error: Option<rill_mcp_protocol::McpError>,
}

impl McpServerBuilder {
    pub fn new() -> Self {
        Self {
            options: ServerOptions::default(),
            http_config: HttpServerConfig::default(),
            session_config: SessionConfig::default(),
            middleware: Vec::new(),
            tools: Arc::new(ToolRegistry::new()),
            resources: Arc::new(ResourceRegistry::new()),
            prompts: Arc::new(PromptRegistry::new()),
            bearer: None,
            resource_metadata: None,
            authorization_server_metadata: None,
            registration_error: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.implementation.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.options.implementation.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.options.instructions = Some(instructions.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.options.page_size = page_size.max(1);
        self
    }

    pub fn http_config(mut self, config: HttpServerConfig) -> Self {
        self.http_config = config;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Run without stored sessions: ids are never issued and peer
    /// requests are disabled.
    pub fn stateless(mut self) -> Self {
        self.session_config.stateless = true;
        self
    }

    /// Guard the MCP endpoint with bearer authorization.
    pub fn bearer(mut self, policy: Arc<BearerPolicy>) -> Self {
        self.bearer = Some(policy);
        self
    }

    pub fn resource_metadata(mut self, metadata: ProtectedResourceMetadata) -> Self {
        self.resource_metadata = Some(metadata);
        self
    }

    pub fn authorization_server_metadata(mut self, metadata: AuthorizationServerMetadata) -> Self {
        self.authorization_server_metadata = Some(metadata);
        self
    }

    /// Append a middleware; outer→inner in call order.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Register a tool.
    pub fn tool(mut self, descriptor: Tool, handler: Arc<dyn McpTool>) -> Self {
        if let Err(err) = self.tools.register(descriptor, handler) {
            self.registration_error.get_or_insert(err);
        }
        self
    }

    /// Register a tool from an async closure.
    pub fn tool_fn<F, Fut>(self, descriptor: Tool, func: F) -> Self
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<CallToolResult>> + Send + 'static,
    {
        self.tool(descriptor, Arc::new(FnTool::new(func)))
    }

    /// Register a concrete resource.
    pub fn resource(mut self, descriptor: Resource, handler: Arc<dyn McpResourceHandler>) -> Self {
        if let Err(err) = self.resources.register(descriptor, handler) {
            self.registration_error.get_or_insert(err);
        }
        self
    }

    /// Register a concrete resource from an async closure.
    pub fn resource_fn<F, Fut>(self, descriptor: Resource, func: F) -> Self
    where
        F: Fn(RequestContext, String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<ReadResourceResult>> + Send + 'static,
    {
        self.resource(descriptor, Arc::new(FnResource::new(func)))
    }

    /// Register a resource template, optionally with a completion hook
    /// for its variables.
    pub fn resource_template(
        mut self,
        descriptor: ResourceTemplate,
        handler: Arc<dyn McpResourceHandler>,
        completion: Option<Arc<dyn McpCompletionHandler>>,
    ) -> Self {
        if let Err(err) = self.resources.register_template(descriptor, handler, completion) {
            self.registration_error.get_or_insert(err);
        }
        self
    }

    /// Register a resource template from an async closure.
    pub fn resource_template_fn<F, Fut>(self, descriptor: ResourceTemplate, func: F) -> Self
    where
        F: Fn(RequestContext, String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<ReadResourceResult>> + Send + 'static,
    {
        self.resource_template(descriptor, Arc::new(FnResource::new(func)), None)
    }

    /// Register a prompt with per-argument completion hooks.
    pub fn prompt(
        mut self,
        descriptor: Prompt,
        handler: Arc<dyn McpPromptHandler>,
        completions: HashMap<String, Arc<dyn McpCompletionHandler>>,
    ) -> Self {
        if let Err(err) = self.prompts.register(descriptor, handler, completions) {
            self.registration_error.get_or_insert(err);
        }
        self
    }

    /// Register a prompt from an async closure.
    pub fn prompt_fn<F, Fut>(self, descriptor: Prompt, func: F) -> Self
    where
        F: Fn(RequestContext, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<GetPromptResult>> + Send + 'static,
    {
        self.prompt(descriptor, Arc::new(FnPrompt::new(func)), HashMap::new())
    }

    pub fn build(self) -> McpResult<McpServer> {
        if let Some(err) = self.registration_error {
            return Err(err);
        }

        let sessions = Arc::new(SessionManager::new(
            Arc::new(InMemorySessionStore::new()),
            self.session_config,
        ));

        let router = Arc::new(Router::with_registries(
            self.options,
            self.tools,
            self.resources,
            self.prompts,
        ));
        let dispatcher = Arc::new(McpDispatcher::new(Arc::clone(&router), self.middleware));

        let mut http_builder = HttpServer::builder()
            .config(self.http_config)
            .sessions(Arc::clone(&sessions))
            .service(Arc::clone(&dispatcher) as Arc<dyn McpService>);
        if let Some(bearer) = self.bearer {
            http_builder = http_builder.bearer(bearer);
        }
        if let Some(metadata) = self.resource_metadata {
            http_builder = http_builder.resource_metadata(metadata);
        }
        if let Some(metadata) = self.authorization_server_metadata {
            http_builder = http_builder.authorization_server_metadata(metadata);
        }
        let http = http_builder
            .build()
            .map_err(|err| rill_mcp_protocol::McpError::internal(err.to_string()))?;

        Ok(McpServer {
            http,
            dispatcher,
            sessions,
        })
    }
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully wired MCP server.
pub struct McpServer {
    http: HttpServer,
    dispatcher: Arc<McpDispatcher>,
    sessions: Arc<SessionManager>,
}

impl McpServer {
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    /// Serve over HTTP until aborted.
    pub async fn run(&self) -> rill_http_mcp_server::Result<()> {
        self.http.run().await
    }

    /// The HTTP layer, for embedding or driving in tests.
    pub fn http(&self) -> &HttpServer {
        &self.http
    }

    /// The dispatcher, usable directly as an [`McpService`].
    pub fn service(&self) -> Arc<dyn McpService> {
        Arc::clone(&self.dispatcher) as Arc<dyn McpService>
    }

    pub fn dispatcher(&self) -> &Arc<McpDispatcher> {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Push a notification to every live session (non-atomic; drops are
    /// not failures).
    pub fn broadcast(
        &self,
        notification: &rill_json_rpc::JsonRpcNotification,
    ) -> (usize, Option<rill_mcp_session::QueueClosed>) {
        self.sessions.broadcast(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_mcp_protocol::JsonSchema;

    #[test]
    fn test_builder_rejects_duplicate_tools() {
        let result = McpServer::builder()
            .tool_fn(Tool::new("dup", JsonSchema::object()), |_ctx, _args| async {
                Ok(CallToolResult::from_text("a"))
            })
            .tool_fn(Tool::new("dup", JsonSchema::object()), |_ctx, _args| async {
                Ok(CallToolResult::from_text("b"))
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_capability_advertisement_follows_registrations() {
        let options = ServerOptions::default();

        let caps = options.capabilities(true, false, true);
        assert!(caps.tools.is_some());
        assert!(caps.resources.is_none());
        assert!(caps.prompts.is_some());
        assert!(caps.completions.is_some());
        assert!(caps.logging.is_some());

        let none = options.capabilities(false, false, false);
        assert!(none.tools.is_none());
        assert!(none.prompts.is_none());
    }

    #[tokio::test]
    async fn test_build_wires_http_and_sessions() {
        let server = McpServer::builder()
            .name("test")
            .version("0.0.1")
            .tool_fn(Tool::new("noop", JsonSchema::object()), |_ctx, _args| async {
                Ok(CallToolResult::from_text("ok"))
            })
            .build()
            .unwrap();

        assert_eq!(server.http().config().mcp_path, "/mcp");
        assert_eq!(server.sessions().session_count().await.unwrap(), 0);
    }
}
