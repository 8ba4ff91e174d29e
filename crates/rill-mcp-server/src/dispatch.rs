//! Method routing and error normalization.
//!
//! The router owns the static method table; [`McpDispatcher`] wraps it
//! with the middleware chain and implements the transport-facing
//! [`McpService`]. Normalization rules:
//!
//! - a handler error becomes a JSON-RPC error envelope, exactly once —
//!   an already-formed envelope passes through untouched;
//! - a handler value is wrapped in a response envelope unless it is one;
//! - notifications never generate responses, whatever a handler
//!   returns;
//! - a panic inside a handler is caught and mapped to `-32603` with the
//!   panic text in `data`.

use async_trait::async_trait;
use futures::FutureExt;
use rill_json_rpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use rill_http_mcp_server::{McpService, RequestContext};
use rill_mcp_protocol::{
    methods, CallToolRequestParams, CancelledParams, CompleteRequestParams, CompleteResult,
    CompletionReference, GetPromptRequestParams, InitializeRequestParams, InitializeResult,
    ListPromptsRequestParams, ListPromptsResult, ListResourceTemplatesRequestParams,
    ListResourceTemplatesResult, ListResourcesRequestParams, ListResourcesResult,
    ListToolsRequestParams, ListToolsResult, McpError, McpResult, Page, ProtocolVersion,
    ReadResourceRequestParams, SetLevelRequestParams, SubscribeRequestParams,
    UnsubscribeRequestParams,
};

use crate::middleware::{Middleware, Next};
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::server::ServerOptions;

/// Session-data key recording the requested log level.
const LOG_LEVEL_KEY: &str = "logging.level";
/// Session-data key recording resource subscriptions.
const SUBSCRIPTIONS_KEY: &str = "resources.subscriptions";

/// The terminal request router.
pub struct Router {
    options: ServerOptions,
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    prompts: Arc<PromptRegistry>,
}

impl Router {
    /// A router over empty registries.
    pub fn new(options: ServerOptions) -> Self {
        Self::with_registries(
            options,
            Arc::new(ToolRegistry::new()),
            Arc::new(ResourceRegistry::new()),
            Arc::new(PromptRegistry::new()),
        )
    }

    pub fn with_registries(
        options: ServerOptions,
        tools: Arc<ToolRegistry>,
        resources: Arc<ResourceRegistry>,
        prompts: Arc<PromptRegistry>,
    ) -> Self {
        Self {
            options,
            tools,
            resources,
            prompts,
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    pub fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    /// Dispatch one request to its handler.
    pub async fn route(&self, ctx: RequestContext, request: JsonRpcRequest) -> McpResult<Value> {
        match request.method.as_str() {
            methods::INITIALIZE => self.initialize(&request).await,
            methods::PING => Ok(json!({})),
            methods::LOGGING_SET_LEVEL => self.set_log_level(&ctx, &request).await,
            methods::TOOLS_LIST => self.list_tools(&ctx, &request).await,
            methods::TOOLS_CALL => self.call_tool(&ctx, &request).await,
            methods::RESOURCES_LIST => self.list_resources(&ctx, &request).await,
            methods::RESOURCES_TEMPLATES_LIST => self.list_resource_templates(&request).await,
            methods::RESOURCES_READ => self.read_resource(&ctx, &request).await,
            methods::RESOURCES_SUBSCRIBE => self.subscribe(&ctx, &request).await,
            methods::RESOURCES_UNSUBSCRIBE => self.unsubscribe(&ctx, &request).await,
            methods::PROMPTS_LIST => self.list_prompts(&ctx, &request).await,
            methods::PROMPTS_GET => self.get_prompt(&ctx, &request).await,
            methods::COMPLETION_COMPLETE => self.complete(&ctx, &request).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    /// Dispatch one notification. Results, if any, are discarded.
    pub async fn route_notification(&self, ctx: RequestContext, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => {
                debug!(session_id = ?ctx.session_id(), "client initialization complete");
            }
            methods::NOTIFICATION_CANCELLED => match notification.params_as::<CancelledParams>() {
                Ok(params) => {
                    debug!(
                        request_id = %params.request_id,
                        reason = params.reason.as_deref().unwrap_or(""),
                        "request cancelled by client"
                    );
                }
                Err(err) => warn!(error = %err, "malformed cancellation notification"),
            },
            other => {
                debug!(method = other, "ignoring unknown notification");
            }
        }
    }

    async fn initialize(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: InitializeRequestParams = parse_params(request)?;
        let version = ProtocolVersion::negotiate(&params.protocol_version);

        if let Some(client) = &params.client_info {
            debug!(
                client = %client.name,
                client_version = %client.version,
                negotiated = %version,
                "initialize"
            );
        }

        let result = InitializeResult::new(version, self.options.implementation.clone())
            .with_capabilities(self.options.capabilities(
                !self.tools.is_empty(),
                !self.resources.is_empty(),
                !self.prompts.is_empty(),
            ));
        let result = match &self.options.instructions {
            Some(instructions) => result.with_instructions(instructions.clone()),
            None => result,
        };

        to_result_value(&result)
    }

    async fn set_log_level(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: SetLevelRequestParams = parse_params(request)?;
        if let Some(session) = ctx.session() {
            session
                .set_value(LOG_LEVEL_KEY, json!(params.level))
                .await
                .map_err(|err| McpError::internal(err.to_string()))?;
        }
        debug!(level = %params.level, "log level set");
        Ok(json!({}))
    }

    async fn list_tools(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: ListToolsRequestParams = parse_params(request)?;
        let tools = self.tools.list(ctx);
        let page = Page::paginate(&tools, params.cursor.as_ref(), self.options.page_size)?;
        to_result_value(&ListToolsResult {
            tools: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn call_tool(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: CallToolRequestParams = parse_params(request)?;
        let entry = self
            .tools
            .get(&params.name)
            .ok_or_else(|| McpError::ToolNotFound(params.name.clone()))?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let result = entry.handler.call(ctx, arguments).await?;
        to_result_value(&result)
    }

    async fn list_resources(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: ListResourcesRequestParams = parse_params(request)?;
        let resources = self.resources.list(ctx);
        let page = Page::paginate(&resources, params.cursor.as_ref(), self.options.page_size)?;
        to_result_value(&ListResourcesResult {
            resources: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn list_resource_templates(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: ListResourceTemplatesRequestParams = parse_params(request)?;
        let templates = self.resources.list_templates();
        let page = Page::paginate(&templates, params.cursor.as_ref(), self.options.page_size)?;
        to_result_value(&ListResourceTemplatesResult {
            resource_templates: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn read_resource(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: ReadResourceRequestParams = parse_params(request)?;
        let (handler, bindings) = self
            .resources
            .resolve(&params.uri)
            .ok_or_else(|| McpError::ResourceNotFound(params.uri.clone()))?;

        let result = handler.read(ctx, &params.uri, bindings).await?;
        to_result_value(&result)
    }

    async fn subscribe(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: SubscribeRequestParams = parse_params(request)?;
        if self.resources.resolve(&params.uri).is_none() {
            return Err(McpError::ResourceNotFound(params.uri));
        }
        self.update_subscriptions(ctx, |subs| {
            if !subs.contains(&params.uri) {
                subs.push(params.uri.clone());
            }
        })
        .await?;
        Ok(json!({}))
    }

    async fn unsubscribe(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: UnsubscribeRequestParams = parse_params(request)?;
        self.update_subscriptions(ctx, |subs| {
            subs.retain(|uri| uri != &params.uri);
        })
        .await?;
        Ok(json!({}))
    }

    async fn update_subscriptions<F>(&self, ctx: &RequestContext, apply: F) -> McpResult<()>
    where
        F: FnOnce(&mut Vec<String>),
    {
        let session = match ctx.session() {
            Some(session) => session,
            None => return Ok(()),
        };
        let mut subscriptions: Vec<String> = session
            .get_value(SUBSCRIPTIONS_KEY)
            .await
            .map_err(|err| McpError::internal(err.to_string()))?
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        apply(&mut subscriptions);
        session
            .set_value(SUBSCRIPTIONS_KEY, json!(subscriptions))
            .await
            .map_err(|err| McpError::internal(err.to_string()))
    }

    async fn list_prompts(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: ListPromptsRequestParams = parse_params(request)?;
        let prompts = self.prompts.list(ctx);
        let page = Page::paginate(&prompts, params.cursor.as_ref(), self.options.page_size)?;
        to_result_value(&ListPromptsResult {
            prompts: page.items,
            next_cursor: page.next_cursor,
        })
    }

    async fn get_prompt(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: GetPromptRequestParams = parse_params(request)?;
        let entry = self
            .prompts
            .get(&params.name)
            .ok_or_else(|| McpError::PromptNotFound(params.name.clone()))?;

        let arguments = params.arguments.unwrap_or_default();
        for argument in &entry.descriptor.arguments {
            if argument.required.unwrap_or(false) && !arguments.contains_key(&argument.name) {
                return Err(McpError::missing_param(argument.name.clone()));
            }
        }

        let result = entry.handler.get(ctx, arguments).await?;
        to_result_value(&result)
    }

    async fn complete(&self, ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: CompleteRequestParams = parse_params(request)?;
        let context_arguments = params.context.as_ref().and_then(|c| c.arguments.as_ref());

        let result = match &params.reference {
            CompletionReference::Prompt { name } => {
                let hook = self
                    .prompts
                    .get(name)
                    .and_then(|entry| entry.completions.get(&params.argument.name).cloned());
                match hook {
                    Some(hook) => {
                        hook.complete(ctx, &params.argument, context_arguments, HashMap::new())
                            .await?
                    }
                    None => CompleteResult::default(),
                }
            }
            CompletionReference::Resource { uri } => {
                // first matching template (registration order) wins; its
                // variable bindings become the handler params
                match self.resources.matching_template(uri) {
                    Some((entry, bindings)) => match &entry.completion {
                        Some(hook) => {
                            hook.complete(ctx, &params.argument, context_arguments, bindings)
                                .await?
                        }
                        None => CompleteResult::default(),
                    },
                    None => CompleteResult::default(),
                }
            }
        };

        to_result_value(&result)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(request: &JsonRpcRequest) -> McpResult<T> {
    request
        .params_as()
        .map_err(|err| McpError::invalid_params(err.to_string()))
}

fn to_result_value<T: serde::Serialize>(value: &T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|err| McpError::internal(err.to_string()))
}

/// The middleware chain wrapped around the router; the transport's
/// [`McpService`].
pub struct McpDispatcher {
    chain: Arc<[Arc<dyn Middleware>]>,
    router: Arc<Router>,
}

impl McpDispatcher {
    pub fn new(router: Arc<Router>, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            chain: Arc::from(middleware),
            router,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Wrap a handler outcome in an envelope, passing pre-formed
    /// envelopes through untouched.
    fn normalize(id: RequestId, outcome: McpResult<Value>) -> JsonRpcMessage {
        match outcome {
            Ok(value) => {
                if is_envelope(&value) {
                    match serde_json::from_value::<JsonRpcMessage>(value.clone()) {
                        Ok(message) => return message,
                        Err(_) => return JsonRpcMessage::success(id, value),
                    }
                }
                JsonRpcMessage::success(id, value)
            }
            Err(err) => {
                JsonRpcMessage::error(JsonRpcError::new(Some(id), err.to_error_object()))
            }
        }
    }
}

/// An object carrying `jsonrpc`, an `id`, and a `result` or `error` is
/// already a complete envelope.
fn is_envelope(value: &Value) -> bool {
    match value.as_object() {
        Some(obj) => {
            obj.get("jsonrpc").and_then(Value::as_str) == Some("2.0")
                && obj.contains_key("id")
                && (obj.contains_key("result") || obj.contains_key("error"))
        }
        None => false,
    }
}

#[async_trait]
impl McpService for McpDispatcher {
    async fn handle_request(&self, request: JsonRpcRequest, ctx: RequestContext) -> JsonRpcMessage {
        let id = request.id.clone();
        let method = request.method.clone();

        let next = Next::new(Arc::clone(&self.chain), Arc::clone(&self.router));
        let outcome = AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await;

        match outcome {
            Ok(result) => Self::normalize(id, result),
            Err(panic) => {
                let text = panic_text(panic);
                warn!(method = %method, panic = %text, "handler panicked");
                Self::normalize(id, Err(McpError::HandlerPanic(text)))
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification, ctx: RequestContext) {
        let method = notification.method.clone();
        let outcome = AssertUnwindSafe(self.router.route_notification(ctx, notification))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            warn!(method = %method, panic = %panic_text(panic), "notification handler panicked");
        }
    }
}

fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests;
