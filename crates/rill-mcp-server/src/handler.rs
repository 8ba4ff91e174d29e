//! Handler traits at the registry seams.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;

use rill_http_mcp_server::RequestContext;
use rill_mcp_protocol::{
    Argument, CallToolResult, CompleteResult, GetPromptResult, McpResult, ReadResourceResult,
};

/// A callable tool.
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Execute the tool. Domain failures that should reach the model
    /// belong in `CallToolResult::error(..)`, not in `Err` — an `Err`
    /// becomes a JSON-RPC error.
    async fn call(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult>;
}

/// Serves reads for a concrete resource or a template.
///
/// `params` carries the template's variable bindings; it is empty for
/// directly registered resources.
#[async_trait]
pub trait McpResourceHandler: Send + Sync {
    async fn read(
        &self,
        ctx: &RequestContext,
        uri: &str,
        params: HashMap<String, String>,
    ) -> McpResult<ReadResourceResult>;
}

/// Expands a prompt into messages.
#[async_trait]
pub trait McpPromptHandler: Send + Sync {
    async fn get(
        &self,
        ctx: &RequestContext,
        arguments: HashMap<String, String>,
    ) -> McpResult<GetPromptResult>;
}

/// Supplies completion candidates for a prompt argument or a resource
/// template variable.
#[async_trait]
pub trait McpCompletionHandler: Send + Sync {
    /// `argument` is the value being typed; `context_arguments` are
    /// previously resolved arguments; `params` holds the template
    /// variable bindings for resource references.
    async fn complete(
        &self,
        ctx: &RequestContext,
        argument: &Argument,
        context_arguments: Option<&HashMap<String, String>>,
        params: HashMap<String, String>,
    ) -> McpResult<CompleteResult>;
}

/// Adapter turning an async closure into an [`McpTool`].
pub struct FnTool<F> {
    func: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<CallToolResult>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> McpTool for FnTool<F>
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<CallToolResult>> + Send,
{
    async fn call(&self, ctx: &RequestContext, arguments: Value) -> McpResult<CallToolResult> {
        (self.func)(ctx.clone(), arguments).await
    }
}

/// Adapter turning an async closure into an [`McpResourceHandler`].
pub struct FnResource<F> {
    func: F,
}

impl<F, Fut> FnResource<F>
where
    F: Fn(RequestContext, String, HashMap<String, String>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<ReadResourceResult>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> McpResourceHandler for FnResource<F>
where
    F: Fn(RequestContext, String, HashMap<String, String>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<ReadResourceResult>> + Send,
{
    async fn read(
        &self,
        ctx: &RequestContext,
        uri: &str,
        params: HashMap<String, String>,
    ) -> McpResult<ReadResourceResult> {
        (self.func)(ctx.clone(), uri.to_string(), params).await
    }
}

/// Adapter turning an async closure into an [`McpPromptHandler`].
pub struct FnPrompt<F> {
    func: F,
}

impl<F, Fut> FnPrompt<F>
where
    F: Fn(RequestContext, HashMap<String, String>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<GetPromptResult>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> McpPromptHandler for FnPrompt<F>
where
    F: Fn(RequestContext, HashMap<String, String>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<GetPromptResult>> + Send,
{
    async fn get(
        &self,
        ctx: &RequestContext,
        arguments: HashMap<String, String>,
    ) -> McpResult<GetPromptResult> {
        (self.func)(ctx.clone(), arguments).await
    }
}

/// Adapter turning an async closure into an [`McpCompletionHandler`].
/// The closure receives the partial value and the template bindings and
/// returns candidate values.
pub struct FnCompletion<F> {
    func: F,
}

impl<F, Fut> FnCompletion<F>
where
    F: Fn(Argument, HashMap<String, String>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<Vec<String>>> + Send,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> McpCompletionHandler for FnCompletion<F>
where
    F: Fn(Argument, HashMap<String, String>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<Vec<String>>> + Send,
{
    async fn complete(
        &self,
        _ctx: &RequestContext,
        argument: &Argument,
        _context_arguments: Option<&HashMap<String, String>>,
        params: HashMap<String, String>,
    ) -> McpResult<CompleteResult> {
        let values = (self.func)(argument.clone(), params).await?;
        Ok(CompleteResult::from_values(values))
    }
}
