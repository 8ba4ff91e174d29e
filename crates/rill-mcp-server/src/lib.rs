//! # MCP Server Framework
//!
//! The layer between the HTTP transport and host-supplied handlers:
//! thread-safe registries for tools, resources, and prompts (with list
//! filters and completion hooks), RFC 6570 level-1 URI templates, a
//! middleware chain composed outer→inner, and the method router that
//! implements the MCP surface (`initialize`, `ping`, `tools/*`,
//! `resources/*`, `prompts/*`, `completion/complete`,
//! `logging/setLevel`).
//!
//! ```no_run
//! use rill_mcp_server::{McpServer, ToolEntry};
//! use rill_mcp_protocol::{CallToolResult, JsonSchema, Tool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = McpServer::builder()
//!         .name("greeter")
//!         .version("1.0.0");
//!
//!     server = server.tool_fn(
//!         Tool::new("greet", JsonSchema::object()),
//!         |_ctx, args| async move {
//!             let name = args["name"].as_str().unwrap_or("world");
//!             Ok(CallToolResult::from_text(format!("Hello, {name}!")))
//!         },
//!     );
//!
//!     server.build()?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod handler;
pub mod middleware;
pub mod registry;
pub mod server;
pub mod uri_template;

pub use dispatch::{McpDispatcher, Router};
pub use handler::{
    FnCompletion, FnPrompt, FnResource, FnTool, McpCompletionHandler, McpPromptHandler,
    McpResourceHandler, McpTool,
};
pub use middleware::{Middleware, Next};
pub use registry::{
    PromptEntry, PromptRegistry, ResourceEntry, ResourceRegistry, TemplateEntry, ToolEntry,
    ToolRegistry,
};
pub use server::{McpServer, McpServerBuilder, ServerOptions};
pub use uri_template::UriTemplate;

// The request context and notification API come from the transport
// layer; re-exported so handlers only import this crate.
pub use rill_http_mcp_server::{NotificationSink, RequestContext};
pub use rill_mcp_protocol::{McpError, McpResult};

/// Default page size for `*/list` operations.
pub const DEFAULT_PAGE_SIZE: usize = 50;
