//! # MCP Client
//!
//! A Streamable HTTP client for MCP servers: JSON and SSE response
//! handling, session tracking via `Mcp-Session-Id`, classified retry
//! with bounded exponential backoff, and a transparent OAuth 2.1
//! authorization layer (RFC 9728 discovery, RFC 8414 metadata, RFC 7591
//! dynamic registration, PKCE authorization-code flow, token refresh).
//!
//! ```no_run
//! use rill_mcp_client::{ClientConfig, McpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = McpClient::new(ClientConfig::new("http://127.0.0.1:8000/mcp"));
//!     let init = client.initialize().await?;
//!     println!("server: {}", init.server_info.name);
//!
//!     let tools = client.list_tools().await?;
//!     for tool in tools.tools {
//!         println!("tool: {}", tool.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod transport;

pub use auth::{
    AuthFlowConfig, AuthSession, ClientAuthMethod, ClientRegistration, ClientStore,
    InMemoryClientStore, InMemoryTokenStore, TokenSet, TokenStore,
};
pub use client::McpClient;
pub use config::{ClientConfig, RetryConfig, TimeoutConfig};
pub use error::{ClientError, Result};
pub use retry::{is_retryable_message, retry, RetryPolicy};
pub use transport::{HttpTransport, ServerMessage};
