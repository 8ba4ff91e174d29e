//! # HTTP Transport for MCP Servers
//!
//! Two transports over one hyper server:
//!
//! - **Streamable HTTP** (default path `/mcp`): POST carries JSON-RPC
//!   messages or batches and answers with a single JSON body or, when
//!   the client accepts `text/event-stream`, an SSE stream whose last
//!   event is the response; GET opens a long-lived SSE channel fed by
//!   the session's notification queue; DELETE terminates the session.
//! - **Legacy HTTP+SSE** (`/sse` + `/message`): the 2024-11-05 shape,
//!   kept byte-compatible — the event stream announces the message
//!   endpoint, every response arrives over the stream, POSTs answer 202.
//!
//! Session resolution, optional bearer authorization, and the RFC 9728 /
//! RFC 8414 metadata documents are handled here; request semantics live
//! behind the [`McpService`] trait the server crate implements.

pub mod body;
pub mod config;
pub mod context;
pub mod cors;
pub mod server;
pub mod service;
pub mod sse;
pub mod sse_legacy;
pub mod streamable;

pub use body::{empty_response, json_response, sse_response, BoxedBody, HttpResponse};
pub use config::HttpServerConfig;
pub use context::{NotificationSink, RequestContext};
pub use cors::CorsConfig;
pub use server::{HttpServer, HttpServerBuilder};
pub use service::McpService;
pub use sse::SseFrame;
pub use sse_legacy::LegacySseHandler;
pub use streamable::StreamableHttpHandler;

/// Session id header, emitted on the `initialize` response and required
/// (outside stateless mode) on every follow-up request.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// SSE resumption header.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-Id";

/// Result alias for HTTP transport operations.
pub type Result<T> = std::result::Result<T, HttpTransportError>;

/// HTTP transport errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session storage error: {0}")]
    Session(#[from] rill_mcp_session::SessionStoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
