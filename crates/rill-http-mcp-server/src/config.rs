//! HTTP server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::cors::CorsConfig;

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Address to bind.
    pub bind_address: SocketAddr,
    /// Streamable HTTP endpoint path.
    pub mcp_path: String,
    /// Maximum accepted request body size.
    pub max_body_size: usize,
    /// Serve long-lived GET SSE channels.
    pub enable_get_sse: bool,
    /// Answer POSTs with an SSE stream when the client accepts it.
    pub enable_post_sse: bool,
    /// Mount the legacy `/sse` + `/message` transport.
    pub enable_legacy_sse: bool,
    /// Keep-alive comment interval on SSE channels.
    pub keepalive_interval: Duration,
    /// CORS behavior; `None` disables the layer.
    pub cors: Option<CorsConfig>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: ([127, 0, 0, 1], 8000).into(),
            mcp_path: "/mcp".to_string(),
            max_body_size: 1024 * 1024,
            enable_get_sse: true,
            enable_post_sse: true,
            enable_legacy_sse: false,
            keepalive_interval: Duration::from_secs(30),
            cors: Some(CorsConfig::default()),
        }
    }
}

impl HttpServerConfig {
    /// Path the legacy transport's event stream is served from.
    pub const LEGACY_SSE_PATH: &'static str = "/sse";

    /// Path legacy clients POST messages to.
    pub const LEGACY_MESSAGE_PATH: &'static str = "/message";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpServerConfig::default();
        assert_eq!(config.mcp_path, "/mcp");
        assert!(config.enable_get_sse);
        assert!(!config.enable_legacy_sse);
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
    }
}
