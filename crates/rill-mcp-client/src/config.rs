//! Client configuration.

use std::time::Duration;

use rill_mcp_protocol::Implementation;

use crate::auth::AuthFlowConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    pub connect: Duration,
    /// Per-request timeout (not applied to long-lived event streams).
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(30),
        }
    }
}

/// User-facing retry knobs; clamped into a [`RetryPolicy`] at build
/// time.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.initial_delay,
            self.max_delay,
            self.factor,
        )
    }
}

/// Full client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// The Streamable HTTP endpoint URL.
    pub endpoint: String,
    /// Identity sent during `initialize`.
    pub client_info: Implementation,
    /// Protocol version proposed to the server.
    pub protocol_version: String,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    /// OAuth authorization; `None` talks to unprotected servers.
    pub auth: Option<AuthFlowConfig>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_info: Implementation::new("rill-client", env!("CARGO_PKG_VERSION")),
            protocol_version: "2025-03-26".to_string(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            auth: None,
        }
    }

    pub fn with_client_info(mut self, client_info: Implementation) -> Self {
        self.client_info = client_info;
        self
    }

    pub fn with_auth(mut self, auth: AuthFlowConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
