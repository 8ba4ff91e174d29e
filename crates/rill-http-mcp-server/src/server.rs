//! The hyper server wiring both transports onto one listener.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::body::{json_response, HttpResponse};
use crate::config::HttpServerConfig;
use crate::service::McpService;
use crate::sse_legacy::LegacySseHandler;
use crate::streamable::StreamableHttpHandler;
use crate::{HttpTransportError, Result};
use rill_mcp_oauth::{AuthorizationServerMetadata, BearerPolicy, ProtectedResourceMetadata};
use rill_mcp_session::SessionManager;

/// Builder for [`HttpServer`].
pub struct HttpServerBuilder {
    config: HttpServerConfig,
    sessions: Option<Arc<SessionManager>>,
    service: Option<Arc<dyn McpService>>,
    bearer: Option<Arc<BearerPolicy>>,
    resource_metadata: Option<ProtectedResourceMetadata>,
    authorization_server_metadata: Option<AuthorizationServerMetadata>,
}

impl HttpServerBuilder {
    pub fn new() -> Self {
        Self {
            config: HttpServerConfig::default(),
            sessions: None,
            service: None,
            bearer: None,
            resource_metadata: None,
            authorization_server_metadata: None,
        }
    }

    pub fn config(mut self, config: HttpServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, address: std::net::SocketAddr) -> Self {
        self.config.bind_address = address;
        self
    }

    pub fn mcp_path(mut self, path: impl Into<String>) -> Self {
        self.config.mcp_path = path.into();
        self
    }

    pub fn sessions(mut self, sessions: Arc<SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn service(mut self, service: Arc<dyn McpService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Guard the MCP endpoint with bearer authorization.
    pub fn bearer(mut self, policy: Arc<BearerPolicy>) -> Self {
        self.bearer = Some(policy);
        self
    }

    /// Serve the RFC 9728 document at its well-known path.
    pub fn resource_metadata(mut self, metadata: ProtectedResourceMetadata) -> Self {
        self.resource_metadata = Some(metadata);
        self
    }

    /// Serve the RFC 8414 document at its well-known path.
    pub fn authorization_server_metadata(mut self, metadata: AuthorizationServerMetadata) -> Self {
        self.authorization_server_metadata = Some(metadata);
        self
    }

    pub fn build(self) -> Result<HttpServer> {
        let service = self
            .service
            .ok_or_else(|| HttpTransportError::Config("an McpService is required".to_string()))?;
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(SessionManager::in_memory()));
        let config = Arc::new(self.config);

        let streamable = StreamableHttpHandler::new(
            Arc::clone(&config),
            Arc::clone(&sessions),
            Arc::clone(&service),
            self.bearer,
        );
        let legacy = config.enable_legacy_sse.then(|| {
            LegacySseHandler::new(Arc::clone(&config), Arc::clone(&sessions), service)
        });

        Ok(HttpServer {
            inner: Arc::new(ServerInner {
                config,
                sessions,
                streamable,
                legacy,
                resource_metadata: self.resource_metadata,
                authorization_server_metadata: self.authorization_server_metadata,
            }),
        })
    }
}

impl Default for HttpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ServerInner {
    config: Arc<HttpServerConfig>,
    sessions: Arc<SessionManager>,
    streamable: StreamableHttpHandler,
    legacy: Option<LegacySseHandler>,
    resource_metadata: Option<ProtectedResourceMetadata>,
    authorization_server_metadata: Option<AuthorizationServerMetadata>,
}

/// The HTTP MCP server.
#[derive(Clone)]
pub struct HttpServer {
    inner: Arc<ServerInner>,
}

impl HttpServer {
    pub fn builder() -> HttpServerBuilder {
        HttpServerBuilder::new()
    }

    pub fn config(&self) -> &HttpServerConfig {
        &self.inner.config
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.inner.sessions
    }

    /// Bind and serve until the task is aborted. The session reaper
    /// runs for as long as the server does.
    pub async fn run(&self) -> Result<()> {
        let _reaper = self.inner.sessions.start_reaper();

        let listener = TcpListener::bind(self.inner.config.bind_address).await?;
        info!(
            address = %self.inner.config.bind_address,
            path = %self.inner.config.mcp_path,
            "HTTP MCP server listening"
        );

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    debug!(error = %err, "accept failed");
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.route(req).await) }
                });
                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    debug!(remote = %remote, error = %err, "connection closed with error");
                }
            });
        }
    }

    /// Route one request. Public so embedders and tests can drive the
    /// server without a socket.
    pub async fn route<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
    {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        let mut response = if method == Method::OPTIONS {
            match &self.inner.config.cors {
                Some(cors) => cors.preflight(),
                None => json_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    &json!({"error": "method not allowed"}),
                ),
            }
        } else if path == self.inner.config.mcp_path {
            self.inner.streamable.handle(req).await
        } else if let Some(legacy) = &self.inner.legacy {
            match (method.clone(), path.as_str()) {
                (Method::GET, HttpServerConfig::LEGACY_SSE_PATH) => legacy.handle_sse().await,
                (Method::POST, HttpServerConfig::LEGACY_MESSAGE_PATH) => {
                    legacy.handle_message(req).await
                }
                _ => self.well_known_or_404(&method, &path),
            }
        } else {
            self.well_known_or_404(&method, &path)
        };

        if let Some(cors) = &self.inner.config.cors {
            cors.apply(&mut response);
        }
        response
    }

    fn well_known_or_404(&self, method: &Method, path: &str) -> HttpResponse {
        if *method == Method::GET {
            if path == ProtectedResourceMetadata::WELL_KNOWN_PATH {
                if let Some(metadata) = &self.inner.resource_metadata {
                    return json_response(
                        StatusCode::OK,
                        &serde_json::to_value(metadata).unwrap_or_default(),
                    );
                }
            }
            if path == AuthorizationServerMetadata::WELL_KNOWN_PATH {
                if let Some(metadata) = &self.inner.authorization_server_metadata {
                    return json_response(
                        StatusCode::OK,
                        &serde_json::to_value(metadata).unwrap_or_default(),
                    );
                }
            }
        }
        json_response(StatusCode::NOT_FOUND, &json!({"error": "not found"}))
    }
}
