//! The middleware chain around the method router.
//!
//! Registration order is outer→inner: the first middleware added sees
//! the request first and the result last. A middleware may
//! short-circuit by returning without calling [`Next::run`]; errors it
//! returns are normalized into JSON-RPC error envelopes exactly like
//! handler errors.

use async_trait::async_trait;
use rill_json_rpc::JsonRpcRequest;
use serde_json::Value;
use std::sync::Arc;

use rill_http_mcp_server::RequestContext;
use rill_mcp_protocol::McpResult;

use crate::dispatch::Router;

/// One link of the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        ctx: RequestContext,
        request: JsonRpcRequest,
        next: Next,
    ) -> McpResult<Value>;
}

/// The remainder of the chain plus the terminal router.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    router: Arc<Router>,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>, router: Arc<Router>) -> Self {
        Self {
            chain,
            index: 0,
            router,
        }
    }

    /// Invoke the rest of the chain, ending at the router.
    pub async fn run(self, ctx: RequestContext, request: JsonRpcRequest) -> McpResult<Value> {
        match self.chain.get(self.index).cloned() {
            Some(middleware) => {
                let next = Next {
                    chain: self.chain,
                    index: self.index + 1,
                    router: self.router,
                };
                middleware.handle(ctx, request, next).await
            }
            None => self.router.route(ctx, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Router;
    use crate::server::ServerOptions;
    use rill_json_rpc::RequestId;
    use rill_mcp_protocol::McpError;
    use std::sync::Mutex;

    fn router() -> Arc<Router> {
        Arc::new(Router::new(ServerOptions::default()))
    }

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(
            &self,
            ctx: RequestContext,
            request: JsonRpcRequest,
            next: Next,
        ) -> McpResult<Value> {
            self.log.lock().unwrap().push(format!("{}:before", self.label));
            let result = next.run(ctx, request).await;
            self.log.lock().unwrap().push(format!("{}:after", self.label));
            result
        }
    }

    #[tokio::test]
    async fn test_outer_to_inner_ordering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Arc<[Arc<dyn Middleware>]> = Arc::from(vec![
            Arc::new(Recorder {
                label: "outer",
                log: log.clone(),
            }) as Arc<dyn Middleware>,
            Arc::new(Recorder {
                label: "inner",
                log: log.clone(),
            }) as Arc<dyn Middleware>,
        ]);

        let next = Next::new(chain, router());
        let result = next
            .run(
                RequestContext::detached(),
                JsonRpcRequest::new(RequestId::Number(1), "ping"),
            )
            .await;
        assert!(result.is_ok());

        let recorded = log.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(
            &self,
            _ctx: RequestContext,
            _request: JsonRpcRequest,
            _next: Next,
        ) -> McpResult<Value> {
            Err(McpError::InvalidRequest("blocked by policy".to_string()))
        }
    }

    #[tokio::test]
    async fn test_short_circuit_skips_router() {
        let chain: Arc<[Arc<dyn Middleware>]> =
            Arc::from(vec![Arc::new(ShortCircuit) as Arc<dyn Middleware>]);
        let next = Next::new(chain, router());

        let err = next
            .run(
                RequestContext::detached(),
                JsonRpcRequest::new(RequestId::Number(1), "ping"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }
}
