//! The deprecated HTTP+SSE transport (MCP 2024-11-05).
//!
//! `GET /sse` opens the event stream and announces the message endpoint
//! as its first event; the client then POSTs every request to that URL
//! and reads every response off the stream. Always stateful. Kept
//! byte-compatible with 2024-11-05 clients.

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use rill_json_rpc::{parse_message, IncomingMessage};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::body::{empty_response, json_response, sse_response, HttpResponse};
use crate::config::HttpServerConfig;
use crate::context::{NotificationSink, RequestContext};
use crate::service::McpService;
use crate::sse::SseFrame;
use rill_mcp_session::SessionManager;

/// Handles `GET /sse` and `POST /message`.
#[derive(Clone)]
pub struct LegacySseHandler {
    config: Arc<HttpServerConfig>,
    sessions: Arc<SessionManager>,
    service: Arc<dyn McpService>,
}

impl LegacySseHandler {
    pub fn new(
        config: Arc<HttpServerConfig>,
        sessions: Arc<SessionManager>,
        service: Arc<dyn McpService>,
    ) -> Self {
        Self {
            config,
            sessions,
            service,
        }
    }

    /// `GET /sse`: create a session and open its event stream. The
    /// first event is `event: endpoint` carrying the message URL.
    pub async fn handle_sse(&self) -> HttpResponse {
        let session = match self.sessions.create().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "legacy session creation failed");
                return json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({"error": "session creation failed"}),
                );
            }
        };

        debug!(session_id = %session.id(), "legacy SSE stream opened");

        let endpoint = format!(
            "{}?sessionId={}",
            HttpServerConfig::LEGACY_MESSAGE_PATH,
            session.id()
        );
        let keepalive = self.config.keepalive_interval;

        let stream = async_stream::stream! {
            yield SseFrame::Named {
                event: "endpoint".to_string(),
                data: endpoint,
            }
            .format();

            let mut ticker = tokio::time::interval(keepalive);
            ticker.tick().await;
            loop {
                tokio::select! {
                    message = session.queue().pop() => {
                        match message {
                            Some(queued) => {
                                yield SseFrame::event(queued.event_id, queued.message).format();
                            }
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        yield SseFrame::KeepAlive.format();
                    }
                }
            }
        };

        sse_response(stream)
    }

    /// `POST /message?sessionId=...`: accept one message, deliver the
    /// eventual response over the already-open stream, answer 202.
    pub async fn handle_message<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
    {
        let session_id = match query_param(req.uri().query(), "sessionId") {
            Some(id) => id,
            None => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "sessionId query parameter required"}),
                )
            }
        };

        let session = match self.sessions.get(&session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                return json_response(
                    StatusCode::NOT_FOUND,
                    &json!({"error": "unknown session", "session_id": session_id}),
                )
            }
            Err(err) => {
                warn!(error = %err, "session lookup failed");
                return json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({"error": "session lookup failed"}),
                );
            }
        };

        let bytes = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "failed to read request body"}),
                )
            }
        };
        if bytes.len() > self.config.max_body_size {
            return json_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &json!({"error": "request body too large"}),
            );
        }

        let batch = match std::str::from_utf8(&bytes)
            .map_err(|_| ())
            .and_then(|s| parse_message(s).map_err(|_| ()))
        {
            Ok(batch) => batch,
            Err(()) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "invalid JSON-RPC payload"}),
                )
            }
        };

        // responses travel over the stream only; handling is detached
        // from this POST so slow handlers do not hold the 202
        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            for message in batch.into_messages() {
                let ctx = RequestContext::new(
                    Some(session.clone()),
                    None,
                    NotificationSink::Queue(session.clone()),
                );
                match message {
                    IncomingMessage::Request(request) => {
                        let reply = service.handle_request(request, ctx).await;
                        if let Ok(value) = serde_json::to_value(&reply) {
                            if session.queue().push(value).is_err() {
                                debug!(session_id = %session.id(), "stream closed before response delivery");
                            }
                        }
                    }
                    IncomingMessage::Notification(notification) => {
                        service.handle_notification(notification, ctx).await;
                    }
                    IncomingMessage::Reply(reply) => {
                        session.complete_peer_reply(reply);
                    }
                }
            }
        });

        empty_response(StatusCode::ACCEPTED)
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http_body_util::Full;
    use hyper::Method;
    use rill_json_rpc::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};
    use rill_mcp_session::{InMemorySessionStore, SessionConfig};
    use serde_json::Value;
    use std::time::Duration;

    struct PingService;

    #[async_trait]
    impl McpService for PingService {
        async fn handle_request(
            &self,
            request: JsonRpcRequest,
            _ctx: RequestContext,
        ) -> JsonRpcMessage {
            match request.method.as_str() {
                "ping" => JsonRpcMessage::success(request.id, json!({})),
                other => JsonRpcMessage::error(JsonRpcError::method_not_found(request.id, other)),
            }
        }

        async fn handle_notification(
            &self,
            _notification: JsonRpcNotification,
            _ctx: RequestContext,
        ) {
        }
    }

    fn handler() -> LegacySseHandler {
        LegacySseHandler::new(
            Arc::new(HttpServerConfig::default()),
            Arc::new(SessionManager::new(
                Arc::new(InMemorySessionStore::new()),
                SessionConfig::default(),
            )),
            Arc::new(PingService),
        )
    }

    async fn next_data_frame(body: &mut crate::body::BoxedBody) -> String {
        let frame = tokio::time::timeout(Duration::from_secs(1), body.frame())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .unwrap();
        String::from_utf8(frame.data_ref().unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_announces_endpoint_first() {
        let handler = handler();
        let response = handler.handle_sse().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let mut body = response.into_body();
        let first = next_data_frame(&mut body).await;
        assert!(first.starts_with("event: endpoint\ndata: /message?sessionId="));
    }

    #[tokio::test]
    async fn test_message_post_answers_202_and_response_arrives_on_stream() {
        let handler = handler();
        let response = handler.handle_sse().await;
        let mut body = response.into_body();

        let endpoint_frame = next_data_frame(&mut body).await;
        let session_id = endpoint_frame
            .trim()
            .rsplit("sessionId=")
            .next()
            .unwrap()
            .to_string();

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/message?sessionId={session_id}"))
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            )))
            .unwrap();
        let post_response = handler.handle_message(request).await;
        assert_eq!(post_response.status(), StatusCode::ACCEPTED);

        let reply_frame = next_data_frame(&mut body).await;
        let payload = reply_frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let reply: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn test_message_requires_session_param() {
        let handler = handler();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/message")
            .body(Full::new(Bytes::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            )))
            .unwrap();
        assert_eq!(
            handler.handle_message(request).await.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_message_with_unknown_session_is_404() {
        let handler = handler();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/message?sessionId=ghost")
            .body(Full::new(Bytes::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            )))
            .unwrap();
        assert_eq!(
            handler.handle_message(request).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_query_param_extraction() {
        assert_eq!(
            query_param(Some("sessionId=abc&x=1"), "sessionId").as_deref(),
            Some("abc")
        );
        assert_eq!(query_param(Some("x=1"), "sessionId"), None);
        assert_eq!(query_param(None, "sessionId"), None);
    }
}
