//! The Streamable HTTP endpoint: POST (JSON or SSE), GET SSE, DELETE.

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{ACCEPT, AUTHORIZATION};
use hyper::{HeaderMap, Method, Request, StatusCode};
use rill_json_rpc::{parse_message, IncomingMessage, JsonRpcError, JsonRpcMessage};
use rill_mcp_oauth::{BearerPolicy, BearerRejection};
use rill_mcp_protocol::methods;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::body::{empty_response, json_response, sse_response, HttpResponse};
use crate::config::HttpServerConfig;
use crate::context::{NotificationSink, RequestContext};
use crate::service::McpService;
use crate::sse::SseFrame;
use crate::{LAST_EVENT_ID_HEADER, SESSION_ID_HEADER};
use rill_mcp_oauth::AuthInfo;
use rill_mcp_session::{SessionHandle, SessionManager};

/// Handles every request that reaches the Streamable HTTP path.
#[derive(Clone)]
pub struct StreamableHttpHandler {
    config: Arc<HttpServerConfig>,
    sessions: Arc<SessionManager>,
    service: Arc<dyn McpService>,
    bearer: Option<Arc<BearerPolicy>>,
}

impl StreamableHttpHandler {
    pub fn new(
        config: Arc<HttpServerConfig>,
        sessions: Arc<SessionManager>,
        service: Arc<dyn McpService>,
        bearer: Option<Arc<BearerPolicy>>,
    ) -> Self {
        Self {
            config,
            sessions,
            service,
            bearer,
        }
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Route one request by HTTP method.
    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
    {
        match req.method().clone() {
            Method::POST => self.handle_post(req).await,
            Method::GET => self.handle_get(req).await,
            Method::DELETE => self.handle_delete(req).await,
            _ => json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({"error": "method not allowed"}),
            ),
        }
    }

    /// Bearer check shared by all verbs; `Ok(None)` when auth is off.
    async fn authorize(&self, headers: &HeaderMap) -> Result<Option<AuthInfo>, HttpResponse> {
        let policy = match &self.bearer {
            Some(policy) => policy,
            None => return Ok(None),
        };

        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        match policy.authorize(header).await {
            Ok(info) => Ok(Some(info)),
            Err(rejection) => Err(rejection_response(rejection)),
        }
    }

    async fn handle_post<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
    {
        let (parts, body) = req.into_parts();

        let auth = match self.authorize(&parts.headers).await {
            Ok(auth) => auth,
            Err(response) => return response,
        };

        let wants_sse = accepts_event_stream(&parts.headers);
        let session_header = header_string(&parts.headers, SESSION_ID_HEADER);

        let bytes = match body.collect().await {
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
        let body_str = match std::str::from_utf8(&bytes) {
            Ok(s) => s,
            Err(_) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "request body must be valid UTF-8"}),
                )
            }
        };

        let batch = match parse_message(body_str) {
            Ok(batch) => batch,
            Err(rpc_error) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &serde_json::to_value(&rpc_error).unwrap_or(Value::Null),
                )
            }
        };
        let is_batch = batch.is_batch();
        let messages = batch.into_messages();

        // session resolution per spec: an absent id is only legal for
        // initialize (or in stateless mode, where ids are never issued)
        let contains_initialize = messages
            .iter()
            .any(|m| m.method() == Some(methods::INITIALIZE));

        let session = match &session_header {
            Some(id) => match self.sessions.get(id).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    return json_response(
                        StatusCode::NOT_FOUND,
                        &json!({"error": "unknown session", "session_id": id}),
                    )
                }
                Err(err) => {
                    warn!(error = %err, "session lookup failed");
                    return json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &json!({"error": "session lookup failed"}),
                    );
                }
            },
            None if self.sessions.is_stateless() || contains_initialize => {
                match self.sessions.create().await {
                    Ok(session) => session,
                    Err(err) => {
                        warn!(error = %err, "session creation failed");
                        return json_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            &json!({"error": "session creation failed"}),
                        );
                    }
                }
            }
            None => {
                let error = JsonRpcError::invalid_request(None);
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &serde_json::to_value(&error).unwrap_or(Value::Null),
                );
            }
        };

        // POST SSE applies to the single-request case
        let single_request = !is_batch
            && messages.len() == 1
            && matches!(messages[0], IncomingMessage::Request(_));
        if wants_sse && self.config.enable_post_sse && single_request {
            let request = match messages.into_iter().next() {
                Some(IncomingMessage::Request(request)) => request,
                _ => unreachable!("single_request checked above"),
            };
            return self.post_sse_response(request, session, auth).await;
        }

        self.post_json_response(messages, session, auth, contains_initialize, is_batch)
            .await
    }

    /// Plain JSON POST: run every message, answer with one envelope, an
    /// array for batches, or 202 when nothing produced a response.
    async fn post_json_response(
        &self,
        messages: Vec<IncomingMessage>,
        session: SessionHandle,
        auth: Option<AuthInfo>,
        contains_initialize: bool,
        is_batch: bool,
    ) -> HttpResponse {
        let mut responses: Vec<Value> = Vec::new();

        for message in messages {
            match message {
                IncomingMessage::Request(request) => {
                    let ctx = RequestContext::new(
                        Some(session.clone()),
                        auth.clone(),
                        NotificationSink::Queue(session.clone()),
                    );
                    let reply = self.service.handle_request(request, ctx).await;
                    responses.push(serde_json::to_value(&reply).unwrap_or(Value::Null));
                }
                IncomingMessage::Notification(notification) => {
                    let ctx = RequestContext::new(
                        Some(session.clone()),
                        auth.clone(),
                        NotificationSink::Queue(session.clone()),
                    );
                    self.service.handle_notification(notification, ctx).await;
                }
                IncomingMessage::Reply(reply) => {
                    if !session.complete_peer_reply(reply) {
                        debug!(session_id = %session.id(), "reply had no pending waiter");
                    }
                }
            }
        }

        if contains_initialize {
            self.sessions.mark_initialized(session.id()).await;
        }

        let mut response = if responses.is_empty() {
            empty_response(StatusCode::ACCEPTED)
        } else if is_batch {
            json_response(StatusCode::OK, &Value::Array(responses))
        } else {
            json_response(StatusCode::OK, &responses[0])
        };

        self.attach_session_header(&mut response, &session);
        response
    }

    /// POST answered as an SSE stream: handler notifications first, the
    /// final response as the terminal event, then close.
    async fn post_sse_response(
        &self,
        request: rill_json_rpc::JsonRpcRequest,
        session: SessionHandle,
        auth: Option<AuthInfo>,
    ) -> HttpResponse {
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let ctx = RequestContext::new(
            Some(session.clone()),
            auth,
            NotificationSink::Stream(tx.clone()),
        );

        let service = Arc::clone(&self.service);
        let sessions = Arc::clone(&self.sessions);
        let is_initialize = request.method == methods::INITIALIZE;
        let session_id = session.id().to_string();
        tokio::spawn(async move {
            let reply = service.handle_request(request, ctx).await;
            if is_initialize && !reply.is_error() {
                sessions.mark_initialized(&session_id).await;
            }
            // the final response closes the stream; tx drops afterwards
            let _ = tx.send(serde_json::to_value(&reply).unwrap_or(Value::Null));
        });

        use futures::StreamExt;
        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx)
            .enumerate()
            .map(|(index, value)| SseFrame::event(index as u64 + 1, value).format());

        let mut response = sse_response(stream);
        self.attach_session_header(&mut response, &session);
        response
    }

    /// GET: the long-lived server→client SSE channel.
    async fn handle_get<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: http_body::Body + Send + 'static,
    {
        let headers = req.headers();

        if let Err(response) = self.authorize(headers).await {
            return response;
        }
        if !self.config.enable_get_sse {
            return json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({"error": "event streams are disabled"}),
            );
        }

        let session_id = match header_string(headers, SESSION_ID_HEADER) {
            Some(id) => id,
            None => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "Mcp-Session-Id header required"}),
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

        let last_event_id = header_string(headers, LAST_EVENT_ID_HEADER)
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);

        debug!(session_id = %session.id(), last_event_id, "opening event stream");

        let keepalive = self.config.keepalive_interval;
        let stream_session = session.clone();
        let stream = async_stream::stream! {
            let session = stream_session;
            // an immediate keep-alive confirms the channel is live
            yield SseFrame::KeepAlive.format();

            for replayed in session.replay_after(last_event_id) {
                yield SseFrame::event(replayed.event_id, replayed.message).format();
            }

            let mut ticker = tokio::time::interval(keepalive);
            ticker.tick().await; // the first tick fires immediately
            loop {
                tokio::select! {
                    message = session.queue().pop() => {
                        match message {
                            Some(queued) => {
                                yield SseFrame::event(queued.event_id, queued.message).format();
                            }
                            // session terminated; end the stream
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        yield SseFrame::KeepAlive.format();
                    }
                }
            }
        };

        let mut response = sse_response(stream);
        self.attach_session_header(&mut response, &session);
        response
    }

    /// DELETE: terminate the session. Idempotent — 200 either way.
    async fn handle_delete<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: http_body::Body + Send + 'static,
    {
        let headers = req.headers();
        if let Err(response) = self.authorize(headers).await {
            return response;
        }

        let session_id = match header_string(headers, SESSION_ID_HEADER) {
            Some(id) => id,
            None => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "Mcp-Session-Id header required"}),
                )
            }
        };

        match self.sessions.terminate(&session_id).await {
            Ok(existed) => {
                debug!(session_id = %session_id, existed, "session delete");
                json_response(
                    StatusCode::OK,
                    &json!({"status": "session_terminated", "session_id": session_id}),
                )
            }
            Err(err) => {
                warn!(error = %err, "session termination failed");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({"error": "session termination failed"}),
                )
            }
        }
    }

    /// Echo the session id on responses — never for transient sessions,
    /// whose ids must not leak to the client.
    fn attach_session_header(&self, response: &mut HttpResponse, session: &SessionHandle) {
        if session.is_transient() {
            return;
        }
        if let Ok(value) = session.id().parse() {
            response.headers_mut().insert(SESSION_ID_HEADER, value);
        }
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|accept| accept.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Map a bearer rejection onto an HTTP response with the
/// `WWW-Authenticate` challenge and the OAuth error body.
fn rejection_response(rejection: BearerRejection) -> HttpResponse {
    let status = StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::UNAUTHORIZED);
    let mut response = json_response(
        status,
        &serde_json::to_value(&rejection.body).unwrap_or(Value::Null),
    );
    if let Some(challenge) = rejection.www_authenticate {
        if let Ok(value) = challenge.parse() {
            response
                .headers_mut()
                .insert(hyper::header::WWW_AUTHENTICATE, value);
        }
    }
    response
}
