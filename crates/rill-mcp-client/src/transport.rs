//! The Streamable HTTP client transport.
//!
//! Requests go out as POSTs; the server answers with plain JSON or an
//! SSE stream whose final event is the response. Either way the caller
//! gets one [`rill_json_rpc::JsonRpcMessage`]; notifications arriving on
//! a stream are forwarded to the registered handler.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use rill_json_rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId, RequestParams};
use rill_mcp_oauth::OAuthError;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::TimeoutConfig;
use crate::error::{ClientError, Result};

/// Session id header (mirrors the server side).
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// A message read off an SSE response body.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Reply(JsonRpcMessage),
    Notification(Value),
}

type NotificationHandler = Box<dyn Fn(Value) + Send + Sync>;

/// The transport: one endpoint, one tracked session.
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
    session_id: RwLock<Option<String>>,
    next_id: AtomicI64,
    on_notification: Mutex<Option<NotificationHandler>>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeouts: &TimeoutConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            session_id: RwLock::new(None),
            next_id: AtomicI64::new(0),
            on_notification: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The session id issued by the server, once known.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().expect("session lock poisoned").clone()
    }

    /// Register a callback for notifications received on SSE responses.
    pub fn on_notification(&self, handler: NotificationHandler) {
        *self
            .on_notification
            .lock()
            .expect("handler lock poisoned") = Some(handler);
    }

    pub fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn request_headers(&self, bearer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        if let Some(session_id) = self.session_id() {
            if let Ok(value) = HeaderValue::from_str(&session_id) {
                headers.insert(SESSION_ID_HEADER, value);
            }
        }
        if let Some(token) = bearer {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    /// Send one request and await its response (JSON or SSE-terminal).
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        bearer: Option<&str>,
    ) -> Result<Value> {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(RequestParams::from(params));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.request_headers(bearer))
            .json(&request)
            .send()
            .await?;

        self.capture_session_id(response.headers());
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(unauthorized_error(&response).await);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        let reply = if is_event_stream {
            // the POST SSE stream ends after its terminal response event
            let body = response.text().await?;
            self.consume_sse_body(&body, &id)?
        } else {
            let value: Value = response.json().await?;
            serde_json::from_value::<JsonRpcMessage>(value)
                .map_err(|err| ClientError::Protocol(format!("malformed response: {err}")))?
        };

        match reply {
            JsonRpcMessage::Response(response) => {
                if response.id != id {
                    return Err(ClientError::Protocol(format!(
                        "response id {} does not match request id {id}",
                        response.id
                    )));
                }
                Ok(response.result)
            }
            JsonRpcMessage::Error(error) => Err(ClientError::Rpc(error)),
        }
    }

    /// Send a notification; no response is expected.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
        bearer: Option<&str>,
    ) -> Result<()> {
        let mut notification = JsonRpcNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(RequestParams::from(params));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .headers(self.request_headers(bearer))
            .json(&notification)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(unauthorized_error(&response).await);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Open the long-lived GET SSE channel and pump it until the server
    /// closes the stream or the task is dropped.
    ///
    /// Notifications go to the registered handler. Server-initiated
    /// requests are handed to `on_request`, whose reply envelope is
    /// POSTed back over the normal endpoint.
    pub async fn listen(
        &self,
        bearer: Option<&str>,
        on_request: impl Fn(JsonRpcRequest) -> JsonRpcMessage + Send + Sync,
    ) -> Result<()> {
        use futures::StreamExt;

        let mut headers = self.request_headers(bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let response = self
            .http
            .get(&self.endpoint)
            .headers(headers)
            // the channel is long-lived; only connection setup is bounded
            .timeout(std::time::Duration::from_secs(u64::MAX >> 2))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(unauthorized_error(&response).await);
        }
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: "event stream rejected".to_string(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| ClientError::Transport(err.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // frames are \n\n-delimited; keep the trailing partial
            while let Some(boundary) = buffer.find("\n\n") {
                let frame = buffer[..boundary].to_string();
                buffer.drain(..boundary + 2);

                for payload in parse_sse_payloads(&frame) {
                    self.handle_stream_payload(payload, bearer, &on_request)
                        .await;
                }
            }
        }
        debug!("event stream closed by server");
        Ok(())
    }

    async fn handle_stream_payload(
        &self,
        payload: Value,
        bearer: Option<&str>,
        on_request: &(impl Fn(JsonRpcRequest) -> JsonRpcMessage + Send + Sync),
    ) {
        // a server-initiated request carries both method and id
        let is_request = payload.get("method").is_some() && payload.get("id").is_some();
        if is_request {
            match serde_json::from_value::<JsonRpcRequest>(payload) {
                Ok(request) => {
                    let reply = on_request(request);
                    // post the reply back; the server resolves its waiter
                    let result = self
                        .http
                        .post(&self.endpoint)
                        .headers(self.request_headers(bearer))
                        .json(&reply)
                        .send()
                        .await;
                    if let Err(err) = result {
                        warn!(error = %err, "failed to post back peer reply");
                    }
                }
                Err(err) => warn!(error = %err, "malformed server-initiated request"),
            }
        } else {
            self.dispatch_notification(payload);
        }
    }

    /// Terminate the server-side session.
    pub async fn delete_session(&self, bearer: Option<&str>) -> Result<()> {
        if self.session_id().is_none() {
            return Ok(());
        }

        let response = self
            .http
            .delete(&self.endpoint)
            .headers(self.request_headers(bearer))
            .send()
            .await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "session delete rejected");
        }

        *self.session_id.write().expect("session lock poisoned") = None;
        Ok(())
    }

    fn capture_session_id(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(session_id) = headers
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            let mut slot = self.session_id.write().expect("session lock poisoned");
            if slot.as_deref() != Some(session_id) {
                debug!(session_id, "session established");
                *slot = Some(session_id.to_string());
            }
        }
    }

    /// Walk a complete SSE body: forward notification events, return
    /// the terminal response.
    fn consume_sse_body(&self, body: &str, request_id: &RequestId) -> Result<JsonRpcMessage> {
        let mut reply = None;
        for message in parse_sse_payloads(body) {
            match classify(message, request_id) {
                ServerMessage::Reply(envelope) => reply = Some(envelope),
                ServerMessage::Notification(value) => self.dispatch_notification(value),
            }
        }
        reply.ok_or_else(|| {
            ClientError::Protocol("event stream closed without a response".to_string())
        })
    }

    fn dispatch_notification(&self, value: Value) {
        let handler = self.on_notification.lock().expect("handler lock poisoned");
        match handler.as_ref() {
            Some(handler) => handler(value),
            None => debug!(
                method = value.get("method").and_then(serde_json::Value::as_str).unwrap_or(""),
                "dropping unhandled notification"
            ),
        }
    }
}

/// Extract the `data:` payloads from an SSE document.
pub fn parse_sse_payloads(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .flat_map(|frame| frame.lines())
        .filter_map(|line| line.strip_prefix("data: "))
        .filter_map(|payload| serde_json::from_str(payload).ok())
        .collect()
}

/// Sort a decoded SSE payload into reply vs notification.
fn classify(value: Value, request_id: &RequestId) -> ServerMessage {
    let is_reply = value.get("method").is_none()
        && (value.get("result").is_some() || value.get("error").is_some());
    if is_reply {
        if let Ok(envelope) = serde_json::from_value::<JsonRpcMessage>(value.clone()) {
            if envelope.id() == Some(request_id) {
                return ServerMessage::Reply(envelope);
            }
        }
    }
    ServerMessage::Notification(value)
}

/// Build the typed error for a 401/403, carrying the
/// `resource_metadata` challenge parameter when present.
async fn unauthorized_error(response: &reqwest::Response) -> ClientError {
    let resource_metadata = response
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_resource_metadata);

    ClientError::Unauthorized {
        error: OAuthError::invalid_token("request rejected by resource server"),
        resource_metadata,
    }
}

/// Pull `resource_metadata="..."` out of a `WWW-Authenticate` value.
fn extract_resource_metadata(challenge: &str) -> Option<String> {
    let start = challenge.find("resource_metadata=\"")? + "resource_metadata=\"".len();
    let rest = &challenge[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
