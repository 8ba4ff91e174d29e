//! The request-scoped context handed to method handlers.
//!
//! One opaque value with typed accessors: the session handle, the
//! verified auth identity, a trace id, and the notification sink for
//! whatever response mode the transport chose. Handlers never see
//! transport details.

use rill_json_rpc::JsonRpcNotification;
use rill_mcp_oauth::AuthInfo;
use rill_mcp_protocol::{notifications, LoggingLevel, McpError};
use rill_mcp_session::SessionHandle;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Where notifications emitted during a request go.
///
/// - `Queue`: into the session's queue, delivered over the GET SSE
///   channel (or dropped-oldest if nobody consumes).
/// - `Stream`: into the open POST SSE response, ahead of the final
///   result.
/// - `Discard`: no delivery path (plain JSON POST without a session).
#[derive(Clone)]
pub enum NotificationSink {
    Queue(SessionHandle),
    Stream(mpsc::UnboundedSender<Value>),
    Discard,
}

impl NotificationSink {
    /// Deliver one notification. Returns whether a consumer could still
    /// receive it; a drop-oldest displacement counts as delivered.
    pub fn send(&self, notification: &JsonRpcNotification) -> bool {
        match self {
            NotificationSink::Queue(session) => session.notify(notification).is_ok(),
            NotificationSink::Stream(tx) => match serde_json::to_value(notification) {
                Ok(value) => tx.send(value).is_ok(),
                Err(_) => false,
            },
            NotificationSink::Discard => false,
        }
    }
}

/// Request context: first argument of every handler.
#[derive(Clone)]
pub struct RequestContext {
    session: Option<SessionHandle>,
    auth: Option<AuthInfo>,
    sink: NotificationSink,
    trace_id: String,
}

impl RequestContext {
    pub fn new(
        session: Option<SessionHandle>,
        auth: Option<AuthInfo>,
        sink: NotificationSink,
    ) -> Self {
        Self {
            session,
            auth,
            sink,
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// A context with no session, no auth, and no delivery path.
    pub fn detached() -> Self {
        Self::new(None, None, NotificationSink::Discard)
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id())
    }

    /// The verified bearer identity, when auth is enabled. The raw
    /// token has been cleared.
    pub fn auth(&self) -> Option<&AuthInfo> {
        self.auth.as_ref()
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn sink(&self) -> &NotificationSink {
        &self.sink
    }

    /// Emit a progress notification.
    pub fn send_progress(&self, token: Value, progress: f64, message: Option<String>) {
        self.emit(notifications::progress(token, progress, message));
    }

    /// Emit a `notifications/message` log push.
    pub fn send_log_message(&self, level: LoggingLevel, data: Value) {
        self.emit(notifications::log_message(level, data));
    }

    pub fn send_resource_updated(&self, uri: impl Into<String>) {
        self.emit(notifications::resource_updated(uri));
    }

    pub fn send_tool_list_changed(&self) {
        self.emit(notifications::tools_list_changed());
    }

    pub fn send_prompt_list_changed(&self) {
        self.emit(notifications::prompts_list_changed());
    }

    pub fn send_resource_list_changed(&self) {
        self.emit(notifications::resources_list_changed());
    }

    fn emit(&self, notification: JsonRpcNotification) {
        if !self.sink.send(&notification) {
            debug!(
                trace_id = %self.trace_id,
                method = %notification.method,
                "notification had no delivery path"
            );
        }
    }

    /// Issue a server→client request and await the posted-back reply.
    pub async fn call_peer(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        match &self.session {
            Some(session) => session.call_peer(method, params).await,
            None => Err(McpError::InvalidRequest(
                "server-initiated requests require a session".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_sink_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = RequestContext::new(None, None, NotificationSink::Stream(tx));

        ctx.send_progress(json!("t"), 0.5, None);
        ctx.send_log_message(LoggingLevel::Info, json!("x"));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first["method"], "notifications/progress");
        assert_eq!(second["method"], "notifications/message");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_discard_sink() {
        let ctx = RequestContext::detached();
        // nothing to assert beyond "does not panic"
        ctx.send_tool_list_changed();
        assert!(ctx.session().is_none());
        assert!(ctx.auth().is_none());
    }

    #[tokio::test]
    async fn test_call_peer_without_session_rejected() {
        let ctx = RequestContext::detached();
        let err = ctx.call_peer("roots/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }

    #[test]
    fn test_trace_ids_are_unique() {
        let a = RequestContext::detached();
        let b = RequestContext::detached();
        assert_ne!(a.trace_id(), b.trace_id());
    }
}
