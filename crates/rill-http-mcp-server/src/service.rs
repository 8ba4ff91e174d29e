//! The seam between the transport and the MCP dispatch layer.

use async_trait::async_trait;
use rill_json_rpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

use crate::context::RequestContext;

/// What the transport needs from the layer above: handle one request or
/// one notification against a prepared context. Implemented by the
/// server crate's dispatcher; the transport owns everything below
/// (sessions, auth, streaming).
#[async_trait]
pub trait McpService: Send + Sync {
    /// Handle a request. Always yields an envelope — errors included —
    /// never a transport failure.
    async fn handle_request(&self, request: JsonRpcRequest, ctx: RequestContext) -> JsonRpcMessage;

    /// Handle a notification. Notifications never produce responses.
    async fn handle_notification(&self, notification: JsonRpcNotification, ctx: RequestContext);
}
