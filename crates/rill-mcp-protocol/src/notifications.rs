//! Server→client notification param shapes and constructors.
//!
//! Notification envelopes are built here so every producer emits the
//! same wire shape; the session fabric only moves them.

use rill_json_rpc::{JsonRpcNotification, RequestId, RequestParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logging::{LoggingLevel, LoggingMessageParams};
use crate::methods;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressParams {
    #[serde(rename = "progressToken")]
    pub progress_token: Value,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledParams {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn notification_with<T: Serialize>(method: &str, params: &T) -> JsonRpcNotification {
    // serializing our own param structs cannot fail
    let value = serde_json::to_value(params).unwrap_or(Value::Null);
    JsonRpcNotification::new(method).with_params(RequestParams::from(value))
}

pub fn progress(token: Value, progress: f64, message: Option<String>) -> JsonRpcNotification {
    notification_with(
        methods::NOTIFICATION_PROGRESS,
        &ProgressParams {
            progress_token: token,
            progress,
            total: None,
            message,
        },
    )
}

pub fn log_message(level: LoggingLevel, data: Value) -> JsonRpcNotification {
    notification_with(
        methods::NOTIFICATION_MESSAGE,
        &LoggingMessageParams {
            level,
            logger: None,
            data,
        },
    )
}

pub fn resource_updated(uri: impl Into<String>) -> JsonRpcNotification {
    notification_with(
        methods::NOTIFICATION_RESOURCE_UPDATED,
        &ResourceUpdatedParams { uri: uri.into() },
    )
}

pub fn tools_list_changed() -> JsonRpcNotification {
    JsonRpcNotification::new(methods::NOTIFICATION_TOOLS_LIST_CHANGED)
}

pub fn resources_list_changed() -> JsonRpcNotification {
    JsonRpcNotification::new(methods::NOTIFICATION_RESOURCES_LIST_CHANGED)
}

pub fn prompts_list_changed() -> JsonRpcNotification {
    JsonRpcNotification::new(methods::NOTIFICATION_PROMPTS_LIST_CHANGED)
}
