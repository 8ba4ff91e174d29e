use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::RequestParams;
use crate::types::JsonRpcVersion;

/// A JSON-RPC notification (a request with no id; never answered)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: impl Into<RequestParams>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Decode the params into a typed struct, treating absent params as
    /// an empty object.
    pub fn params_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let value = self
            .params
            .as_ref()
            .map(RequestParams::to_value)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_has_no_id() {
        let notification = JsonRpcNotification::new("notifications/initialized");
        let json = serde_json::to_value(&notification).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["method"], "notifications/initialized");
    }

    #[test]
    fn test_notification_with_params() {
        let notification = JsonRpcNotification::new("notifications/progress")
            .with_params(RequestParams::from(json!({"progress": 0.5, "progressToken": "t1"})));

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["params"]["progress"], 0.5);
    }
}
