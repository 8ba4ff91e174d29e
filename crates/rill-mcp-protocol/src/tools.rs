//! Tool descriptors and the `tools/*` request shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::Content;
use crate::cursor::Cursor;
use crate::schema::JsonSchema;

/// Behavioral hints attached to a tool descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(rename = "idempotentHint", skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    #[serde(rename = "openWorldHint", skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// A tool descriptor. Names are unique within a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonSchema,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    pub fn new(name: impl Into<String>, input_schema: JsonSchema) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            output_schema: None,
            annotations: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_output_schema(mut self, schema: JsonSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsRequestParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequestParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of a tool call.
///
/// `is_error: true` marks an application-level failure inside a
/// successful call; it must never be upgraded to a JSON-RPC error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            structured_content: None,
            is_error: None,
        }
    }

    pub fn from_content(content: Vec<Content>) -> Self {
        Self {
            content,
            structured_content: None,
            is_error: None,
        }
    }

    /// Build a structured result. A JSON-stringified text fallback is
    /// placed in `content[0]` so clients that predate
    /// `structuredContent` still see the payload.
    pub fn from_structured(value: Value) -> Self {
        let fallback = serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());
        Self {
            content: vec![Content::text(fallback)],
            structured_content: Some(value),
            is_error: None,
        }
    }

    /// An application-level failure (NOT a protocol error).
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            structured_content: None,
            is_error: Some(true),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_serialization() {
        let tool = Tool::new("greet", JsonSchema::object())
            .with_description("Say hello")
            .with_annotations(ToolAnnotations {
                title: Some("Greeter".into()),
                read_only_hint: Some(true),
                ..Default::default()
            });

        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["name"], "greet");
        assert_eq!(json["inputSchema"]["type"], "object");
        assert_eq!(json["annotations"]["readOnlyHint"], true);
        assert!(json.get("outputSchema").is_none());
    }

    #[test]
    fn test_structured_result_populates_text_fallback() {
        let result = CallToolResult::from_structured(json!({"sum": 3}));
        assert_eq!(result.structured_content, Some(json!({"sum": 3})));
        assert_eq!(result.content[0].as_text(), Some(r#"{"sum":3}"#));
    }

    #[test]
    fn test_error_result_is_not_protocol_error() {
        let result = CallToolResult::error("division by zero");
        assert!(result.is_error());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["content"][0]["text"], "division by zero");
    }

    #[test]
    fn test_call_params_decode() {
        let params: CallToolRequestParams = serde_json::from_value(json!({
            "name": "greet",
            "arguments": {"name": "world"}
        }))
        .unwrap();
        assert_eq!(params.name, "greet");
        assert_eq!(params.arguments.unwrap()["name"], "world");
    }
}
