//! Argument completion (`completion/complete`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Completion results are capped at this many values.
pub const COMPLETION_MAX_VALUES: usize = 100;

/// What the completion is for: a prompt argument or a resource template
/// variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    #[serde(rename = "ref/prompt")]
    Prompt { name: String },
    #[serde(rename = "ref/resource")]
    Resource { uri: String },
}

/// The argument currently being typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: String,
}

/// Previously-resolved argument values, for context-aware completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequestParams {
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    pub argument: Argument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<CompleteContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteResult {
    pub completion: Completion,
}

impl CompleteResult {
    /// Build a result from candidate values, enforcing the 100-value cap.
    ///
    /// When values are dropped, `total` reports the pre-cap count and
    /// `has_more` is set.
    pub fn from_values(values: Vec<String>) -> Self {
        let total = values.len();
        if total > COMPLETION_MAX_VALUES {
            let mut values = values;
            values.truncate(COMPLETION_MAX_VALUES);
            Self {
                completion: Completion {
                    values,
                    total: Some(total as u64),
                    has_more: Some(true),
                },
            }
        } else {
            Self {
                completion: Completion {
                    values,
                    total: None,
                    has_more: None,
                },
            }
        }
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for CompleteResult {
    fn from(values: [S; N]) -> Self {
        Self::from_values(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_tags() {
        let prompt_ref: CompletionReference =
            serde_json::from_value(json!({"type": "ref/prompt", "name": "analyze-code"})).unwrap();
        assert_eq!(
            prompt_ref,
            CompletionReference::Prompt {
                name: "analyze-code".into()
            }
        );

        let resource_ref: CompletionReference =
            serde_json::from_value(json!({"type": "ref/resource", "uri": "res://users/{id}"}))
                .unwrap();
        assert_eq!(
            resource_ref,
            CompletionReference::Resource {
                uri: "res://users/{id}".into()
            }
        );
    }

    #[test]
    fn test_request_params_decode() {
        let params: CompleteRequestParams = serde_json::from_value(json!({
            "ref": {"type": "ref/prompt", "name": "analyze-code"},
            "argument": {"name": "language", "value": "ru"},
            "context": {"arguments": {"project": "rill"}}
        }))
        .unwrap();

        assert_eq!(params.argument.name, "language");
        assert_eq!(
            params.context.unwrap().arguments.unwrap().get("project"),
            Some(&"rill".to_string())
        );
    }

    #[test]
    fn test_value_cap() {
        let values: Vec<String> = (0..150).map(|i| format!("v{i}")).collect();
        let result = CompleteResult::from_values(values);

        assert_eq!(result.completion.values.len(), COMPLETION_MAX_VALUES);
        assert_eq!(result.completion.total, Some(150));
        assert_eq!(result.completion.has_more, Some(true));
    }

    #[test]
    fn test_no_cap_under_limit() {
        let result = CompleteResult::from(["rust", "ruby"]);
        assert_eq!(result.completion.values, vec!["rust", "ruby"]);
        assert!(result.completion.has_more.is_none());
    }
}
