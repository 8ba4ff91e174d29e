//! The polymorphic content model.
//!
//! Tool results and prompt messages carry arrays of [`Content`] values
//! discriminated by a `type` tag. Decoding must survive anything a peer
//! sends: `null` entries, unknown tags, and arrays mixing every variant.
//! Unknown and null entries are preserved opaquely so they round-trip.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who a piece of content is intended for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Client-facing display annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

/// Resource contents: text or base64 blob, union-typed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    Text {
        uri: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        text: String,
    },
    Blob {
        uri: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        blob: String,
    },
}

impl ResourceContents {
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            uri: uri.into(),
            mime_type: None,
            text: text.into(),
        }
    }

    pub fn text_with_mime(
        uri: impl Into<String>,
        text: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::Text {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            text: text.into(),
        }
    }

    pub fn blob(
        uri: impl Into<String>,
        blob: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self::Blob {
            uri: uri.into(),
            mime_type: Some(mime_type.into()),
            blob: blob.into(),
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            ResourceContents::Text { uri, .. } | ResourceContents::Blob { uri, .. } => uri,
        }
    }
}

/// The content union.
///
/// `Opaque` preserves values that are not objects with a known `type`
/// tag — unknown variants from newer protocol revisions and stray
/// `null`s both land there rather than failing the whole array.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text {
        text: String,
        annotations: Option<Annotations>,
    },
    Image {
        data: String,
        mime_type: String,
        annotations: Option<Annotations>,
    },
    Audio {
        data: String,
        mime_type: String,
        annotations: Option<Annotations>,
    },
    Resource {
        resource: ResourceContents,
        annotations: Option<Annotations>,
    },
    Opaque(Value),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            annotations: None,
        }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
            annotations: None,
        }
    }

    pub fn audio(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Audio {
            data: data.into(),
            mime_type: mime_type.into(),
            annotations: None,
        }
    }

    pub fn resource(resource: ResourceContents) -> Self {
        Self::Resource {
            resource,
            annotations: None,
        }
    }

    /// The text payload, when this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    fn type_tag(&self) -> Option<&'static str> {
        match self {
            Content::Text { .. } => Some("text"),
            Content::Image { .. } => Some("image"),
            Content::Audio { .. } => Some("audio"),
            Content::Resource { .. } => Some("resource"),
            Content::Opaque(_) => None,
        }
    }
}

impl Serialize for Content {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = match self {
            Content::Text { text, annotations } => {
                let mut obj = serde_json::json!({"type": "text", "text": text});
                if let Some(ann) = annotations {
                    obj["annotations"] = serde_json::to_value(ann).map_err(serde::ser::Error::custom)?;
                }
                obj
            }
            Content::Image {
                data,
                mime_type,
                annotations,
            }
            | Content::Audio {
                data,
                mime_type,
                annotations,
            } => {
                let mut obj = serde_json::json!({
                    "type": self.type_tag(),
                    "data": data,
                    "mimeType": mime_type,
                });
                if let Some(ann) = annotations {
                    obj["annotations"] = serde_json::to_value(ann).map_err(serde::ser::Error::custom)?;
                }
                obj
            }
            Content::Resource {
                resource,
                annotations,
            } => {
                let mut obj = serde_json::json!({
                    "type": "resource",
                    "resource": serde_json::to_value(resource).map_err(serde::ser::Error::custom)?,
                });
                if let Some(ann) = annotations {
                    obj["annotations"] = serde_json::to_value(ann).map_err(serde::ser::Error::custom)?;
                }
                obj
            }
            Content::Opaque(value) => value.clone(),
        };
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(decode_content(value))
    }
}

fn decode_content(value: Value) -> Content {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return Content::Opaque(value),
    };

    let annotations = obj
        .get("annotations")
        .and_then(|a| serde_json::from_value(a.clone()).ok());

    match obj.get("type").and_then(Value::as_str) {
        Some("text") => match obj.get("text").and_then(Value::as_str) {
            Some(text) => Content::Text {
                text: text.to_string(),
                annotations,
            },
            None => Content::Opaque(value),
        },
        Some(tag @ ("image" | "audio")) => {
            let data = obj.get("data").and_then(Value::as_str);
            let mime_type = obj.get("mimeType").and_then(Value::as_str);
            match (data, mime_type) {
                (Some(data), Some(mime_type)) if tag == "image" => Content::Image {
                    data: data.to_string(),
                    mime_type: mime_type.to_string(),
                    annotations,
                },
                (Some(data), Some(mime_type)) => Content::Audio {
                    data: data.to_string(),
                    mime_type: mime_type.to_string(),
                    annotations,
                },
                _ => Content::Opaque(value),
            }
        }
        Some("resource") => match obj
            .get("resource")
            .and_then(|r| serde_json::from_value::<ResourceContents>(r.clone()).ok())
        {
            Some(resource) => Content::Resource {
                resource,
                annotations,
            },
            None => Content::Opaque(value),
        },
        _ => Content::Opaque(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_roundtrip() {
        let content = Content::text("Hello, world!");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json, json!({"type": "text", "text": "Hello, world!"}));

        let decoded: Content = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_image_roundtrip() {
        let content = Content::image("aGVsbG8=", "image/png");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["mimeType"], "image/png");

        let decoded: Content = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_embedded_resource_roundtrip() {
        let content = Content::resource(ResourceContents::text_with_mime(
            "file:///a.txt",
            "hello",
            "text/plain",
        ));
        let json = serde_json::to_value(&content).unwrap();
        let decoded: Content = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_mixed_array_with_null_and_unknown() {
        let raw = json!([
            {"type": "text", "text": "a"},
            null,
            {"type": "image", "data": "xx", "mimeType": "image/png"},
            {"type": "video", "url": "https://example.com/v.mp4"},
            {"type": "audio", "data": "yy", "mimeType": "audio/wav"}
        ]);

        let contents: Vec<Content> = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(contents.len(), 5);
        assert!(matches!(contents[0], Content::Text { .. }));
        assert!(matches!(contents[1], Content::Opaque(Value::Null)));
        assert!(matches!(contents[2], Content::Image { .. }));
        assert!(matches!(contents[3], Content::Opaque(_)));
        assert!(matches!(contents[4], Content::Audio { .. }));

        // unknown entries round-trip untouched
        let reencoded = serde_json::to_value(&contents).unwrap();
        assert_eq!(reencoded[3], raw[3]);
        assert_eq!(reencoded[1], Value::Null);
    }

    #[test]
    fn test_malformed_known_type_stays_opaque() {
        // an image without mimeType is not a valid image, but must not fail
        let raw = json!({"type": "image", "data": "xx"});
        let decoded: Content = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(decoded, Content::Opaque(raw));
    }

    #[test]
    fn test_blob_resource_contents() {
        let rc = ResourceContents::blob("file:///b.bin", "AAAA", "application/octet-stream");
        let json = serde_json::to_value(&rc).unwrap();
        assert_eq!(json["blob"], "AAAA");
        let decoded: ResourceContents = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, rc);
    }
}
