//! OpenAPI-3 object schema generation.
//!
//! [`JsonSchema`] is the builder-style value type used for tool input and
//! output schemas. [`SchemaGenerator`] turns record descriptions
//! (types implementing [`SchemaProvider`]) into schemas in one of two
//! modes:
//!
//! - **inline**: nested records are expanded in place up to a bounded
//!   depth (default 6); recursion past the bound degrades to a bare
//!   object schema instead of looping.
//! - **ref**: every distinct record lands in a `$defs` table keyed by its
//!   qualified name and is referenced as `#/$defs/<name>`. A placeholder
//!   is inserted before recursing, so cyclic type graphs terminate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A JSON Schema value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonSchema {
    /// `{"$ref": "#/$defs/..."}`
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Typed(Box<TypedSchema>),
}

/// The non-reference schema shapes, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypedSchema {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
        min_length: Option<u64>,
        #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
        max_length: Option<u64>,
        #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
        enum_values: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        example: Option<Value>,
    },
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    Array {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        items: Option<Box<JsonSchema>>,
        #[serde(rename = "minItems", skip_serializing_if = "Option::is_none")]
        min_items: Option<u64>,
        #[serde(rename = "maxItems", skip_serializing_if = "Option::is_none")]
        max_items: Option<u64>,
        #[serde(rename = "uniqueItems", skip_serializing_if = "Option::is_none")]
        unique_items: Option<bool>,
    },
    Object {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        properties: Option<BTreeMap<String, JsonSchema>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        required: Option<Vec<String>>,
        #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
        additional_properties: Option<bool>,
        #[serde(rename = "$defs", skip_serializing_if = "Option::is_none")]
        defs: Option<BTreeMap<String, JsonSchema>>,
    },
}

impl JsonSchema {
    pub fn string() -> Self {
        JsonSchema::Typed(Box::new(TypedSchema::String {
            description: None,
            format: None,
            pattern: None,
            min_length: None,
            max_length: None,
            enum_values: None,
            default: None,
            example: None,
        }))
    }

    pub fn string_enum(values: Vec<String>) -> Self {
        match JsonSchema::string() {
            JsonSchema::Typed(mut typed) => {
                if let TypedSchema::String { enum_values, .. } = typed.as_mut() {
                    *enum_values = Some(values);
                }
                JsonSchema::Typed(typed)
            }
            other => other,
        }
    }

    pub fn number() -> Self {
        JsonSchema::Typed(Box::new(TypedSchema::Number {
            description: None,
            minimum: None,
            maximum: None,
            default: None,
        }))
    }

    pub fn integer() -> Self {
        JsonSchema::Typed(Box::new(TypedSchema::Integer {
            description: None,
            minimum: None,
            maximum: None,
            default: None,
        }))
    }

    pub fn boolean() -> Self {
        JsonSchema::Typed(Box::new(TypedSchema::Boolean {
            description: None,
            default: None,
        }))
    }

    pub fn array(items: JsonSchema) -> Self {
        JsonSchema::Typed(Box::new(TypedSchema::Array {
            description: None,
            items: Some(Box::new(items)),
            min_items: None,
            max_items: None,
            unique_items: None,
        }))
    }

    pub fn object() -> Self {
        JsonSchema::Typed(Box::new(TypedSchema::Object {
            description: None,
            properties: None,
            required: None,
            additional_properties: None,
            defs: None,
        }))
    }

    pub fn object_with(properties: BTreeMap<String, JsonSchema>, required: Vec<String>) -> Self {
        JsonSchema::Typed(Box::new(TypedSchema::Object {
            description: None,
            properties: Some(properties),
            required: (!required.is_empty()).then_some(required),
            additional_properties: None,
            defs: None,
        }))
    }

    pub fn reference(name: &str) -> Self {
        JsonSchema::Ref {
            reference: format!("#/$defs/{name}"),
        }
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        if let JsonSchema::Typed(typed) = &mut self {
            let d = match typed.as_mut() {
                TypedSchema::String { description, .. }
                | TypedSchema::Number { description, .. }
                | TypedSchema::Integer { description, .. }
                | TypedSchema::Boolean { description, .. }
                | TypedSchema::Array { description, .. }
                | TypedSchema::Object { description, .. } => description,
            };
            *d = Some(text.into());
        }
        self
    }
}

/// The primitive shape of a record field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<FieldKind>),
    /// A nested record. Function pointers (not generics) so cyclic type
    /// graphs are representable.
    Record {
        name: fn() -> String,
        fields: fn() -> Vec<FieldSchema>,
    },
}

impl FieldKind {
    pub fn record<T: SchemaProvider>() -> Self {
        FieldKind::Record {
            name: T::schema_name,
            fields: T::schema_fields,
        }
    }
}

/// One field of a record description: the tag metadata of spec-level
/// schema generation, as a builder.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Required iff not optional and not overridden.
    pub required: bool,
    pub description: Option<&'static str>,
    pub format: Option<&'static str>,
    pub pattern: Option<&'static str>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    pub default: Option<Value>,
    pub example: Option<Value>,
    pub enum_values: Vec<String>,
}

impl FieldSchema {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            description: None,
            format: None,
            pattern: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            default: None,
            example: None,
            enum_values: Vec::new(),
        }
    }

    /// Mark the field optional (the `Option<T>` / `omitempty` case).
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Force required despite optionality markers.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description(mut self, text: &'static str) -> Self {
        self.description = Some(text);
        self
    }

    pub fn format(mut self, format: &'static str) -> Self {
        self.format = Some(format);
        self
    }

    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn length(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.minimum = min;
        self.maximum = max;
        self
    }

    pub fn items(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_items = min;
        self.max_items = max;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique_items = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn example(mut self, value: Value) -> Self {
        self.example = Some(value);
        self
    }

    pub fn enum_value(mut self, value: impl Into<String>) -> Self {
        self.enum_values.push(value.into());
        self
    }
}

/// A record type that can describe itself for schema generation.
pub trait SchemaProvider {
    /// Qualified name used as the `$defs` key, e.g. `"billing.Invoice"`.
    fn schema_name() -> String;
    fn schema_fields() -> Vec<FieldSchema>;
}

/// Generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// Bounded in-place expansion of nested records.
    Inline { max_depth: usize },
    /// `$defs` table with `$ref` for nested and recursive records.
    Ref,
}

impl Default for SchemaMode {
    fn default() -> Self {
        SchemaMode::Inline {
            max_depth: SchemaGenerator::DEFAULT_INLINE_DEPTH,
        }
    }
}

/// Generates object schemas from record descriptions.
#[derive(Debug, Clone, Default)]
pub struct SchemaGenerator {
    mode: SchemaMode,
}

impl SchemaGenerator {
    pub const DEFAULT_INLINE_DEPTH: usize = 6;

    pub fn inline() -> Self {
        Self {
            mode: SchemaMode::default(),
        }
    }

    pub fn inline_with_depth(max_depth: usize) -> Self {
        Self {
            mode: SchemaMode::Inline { max_depth },
        }
    }

    pub fn with_refs() -> Self {
        Self {
            mode: SchemaMode::Ref,
        }
    }

    pub fn generate<T: SchemaProvider>(&self) -> JsonSchema {
        self.generate_raw(T::schema_name(), T::schema_fields())
    }

    fn generate_raw(&self, name: String, fields: Vec<FieldSchema>) -> JsonSchema {
        match self.mode {
            SchemaMode::Inline { max_depth } => inline_object(&fields, max_depth),
            SchemaMode::Ref => {
                let mut defs = BTreeMap::new();
                // the root stays in the $defs table so self-recursion
                // ($ref back to the root) still resolves
                collect_def(&name, &fields, &mut defs);
                let root = defs.get(&name).cloned().unwrap_or_else(JsonSchema::object);
                attach_defs(root, defs)
            }
        }
    }
}

fn inline_object(fields: &[FieldSchema], depth_left: usize) -> JsonSchema {
    let mut properties = BTreeMap::new();
    let mut required = Vec::new();

    for field in fields {
        let schema = inline_field(field, depth_left);
        if field.required {
            required.push(field.name.to_string());
        }
        properties.insert(field.name.to_string(), schema);
    }

    JsonSchema::object_with(properties, required)
}

fn inline_field(field: &FieldSchema, depth_left: usize) -> JsonSchema {
    let schema = inline_kind(&field.kind, depth_left);
    apply_constraints(schema, field)
}

fn inline_kind(kind: &FieldKind, depth_left: usize) -> JsonSchema {
    match kind {
        FieldKind::String => JsonSchema::string(),
        FieldKind::Number => JsonSchema::number(),
        FieldKind::Integer => JsonSchema::integer(),
        FieldKind::Boolean => JsonSchema::boolean(),
        FieldKind::Array(items) => JsonSchema::array(inline_kind(items, depth_left)),
        FieldKind::Record { fields, .. } => {
            if depth_left == 0 {
                // cycle (or very deep nesting): cut off with a bare object
                JsonSchema::object()
            } else {
                inline_object(&fields(), depth_left - 1)
            }
        }
    }
}

fn collect_def(name: &str, fields: &[FieldSchema], defs: &mut BTreeMap<String, JsonSchema>) {
    // mark before recursing so cycles terminate
    if defs.contains_key(name) {
        return;
    }
    defs.insert(name.to_string(), JsonSchema::object());

    let mut properties = BTreeMap::new();
    let mut required = Vec::new();
    for field in fields {
        let schema = ref_field(field, defs);
        if field.required {
            required.push(field.name.to_string());
        }
        properties.insert(field.name.to_string(), schema);
    }

    defs.insert(name.to_string(), JsonSchema::object_with(properties, required));
}

fn ref_field(field: &FieldSchema, defs: &mut BTreeMap<String, JsonSchema>) -> JsonSchema {
    let schema = ref_kind(&field.kind, defs);
    apply_constraints(schema, field)
}

fn ref_kind(kind: &FieldKind, defs: &mut BTreeMap<String, JsonSchema>) -> JsonSchema {
    match kind {
        FieldKind::String => JsonSchema::string(),
        FieldKind::Number => JsonSchema::number(),
        FieldKind::Integer => JsonSchema::integer(),
        FieldKind::Boolean => JsonSchema::boolean(),
        FieldKind::Array(items) => JsonSchema::array(ref_kind(items, defs)),
        FieldKind::Record { name, fields } => {
            let name = name();
            collect_def(&name, &fields(), defs);
            JsonSchema::reference(&name)
        }
    }
}

fn attach_defs(root: JsonSchema, defs: BTreeMap<String, JsonSchema>) -> JsonSchema {
    if defs.is_empty() {
        return root;
    }
    match root {
        JsonSchema::Typed(mut typed) => {
            if let TypedSchema::Object { defs: d, .. } = typed.as_mut() {
                *d = Some(defs);
            }
            JsonSchema::Typed(typed)
        }
        other => other,
    }
}

fn apply_constraints(schema: JsonSchema, field: &FieldSchema) -> JsonSchema {
    let mut typed = match schema {
        JsonSchema::Typed(typed) => typed,
        reference @ JsonSchema::Ref { .. } => return reference,
    };

    match typed.as_mut() {
        TypedSchema::String {
            description,
            format,
            pattern,
            min_length,
            max_length,
            enum_values,
            default,
            example,
        } => {
            *description = field.description.map(str::to_string);
            *format = field.format.map(str::to_string);
            *pattern = field.pattern.map(str::to_string);
            *min_length = field.min_length;
            *max_length = field.max_length;
            if !field.enum_values.is_empty() {
                *enum_values = Some(field.enum_values.clone());
            }
            *default = field.default.clone();
            *example = field.example.clone();
        }
        TypedSchema::Number {
            description,
            minimum,
            maximum,
            default,
        } => {
            *description = field.description.map(str::to_string);
            *minimum = field.minimum;
            *maximum = field.maximum;
            *default = field.default.clone();
        }
        TypedSchema::Integer {
            description,
            minimum,
            maximum,
            default,
        } => {
            *description = field.description.map(str::to_string);
            *minimum = field.minimum.map(|v| v as i64);
            *maximum = field.maximum.map(|v| v as i64);
            *default = field.default.clone();
        }
        TypedSchema::Boolean {
            description,
            default,
        } => {
            *description = field.description.map(str::to_string);
            *default = field.default.clone();
        }
        TypedSchema::Array {
            description,
            min_items,
            max_items,
            unique_items,
            ..
        } => {
            *description = field.description.map(str::to_string);
            *min_items = field.min_items;
            *max_items = field.max_items;
            if field.unique_items {
                *unique_items = Some(true);
            }
        }
        TypedSchema::Object { description, .. } => {
            if field.description.is_some() {
                *description = field.description.map(str::to_string);
            }
        }
    }

    JsonSchema::Typed(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Address;
    impl SchemaProvider for Address {
        fn schema_name() -> String {
            "test.Address".to_string()
        }
        fn schema_fields() -> Vec<FieldSchema> {
            vec![
                FieldSchema::new("street", FieldKind::String),
                FieldSchema::new("zip", FieldKind::String)
                    .pattern("^[0-9]{5}$")
                    .optional(),
            ]
        }
    }

    struct Person;
    impl SchemaProvider for Person {
        fn schema_name() -> String {
            "test.Person".to_string()
        }
        fn schema_fields() -> Vec<FieldSchema> {
            vec![
                FieldSchema::new("name", FieldKind::String).description("Full name"),
                FieldSchema::new("age", FieldKind::Integer)
                    .range(Some(0.0), Some(150.0))
                    .optional(),
                FieldSchema::new("address", FieldKind::record::<Address>()),
                FieldSchema::new(
                    "friends",
                    FieldKind::Array(Box::new(FieldKind::record::<Person>())),
                )
                .optional(),
            ]
        }
    }

    #[test]
    fn test_inline_generation() {
        let schema = SchemaGenerator::inline().generate::<Person>();
        let json = serde_json::to_value(&schema).unwrap();

        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["name"]["description"], "Full name");
        assert_eq!(json["properties"]["age"]["maximum"], 150);
        assert_eq!(json["properties"]["address"]["type"], "object");
        assert_eq!(
            json["properties"]["address"]["properties"]["zip"]["pattern"],
            "^[0-9]{5}$"
        );
        // required excludes optionals
        let required: Vec<&str> = json["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["address", "name"]);
    }

    #[test]
    fn test_inline_recursion_bounded() {
        // Person contains Vec<Person>; depth 2 must terminate
        let schema = SchemaGenerator::inline_with_depth(2).generate::<Person>();
        let json = serde_json::to_value(&schema).unwrap();

        // two levels in, the recursive arm degrades to a bare object
        let level1 = &json["properties"]["friends"]["items"];
        let level2 = &level1["properties"]["friends"]["items"];
        assert_eq!(level2["type"], "object");
        assert!(level2.get("properties").is_none());
    }

    #[test]
    fn test_ref_generation_breaks_cycles() {
        let schema = SchemaGenerator::with_refs().generate::<Person>();
        let json = serde_json::to_value(&schema).unwrap();

        assert_eq!(
            json["properties"]["address"]["$ref"],
            "#/$defs/test.Address"
        );
        assert_eq!(
            json["properties"]["friends"]["items"]["$ref"],
            "#/$defs/test.Person"
        );
        // the recursive def is present exactly once and refers to itself
        assert_eq!(
            json["$defs"]["test.Person"]["properties"]["friends"]["items"]["$ref"],
            "#/$defs/test.Person"
        );
        assert!(json["$defs"]["test.Address"]["properties"]["zip"].is_object());
    }

    #[test]
    fn test_constraint_metadata() {
        struct Query;
        impl SchemaProvider for Query {
            fn schema_name() -> String {
                "test.Query".to_string()
            }
            fn schema_fields() -> Vec<FieldSchema> {
                vec![
                    FieldSchema::new("q", FieldKind::String)
                        .length(Some(1), Some(256))
                        .example(json!("rust mcp")),
                    FieldSchema::new("sort", FieldKind::String)
                        .enum_value("asc")
                        .enum_value("desc")
                        .default_value(json!("asc"))
                        .optional(),
                    FieldSchema::new("tags", FieldKind::Array(Box::new(FieldKind::String)))
                        .items(Some(0), Some(10))
                        .unique()
                        .optional(),
                ]
            }
        }

        let json = serde_json::to_value(SchemaGenerator::inline().generate::<Query>()).unwrap();
        assert_eq!(json["properties"]["q"]["minLength"], 1);
        assert_eq!(json["properties"]["q"]["example"], "rust mcp");
        assert_eq!(json["properties"]["sort"]["enum"], json!(["asc", "desc"]));
        assert_eq!(json["properties"]["sort"]["default"], "asc");
        assert_eq!(json["properties"]["tags"]["uniqueItems"], true);
        assert_eq!(json["properties"]["tags"]["maxItems"], 10);
        assert_eq!(json["required"], json!(["q"]));
    }

    #[test]
    fn test_builder_shapes() {
        let schema = JsonSchema::object_with(
            BTreeMap::from([("name".to_string(), JsonSchema::string())]),
            vec!["name".to_string()],
        );
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["required"], json!(["name"]));

        let en = JsonSchema::string_enum(vec!["a".into(), "b".into()]);
        assert_eq!(serde_json::to_value(&en).unwrap()["enum"], json!(["a", "b"]));
    }
}
