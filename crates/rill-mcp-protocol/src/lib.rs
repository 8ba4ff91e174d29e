//! # MCP Protocol Types
//!
//! Wire-level types for the Model Context Protocol: protocol version
//! negotiation, capability advertisement, the polymorphic content model,
//! and the request/result shapes for tools, resources, prompts,
//! completion, and logging. All types serialize with the camelCase field
//! names the protocol schema mandates.
//!
//! The [`schema`] module carries the OpenAPI-3 object schema builder and
//! the generator that turns registered record descriptions into inline or
//! `$defs`-referenced schemas.

pub mod completion;
pub mod content;
pub mod cursor;
pub mod error;
pub mod initialize;
pub mod logging;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod schema;
pub mod tools;
pub mod version;

pub use completion::{
    Argument, CompleteContext, CompleteRequestParams, CompleteResult, Completion,
    CompletionReference, COMPLETION_MAX_VALUES,
};
pub use content::{Annotations, Content, ResourceContents, Role};
pub use cursor::{Cursor, Page};
pub use error::{McpError, McpResult};
pub use initialize::{
    ClientCapabilities, Implementation, InitializeRequestParams, InitializeResult,
    PromptsCapability, ResourcesCapability, ServerCapabilities, ToolsCapability,
};
pub use logging::{LoggingLevel, LoggingMessageParams, SetLevelRequestParams};
pub use notifications::{CancelledParams, ProgressParams, ResourceUpdatedParams};
pub use prompts::{
    GetPromptRequestParams, GetPromptResult, ListPromptsRequestParams, ListPromptsResult, Prompt,
    PromptArgument, PromptMessage,
};
pub use resources::{
    ListResourceTemplatesRequestParams, ListResourceTemplatesResult, ListResourcesRequestParams,
    ListResourcesResult, ReadResourceRequestParams, ReadResourceResult, Resource,
    ResourceTemplate, SubscribeRequestParams, UnsubscribeRequestParams,
};
pub use schema::{FieldKind, FieldSchema, JsonSchema, SchemaGenerator, SchemaMode, SchemaProvider, TypedSchema};
pub use tools::{
    CallToolRequestParams, CallToolResult, ListToolsRequestParams, ListToolsResult, Tool,
    ToolAnnotations,
};
pub use version::ProtocolVersion;

/// MCP method names, as they appear on the wire.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";

    pub const COMPLETION_COMPLETE: &str = "completion/complete";

    pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
    pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
    pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
    pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
    pub const NOTIFICATION_RESOURCE_UPDATED: &str = "notifications/resources/updated";
    pub const NOTIFICATION_RESOURCES_LIST_CHANGED: &str = "notifications/resources/listChanged";
    pub const NOTIFICATION_TOOLS_LIST_CHANGED: &str = "notifications/tools/listChanged";
    pub const NOTIFICATION_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/listChanged";
}
