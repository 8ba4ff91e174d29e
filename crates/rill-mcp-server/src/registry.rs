//! Thread-safe descriptor registries.
//!
//! Registration order is preserved — `*/list` results and resource
//! template matching both depend on it. Consumers always receive cloned
//! descriptors; the registries alone own the tables. A list filter hook
//! runs at list time for dynamic visibility (role-based masking and the
//! like).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rill_http_mcp_server::RequestContext;
use rill_mcp_protocol::{McpError, McpResult, Prompt, Resource, ResourceTemplate, Tool};

use crate::handler::{McpCompletionHandler, McpPromptHandler, McpResourceHandler, McpTool};
use crate::uri_template::UriTemplate;

/// `(ctx, items) -> items`, applied to every list result.
pub type ListFilter<T> = dyn Fn(&RequestContext, Vec<T>) -> Vec<T> + Send + Sync;

/// A registered tool: descriptor plus handler.
#[derive(Clone)]
pub struct ToolEntry {
    pub descriptor: Tool,
    pub handler: Arc<dyn McpTool>,
}

/// Tool table keyed by unique name.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<Vec<ToolEntry>>,
    filter: RwLock<Option<Arc<ListFilter<Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: Tool, handler: Arc<dyn McpTool>) -> McpResult<()> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.iter().any(|e| e.descriptor.name == descriptor.name) {
            return Err(McpError::invalid_params(format!(
                "tool '{}' is already registered",
                descriptor.name
            )));
        }
        entries.push(ToolEntry {
            descriptor,
            handler,
        });
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        let before = entries.len();
        entries.retain(|e| e.descriptor.name != name);
        entries.len() != before
    }

    pub fn get(&self, name: &str) -> Option<ToolEntry> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .find(|e| e.descriptor.name == name)
            .cloned()
    }

    /// Cloned descriptors in registration order, filter applied.
    pub fn list(&self, ctx: &RequestContext) -> Vec<Tool> {
        let items: Vec<Tool> = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|e| e.descriptor.clone())
            .collect();
        match self.filter.read().expect("registry lock poisoned").as_ref() {
            Some(filter) => filter(ctx, items),
            None => items,
        }
    }

    pub fn set_list_filter(&self, filter: Arc<ListFilter<Tool>>) {
        *self.filter.write().expect("registry lock poisoned") = Some(filter);
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A directly addressable resource.
#[derive(Clone)]
pub struct ResourceEntry {
    pub descriptor: Resource,
    pub handler: Arc<dyn McpResourceHandler>,
}

/// A templated resource with its compiled matcher and optional
/// completion hook.
#[derive(Clone)]
pub struct TemplateEntry {
    pub descriptor: ResourceTemplate,
    pub template: UriTemplate,
    pub handler: Arc<dyn McpResourceHandler>,
    pub completion: Option<Arc<dyn McpCompletionHandler>>,
}

/// Resources and resource templates, keyed by URI / template pattern.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<Vec<ResourceEntry>>,
    templates: RwLock<Vec<TemplateEntry>>,
    filter: RwLock<Option<Arc<ListFilter<Resource>>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: Resource, handler: Arc<dyn McpResourceHandler>) -> McpResult<()> {
        let mut resources = self.resources.write().expect("registry lock poisoned");
        if resources.iter().any(|e| e.descriptor.uri == descriptor.uri) {
            return Err(McpError::invalid_params(format!(
                "resource '{}' is already registered",
                descriptor.uri
            )));
        }
        resources.push(ResourceEntry {
            descriptor,
            handler,
        });
        Ok(())
    }

    pub fn register_template(
        &self,
        descriptor: ResourceTemplate,
        handler: Arc<dyn McpResourceHandler>,
        completion: Option<Arc<dyn McpCompletionHandler>>,
    ) -> McpResult<()> {
        let template = UriTemplate::new(&descriptor.uri_template)?;
        let mut templates = self.templates.write().expect("registry lock poisoned");
        if templates
            .iter()
            .any(|e| e.descriptor.uri_template == descriptor.uri_template)
        {
            return Err(McpError::invalid_params(format!(
                "resource template '{}' is already registered",
                descriptor.uri_template
            )));
        }
        templates.push(TemplateEntry {
            descriptor,
            template,
            handler,
            completion,
        });
        Ok(())
    }

    pub fn unregister(&self, uri: &str) -> bool {
        let mut resources = self.resources.write().expect("registry lock poisoned");
        let before = resources.len();
        resources.retain(|e| e.descriptor.uri != uri);
        if resources.len() != before {
            return true;
        }
        drop(resources);

        let mut templates = self.templates.write().expect("registry lock poisoned");
        let before = templates.len();
        templates.retain(|e| e.descriptor.uri_template != uri);
        templates.len() != before
    }

    /// Resolve a read: a directly registered URI wins; otherwise the
    /// first template (in registration order) whose pattern matches,
    /// with its variable bindings.
    pub fn resolve(
        &self,
        uri: &str,
    ) -> Option<(Arc<dyn McpResourceHandler>, HashMap<String, String>)> {
        {
            let resources = self.resources.read().expect("registry lock poisoned");
            if let Some(entry) = resources.iter().find(|e| e.descriptor.uri == uri) {
                return Some((entry.handler.clone(), HashMap::new()));
            }
        }

        let templates = self.templates.read().expect("registry lock poisoned");
        for entry in templates.iter() {
            if let Some(bindings) = entry.template.extract(uri) {
                return Some((entry.handler.clone(), bindings));
            }
        }
        None
    }

    /// First matching template (registration order) with its bindings —
    /// the resource-completion lookup.
    pub fn matching_template(
        &self,
        uri: &str,
    ) -> Option<(TemplateEntry, HashMap<String, String>)> {
        let templates = self.templates.read().expect("registry lock poisoned");
        for entry in templates.iter() {
            if let Some(bindings) = entry.template.extract(uri) {
                return Some((entry.clone(), bindings));
            }
        }
        None
    }

    pub fn list(&self, ctx: &RequestContext) -> Vec<Resource> {
        let items: Vec<Resource> = self
            .resources
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|e| e.descriptor.clone())
            .collect();
        match self.filter.read().expect("registry lock poisoned").as_ref() {
            Some(filter) => filter(ctx, items),
            None => items,
        }
    }

    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.templates
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    pub fn set_list_filter(&self, filter: Arc<ListFilter<Resource>>) {
        *self.filter.write().expect("registry lock poisoned") = Some(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().expect("registry lock poisoned").is_empty()
            && self.templates.read().expect("registry lock poisoned").is_empty()
    }
}

/// A registered prompt with per-argument completion hooks.
#[derive(Clone)]
pub struct PromptEntry {
    pub descriptor: Prompt,
    pub handler: Arc<dyn McpPromptHandler>,
    pub completions: HashMap<String, Arc<dyn McpCompletionHandler>>,
}

/// Prompt table keyed by unique name.
#[derive(Default)]
pub struct PromptRegistry {
    entries: RwLock<Vec<PromptEntry>>,
    filter: RwLock<Option<Arc<ListFilter<Prompt>>>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        descriptor: Prompt,
        handler: Arc<dyn McpPromptHandler>,
        completions: HashMap<String, Arc<dyn McpCompletionHandler>>,
    ) -> McpResult<()> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.iter().any(|e| e.descriptor.name == descriptor.name) {
            return Err(McpError::invalid_params(format!(
                "prompt '{}' is already registered",
                descriptor.name
            )));
        }
        entries.push(PromptEntry {
            descriptor,
            handler,
            completions,
        });
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        let before = entries.len();
        entries.retain(|e| e.descriptor.name != name);
        entries.len() != before
    }

    pub fn get(&self, name: &str) -> Option<PromptEntry> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .find(|e| e.descriptor.name == name)
            .cloned()
    }

    pub fn list(&self, ctx: &RequestContext) -> Vec<Prompt> {
        let items: Vec<Prompt> = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|e| e.descriptor.clone())
            .collect();
        match self.filter.read().expect("registry lock poisoned").as_ref() {
            Some(filter) => filter(ctx, items),
            None => items,
        }
    }

    pub fn set_list_filter(&self, filter: Arc<ListFilter<Prompt>>) {
        *self.filter.write().expect("registry lock poisoned") = Some(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("registry lock poisoned").is_empty()
    }
}
