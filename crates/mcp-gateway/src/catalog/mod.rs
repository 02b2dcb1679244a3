//! In-memory registry of tools, prompts and resources.
//!
//! The gateway does not discover procedures itself; a collaborator (or the
//! binary's built-in set) populates a [`Catalog`] with descriptors and
//! handler callbacks, then hands it to the server. Listings are alphabetical
//! by name and capability-filtered per transport.

pub mod builtin;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use url::Url;

use crate::error::{CatalogError, CatalogResult, HandlerResult};
use crate::pagination::{Page, paginate};
use crate::streaming::StreamConnector;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,128}$").expect("valid name pattern"));

bitflags::bitflags! {
    /// Transport capability tags carried by catalog entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Plain request/response; callable on every transport.
        const STANDARD = 1;
        /// Streams text chunks to the caller.
        const TEXT_STREAMING = 1 << 1;
        /// Streams binary chunks; WebSocket only.
        const BINARY_STREAMING = 1 << 2;
        /// Never callable outside a WebSocket connection.
        const REQUIRES_WEBSOCKET = 1 << 3;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// The transport a request arrived on. Decides which entries are visible
/// and whether streaming invocations are possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
    Ws,
}

impl TransportKind {
    /// Capability bits this transport can serve.
    #[must_use]
    pub fn allowed_mask(self) -> Capabilities {
        match self {
            Self::Stdio | Self::Http => Capabilities::STANDARD,
            Self::Sse => Capabilities::STANDARD | Capabilities::TEXT_STREAMING,
            Self::Ws => Capabilities::all(),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
            Self::Ws => "ws",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context passed to every handler invocation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Transport the call arrived on.
    pub transport: Option<TransportKind>,
    /// Session the call belongs to, when the transport has one.
    pub session_id: Option<String>,
    /// Stream connector, present for streaming tools called over WebSocket.
    pub stream: Option<Arc<StreamConnector>>,
}

impl CallContext {
    #[must_use]
    pub fn for_transport(transport: TransportKind) -> Self {
        Self { transport: Some(transport), ..Self::default() }
    }
}

/// Tool invocation callback.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> HandlerResult<serde_json::Value>;
}

/// Prompt rendering callback.
#[async_trait::async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> HandlerResult<PromptResult>;
}

/// Resource read callback; returns the text contents for the entry's URI.
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, ctx: &CallContext, uri: &str) -> HandlerResult<String>;
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: serde_json::Value,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// Declared prompt argument.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Registered tool: descriptor plus handler.
pub struct ToolEntry {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    pub output_schema: Option<serde_json::Value>,
    pub icon: Option<String>,
    pub capabilities: Capabilities,
    /// Include `structuredContent` in call results even without an output schema.
    pub structured: bool,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolEntry {
    /// Create a standard tool entry.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        input_schema: serde_json::Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            input_schema,
            output_schema: None,
            icon: None,
            capabilities: Capabilities::STANDARD,
            structured: false,
            handler,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_structured_content(mut self) -> Self {
        self.structured = true;
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Whether this tool shows up in listings for the given transport.
    #[must_use]
    pub fn visible_on(&self, transport: TransportKind) -> bool {
        self.capabilities.contains(Capabilities::STANDARD)
            || self.capabilities.intersects(transport.allowed_mask())
    }

    /// MCP descriptor for `tools/list`.
    #[must_use]
    pub fn descriptor(&self) -> serde_json::Value {
        let mut desc = serde_json::json!({
            "name": self.name,
            "inputSchema": self.input_schema,
        });
        let obj = desc.as_object_mut().expect("descriptor is an object");
        if let Some(title) = &self.title {
            obj.insert("title".to_string(), serde_json::json!(title));
        }
        if let Some(description) = &self.description {
            obj.insert("description".to_string(), serde_json::json!(description));
        }
        if let Some(schema) = &self.output_schema {
            obj.insert("outputSchema".to_string(), schema.clone());
        }
        if let Some(icon) = &self.icon {
            obj.insert("icon".to_string(), serde_json::json!(icon));
        }
        desc
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Registered prompt: descriptor plus handler.
pub struct PromptEntry {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub arguments: Vec<PromptArgument>,
    pub handler: Arc<dyn PromptHandler>,
}

impl PromptEntry {
    #[must_use]
    pub fn new(name: impl Into<String>, handler: Arc<dyn PromptHandler>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            icon: None,
            arguments: Vec::new(),
            handler,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<PromptArgument>) -> Self {
        self.arguments = arguments;
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// MCP descriptor for `prompts/list`.
    #[must_use]
    pub fn descriptor(&self) -> serde_json::Value {
        let mut desc = serde_json::json!({
            "name": self.name,
            "arguments": self.arguments,
        });
        let obj = desc.as_object_mut().expect("descriptor is an object");
        if let Some(title) = &self.title {
            obj.insert("title".to_string(), serde_json::json!(title));
        }
        if let Some(description) = &self.description {
            obj.insert("description".to_string(), serde_json::json!(description));
        }
        if let Some(icon) = &self.icon {
            obj.insert("icon".to_string(), serde_json::json!(icon));
        }
        desc
    }
}

impl std::fmt::Debug for PromptEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEntry").field("name", &self.name).finish()
    }
}

/// Registered resource: descriptor plus handler.
pub struct ResourceEntry {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub uri: String,
    pub mime_type: Option<String>,
    pub handler: Arc<dyn ResourceHandler>,
}

impl ResourceEntry {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            icon: None,
            uri: uri.into(),
            mime_type: None,
            handler,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// MCP descriptor for `resources/list`.
    #[must_use]
    pub fn descriptor(&self) -> serde_json::Value {
        let mut desc = serde_json::json!({
            "name": self.name,
            "uri": self.uri,
        });
        let obj = desc.as_object_mut().expect("descriptor is an object");
        if let Some(title) = &self.title {
            obj.insert("title".to_string(), serde_json::json!(title));
        }
        if let Some(description) = &self.description {
            obj.insert("description".to_string(), serde_json::json!(description));
        }
        if let Some(mime_type) = &self.mime_type {
            obj.insert("mimeType".to_string(), serde_json::json!(mime_type));
        }
        if let Some(icon) = &self.icon {
            obj.insert("icon".to_string(), serde_json::json!(icon));
        }
        desc
    }
}

impl std::fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .finish()
    }
}

/// The procedure registry handed to the server.
///
/// `BTreeMap` storage keeps listings alphabetical by construction. Reads are
/// lock-free after registration completes; registration is not concurrent.
#[derive(Debug, Default)]
pub struct Catalog {
    tools: BTreeMap<String, Arc<ToolEntry>>,
    prompts: BTreeMap<String, Arc<PromptEntry>>,
    resources: BTreeMap<String, Arc<ResourceEntry>>,
    resources_by_uri: HashMap<String, String>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_name(name: &str) -> CatalogResult<()> {
        if NAME_PATTERN.is_match(name) {
            Ok(())
        } else {
            Err(CatalogError::InvalidName { name: name.to_string() })
        }
    }

    /// Register a tool. Names are unique within the kind.
    pub fn register_tool(&mut self, entry: ToolEntry) -> CatalogResult<()> {
        Self::validate_name(&entry.name)?;
        if self.tools.contains_key(&entry.name) {
            return Err(CatalogError::DuplicateName { kind: "tool", name: entry.name });
        }
        self.tools.insert(entry.name.clone(), Arc::new(entry));
        Ok(())
    }

    /// Register a prompt. Names are unique within the kind.
    pub fn register_prompt(&mut self, entry: PromptEntry) -> CatalogResult<()> {
        Self::validate_name(&entry.name)?;
        if self.prompts.contains_key(&entry.name) {
            return Err(CatalogError::DuplicateName { kind: "prompt", name: entry.name });
        }
        self.prompts.insert(entry.name.clone(), Arc::new(entry));
        Ok(())
    }

    /// Register a resource. Names are unique within the kind; the URI must
    /// be a valid `scheme://path` URI and is indexed for subscription lookup.
    pub fn register_resource(&mut self, entry: ResourceEntry) -> CatalogResult<()> {
        Self::validate_name(&entry.name)?;
        Url::parse(&entry.uri)?;
        if self.resources.contains_key(&entry.name) {
            return Err(CatalogError::DuplicateName { kind: "resource", name: entry.name });
        }
        self.resources_by_uri.insert(entry.uri.clone(), entry.name.clone());
        self.resources.insert(entry.name.clone(), Arc::new(entry));
        Ok(())
    }

    /// Tools visible on `transport`, alphabetical, paginated.
    #[must_use]
    pub fn list_tools(
        &self,
        cursor: Option<&str>,
        page_size: Option<usize>,
        transport: TransportKind,
    ) -> Page<Arc<ToolEntry>> {
        let visible: Vec<Arc<ToolEntry>> =
            self.tools.values().filter(|t| t.visible_on(transport)).cloned().collect();
        paginate(&visible, cursor, page_size)
    }

    /// All prompts, alphabetical, paginated. Prompts carry no capabilities.
    #[must_use]
    pub fn list_prompts(
        &self,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Page<Arc<PromptEntry>> {
        let all: Vec<Arc<PromptEntry>> = self.prompts.values().cloned().collect();
        paginate(&all, cursor, page_size)
    }

    /// All resources, alphabetical, paginated.
    #[must_use]
    pub fn list_resources(
        &self,
        cursor: Option<&str>,
        page_size: Option<usize>,
    ) -> Page<Arc<ResourceEntry>> {
        let all: Vec<Arc<ResourceEntry>> = self.resources.values().cloned().collect();
        paginate(&all, cursor, page_size)
    }

    /// Look up a tool by name, regardless of transport.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<Arc<ToolEntry>> {
        self.tools.get(name).cloned()
    }

    /// Look up a prompt by name.
    #[must_use]
    pub fn prompt(&self, name: &str) -> Option<Arc<PromptEntry>> {
        self.prompts.get(name).cloned()
    }

    /// Look up a resource by name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Arc<ResourceEntry>> {
        self.resources.get(name).cloned()
    }

    /// Look up a resource by its exact URI.
    #[must_use]
    pub fn resource_by_uri(&self, uri: &str) -> Option<Arc<ResourceEntry>> {
        self.resources_by_uri.get(uri).and_then(|name| self.resources.get(name)).cloned()
    }

    #[must_use]
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    #[must_use]
    pub fn has_prompts(&self) -> bool {
        !self.prompts.is_empty()
    }

    #[must_use]
    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }
}
