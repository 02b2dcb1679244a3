//! Protocol dispatcher.
//!
//! Decodes one envelope, routes the method to a handler (reserved MCP
//! methods first, then direct invocation by procedure name), wraps results
//! in the MCP envelope, and maps failures onto JSON-RPC error codes.
//! Notifications never produce a response, even when they fail.

use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{CallContext, Capabilities, Catalog, ToolEntry, TransportKind};
use crate::config::Config;
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, code};
use crate::session::subscriptions::SubscriptionRegistry;

use super::hooks::HookRunner;

/// Routes JSON-RPC envelopes to catalog handlers.
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    subscriptions: Arc<SubscriptionRegistry>,
    hooks: HookRunner,
    config: Arc<Config>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        subscriptions: Arc<SubscriptionRegistry>,
        hooks: HookRunner,
        config: Arc<Config>,
    ) -> Self {
        Self { catalog, subscriptions, hooks, config }
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Dispatch one envelope. Returns `None` for notifications.
    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
        ctx: &CallContext,
    ) -> Option<JsonRpcResponse> {
        let is_notification = request.is_notification();
        let id = request.id.clone();

        if !request.is_valid() {
            if is_notification {
                return None;
            }
            return Some(JsonRpcResponse::error(
                id,
                code::INVALID_REQUEST,
                "Invalid JSON-RPC envelope",
            ));
        }

        tracing::debug!(
            method = %request.method,
            transport = ctx.transport.map_or("none", TransportKind::as_str),
            "Dispatching request"
        );

        let outcome = self.route(&request, ctx).await;

        if is_notification {
            if let Err(error) = outcome {
                tracing::debug!(method = %request.method, %error, "Notification failed");
            }
            return None;
        }

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                let rpc = error.to_rpc_error();
                JsonRpcResponse::error_with_data(id, rpc.code, rpc.message, rpc.data)
            }
        })
    }

    async fn route(
        &self,
        request: &JsonRpcRequest,
        ctx: &CallContext,
    ) -> HandlerResult<serde_json::Value> {
        let params = &request.params;
        match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "ping" => Ok(serde_json::json!({})),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                Ok(serde_json::json!({}))
            }
            "tools/list" => Ok(self.list_tools(params, ctx)),
            "tools/call" => {
                let name = required_str(params, "name")?;
                let arguments =
                    params.get("arguments").cloned().unwrap_or(serde_json::json!({}));
                self.call_tool(name, arguments, ctx).await
            }
            "prompts/list" => Ok(self.list_prompts(params)),
            "prompts/get" => {
                let name = required_str(params, "name")?;
                let arguments =
                    params.get("arguments").cloned().unwrap_or(serde_json::json!({}));
                self.get_prompt(name, arguments, ctx).await
            }
            "resources/list" => Ok(self.list_resources(params)),
            "resources/read" => {
                let uri = required_str(params, "uri")?;
                self.read_resource(uri, ctx).await
            }
            "resources/subscribe" => self.change_subscription(params, ctx, true).await,
            "resources/unsubscribe" => self.change_subscription(params, ctx, false).await,
            other => self.call_direct(other, params.clone(), ctx).await,
        }
    }

    /// `initialize` result. Capabilities are reported only for kinds with at
    /// least one registered entry.
    fn initialize_result(&self) -> serde_json::Value {
        let mut capabilities = serde_json::Map::new();
        let mut notifications = serde_json::Map::new();

        if self.catalog.has_tools() {
            capabilities.insert("tools".to_string(), serde_json::json!({ "listChanged": true }));
            notifications.insert("tools".to_string(), serde_json::json!(true));
        }
        if self.catalog.has_prompts() {
            capabilities
                .insert("prompts".to_string(), serde_json::json!({ "listChanged": true }));
            notifications.insert("prompts".to_string(), serde_json::json!(true));
        }
        if self.catalog.has_resources() {
            capabilities
                .insert("resources".to_string(), serde_json::json!({ "subscribe": true }));
            notifications.insert("resources".to_string(), serde_json::json!(true));
        }
        if !notifications.is_empty() {
            capabilities
                .insert("notifications".to_string(), serde_json::Value::Object(notifications));
        }

        serde_json::json!({
            "protocolVersion": self.config.protocol_version,
            "serverInfo": {
                "name": self.config.server_name,
                "version": self.config.server_version,
            },
            "capabilities": capabilities,
        })
    }

    fn list_tools(&self, params: &serde_json::Value, ctx: &CallContext) -> serde_json::Value {
        let transport = ctx.transport.unwrap_or(TransportKind::Http);
        let page =
            self.catalog.list_tools(cursor_param(params), page_size_param(params), transport);
        let tools: Vec<serde_json::Value> = page.items.iter().map(|t| t.descriptor()).collect();
        with_next_cursor(serde_json::json!({ "tools": tools }), page.next_cursor)
    }

    fn list_prompts(&self, params: &serde_json::Value) -> serde_json::Value {
        let page = self.catalog.list_prompts(cursor_param(params), page_size_param(params));
        let prompts: Vec<serde_json::Value> = page.items.iter().map(|p| p.descriptor()).collect();
        with_next_cursor(serde_json::json!({ "prompts": prompts }), page.next_cursor)
    }

    fn list_resources(&self, params: &serde_json::Value) -> serde_json::Value {
        let page = self.catalog.list_resources(cursor_param(params), page_size_param(params));
        let resources: Vec<serde_json::Value> =
            page.items.iter().map(|r| r.descriptor()).collect();
        with_next_cursor(serde_json::json!({ "resources": resources }), page.next_cursor)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        ctx: &CallContext,
    ) -> HandlerResult<serde_json::Value> {
        let entry = self
            .catalog
            .tool(name)
            .ok_or_else(|| HandlerError::not_found(format!("Tool not found: {name}")))?;
        self.check_transport(&entry, ctx)?;

        self.hooks
            .before(name, &arguments)
            .await
            .map_err(|rejection| HandlerError::Vetoed(rejection.message))?;

        let start = Instant::now();
        match entry.handler.call(ctx, arguments).await {
            Ok(result) => {
                self.hooks.after_success(name, result.clone(), start.elapsed());
                Ok(Self::tool_envelope(&entry, result))
            }
            Err(error) => {
                self.hooks.after_failure(name, error.to_string(), start.elapsed());
                tracing::warn!(tool = %name, %error, "Tool invocation failed");
                Err(error)
            }
        }
    }

    /// Wrap a raw tool result in the MCP content envelope.
    fn tool_envelope(entry: &ToolEntry, result: serde_json::Value) -> serde_json::Value {
        let text = serde_json::to_string(&result).unwrap_or_default();
        let mut envelope = serde_json::json!({
            "content": [{ "type": "text", "text": text }],
        });

        if entry.output_schema.is_some() || entry.structured {
            let structured = if result.is_object() {
                result
            } else {
                serde_json::json!({ "result": result })
            };
            envelope
                .as_object_mut()
                .expect("envelope is an object")
                .insert("structuredContent".to_string(), structured);
        }
        envelope
    }

    fn check_transport(&self, entry: &ToolEntry, ctx: &CallContext) -> HandlerResult<()> {
        if entry.capabilities.contains(Capabilities::REQUIRES_WEBSOCKET)
            && ctx.transport != Some(TransportKind::Ws)
        {
            let transport = ctx.transport.map_or("none", TransportKind::as_str);
            return Err(HandlerError::not_found(format!(
                "Streaming not supported over {transport}: tool '{}' requires a WebSocket connection",
                entry.name
            )));
        }
        Ok(())
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: serde_json::Value,
        ctx: &CallContext,
    ) -> HandlerResult<serde_json::Value> {
        let entry = self
            .catalog
            .prompt(name)
            .ok_or_else(|| HandlerError::not_found(format!("Prompt not found: {name}")))?;

        self.hooks
            .before(name, &arguments)
            .await
            .map_err(|rejection| HandlerError::Vetoed(rejection.message))?;

        let start = Instant::now();
        match entry.handler.get(ctx, arguments).await {
            Ok(result) => {
                let value = serde_json::to_value(&result)?;
                self.hooks.after_success(name, value.clone(), start.elapsed());
                Ok(value)
            }
            Err(error) => {
                self.hooks.after_failure(name, error.to_string(), start.elapsed());
                Err(error)
            }
        }
    }

    async fn read_resource(
        &self,
        uri: &str,
        ctx: &CallContext,
    ) -> HandlerResult<serde_json::Value> {
        let entry = self
            .catalog
            .resource_by_uri(uri)
            .ok_or_else(|| HandlerError::invalid_params(format!("Unknown resource URI: {uri}")))?;

        self.hooks
            .before(&entry.name, &serde_json::json!({ "uri": uri }))
            .await
            .map_err(|rejection| HandlerError::Vetoed(rejection.message))?;

        let start = Instant::now();
        match entry.handler.read(ctx, uri).await {
            Ok(text) => {
                let mut contents = serde_json::json!({ "uri": entry.uri, "text": text });
                if let Some(mime_type) = &entry.mime_type {
                    contents
                        .as_object_mut()
                        .expect("contents is an object")
                        .insert("mimeType".to_string(), serde_json::json!(mime_type));
                }
                let result = serde_json::json!({ "contents": [contents] });
                self.hooks.after_success(&entry.name, result.clone(), start.elapsed());
                Ok(result)
            }
            Err(error) => {
                self.hooks.after_failure(&entry.name, error.to_string(), start.elapsed());
                Err(error)
            }
        }
    }

    async fn change_subscription(
        &self,
        params: &serde_json::Value,
        ctx: &CallContext,
        subscribe: bool,
    ) -> HandlerResult<serde_json::Value> {
        let uri = required_str(params, "uri")?;
        let session_id = ctx.session_id.as_deref().ok_or_else(|| {
            HandlerError::invalid_params("resource subscriptions require a session")
        })?;
        if self.catalog.resource_by_uri(uri).is_none() {
            return Err(HandlerError::invalid_params(format!("Unknown resource URI: {uri}")));
        }

        // Idempotent either way; the change-flag is logged, not surfaced.
        let changed = if subscribe {
            self.subscriptions.subscribe(session_id, uri).await
        } else {
            self.subscriptions.unsubscribe(session_id, uri).await
        };
        tracing::debug!(session_id = %session_id, uri = %uri, subscribe, changed, "Subscription change");
        Ok(serde_json::json!({}))
    }

    /// Direct invocation: an unknown method name matching a registered
    /// procedure invokes it. Tools win over prompts over resources.
    async fn call_direct(
        &self,
        method: &str,
        params: serde_json::Value,
        ctx: &CallContext,
    ) -> HandlerResult<serde_json::Value> {
        if self.catalog.tool(method).is_some() {
            return self.call_tool(method, params, ctx).await;
        }
        if self.catalog.prompt(method).is_some() {
            return self.get_prompt(method, params, ctx).await;
        }
        if let Some(entry) = self.catalog.resource(method) {
            let uri = entry.uri.clone();
            return self.read_resource(&uri, ctx).await;
        }
        Err(HandlerError::not_found(format!("Method not found: {method}")))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish()
    }
}

fn required_str<'a>(params: &'a serde_json::Value, field: &str) -> HandlerResult<&'a str> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerError::invalid_params(format!("Missing '{field}' parameter")))
}

fn cursor_param(params: &serde_json::Value) -> Option<&str> {
    params.get("cursor").and_then(|v| v.as_str())
}

fn page_size_param(params: &serde_json::Value) -> Option<usize> {
    // Negative or non-integer sizes fall back to the default downstream.
    params.get("pageSize").and_then(serde_json::Value::as_u64).map(|n| n as usize)
}

fn with_next_cursor(mut result: serde_json::Value, next_cursor: Option<String>) -> serde_json::Value {
    if let Some(cursor) = next_cursor {
        result
            .as_object_mut()
            .expect("list result is an object")
            .insert("nextCursor".to_string(), serde_json::json!(cursor));
    }
    result
}
