//! Built-in sample procedures.
//!
//! The gateway engine consumes a catalog populated by the host; this module
//! is the default population used by the binary so a fresh install has
//! something to serve, and doubles as the fixture set for integration tests.

use std::sync::Arc;

use serde_json::json;

use super::{
    CallContext, Capabilities, Catalog, PromptArgument, PromptEntry, PromptHandler, PromptMessage,
    PromptResult, ResourceEntry, ResourceHandler, ToolEntry, ToolHandler,
};
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::stream::StreamMeta;
use crate::streaming::StreamEvent;

/// Adds two numbers.
pub struct AddNumbersTool;

#[async_trait::async_trait]
impl ToolHandler for AddNumbersTool {
    async fn call(
        &self,
        _ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> HandlerResult<serde_json::Value> {
        #[derive(serde::Deserialize)]
        struct Input {
            number1: serde_json::Number,
            number2: serde_json::Number,
        }

        let input: Input = serde_json::from_value(arguments)?;
        // Keep integer sums integral so "5 + 3" renders as "8", not "8.0".
        let sum = match (input.number1.as_i64(), input.number2.as_i64()) {
            (Some(a), Some(b)) => json!(a + b),
            _ => {
                let a = input.number1.as_f64().ok_or_else(|| {
                    HandlerError::invalid_params("number1 is not a finite number")
                })?;
                let b = input.number2.as_f64().ok_or_else(|| {
                    HandlerError::invalid_params("number2 is not a finite number")
                })?;
                json!(a + b)
            }
        };
        Ok(sum)
    }
}

/// Echoes inbound text chunks back over a fresh outbound stream.
pub struct EchoStreamTool;

#[async_trait::async_trait]
impl ToolHandler for EchoStreamTool {
    async fn call(
        &self,
        ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> HandlerResult<serde_json::Value> {
        let Some(connector) = &ctx.stream else {
            // Plain invocation: echo the message argument.
            let message = arguments.get("message").cloned().unwrap_or(json!(""));
            return Ok(json!({ "echo": message }));
        };

        let mut writer = connector.open_text(StreamMeta {
            name: Some("echo".to_string()),
            ..StreamMeta::default()
        });
        let mut echoed: u64 = 0;

        loop {
            match connector.next_event().await {
                Some(StreamEvent::TextChunk { data, .. }) => {
                    writer.write_chunk(data);
                    echoed += 1;
                }
                Some(StreamEvent::Done { .. }) | None => {
                    writer.complete(Some(json!({ "chunks": echoed })));
                    return Ok(json!({ "echoed": echoed }));
                }
                Some(StreamEvent::Error { error, .. }) => {
                    writer.fail(error.code, &error.message);
                    return Err(HandlerError::internal(error.message));
                }
                Some(StreamEvent::Started { .. } | StreamEvent::BinaryChunk { .. }) => {}
            }
        }
    }
}

/// Consumes a binary upload stream and reports what it received.
pub struct UploadBlobTool;

#[async_trait::async_trait]
impl ToolHandler for UploadBlobTool {
    async fn call(
        &self,
        ctx: &CallContext,
        _arguments: serde_json::Value,
    ) -> HandlerResult<serde_json::Value> {
        let Some(connector) = &ctx.stream else {
            return Err(HandlerError::invalid_params(
                "upload_blob requires a WebSocket streaming connection",
            ));
        };

        let mut chunks: u64 = 0;
        let mut bytes: u64 = 0;

        loop {
            match connector.next_event().await {
                Some(StreamEvent::BinaryChunk { payload, .. }) => {
                    chunks += 1;
                    bytes += payload.len() as u64;
                }
                Some(StreamEvent::Done { .. }) => {
                    return Ok(json!({ "chunks": chunks, "bytes": bytes }));
                }
                Some(StreamEvent::Error { error, .. }) => {
                    return Err(HandlerError::internal(error.message));
                }
                None => {
                    return Err(HandlerError::internal("connection closed mid-stream"));
                }
                Some(StreamEvent::Started { .. } | StreamEvent::TextChunk { .. }) => {}
            }
        }
    }
}

/// Renders a short code-review prompt.
pub struct CodeReviewPrompt;

#[async_trait::async_trait]
impl PromptHandler for CodeReviewPrompt {
    async fn get(
        &self,
        _ctx: &CallContext,
        arguments: serde_json::Value,
    ) -> HandlerResult<PromptResult> {
        let code = arguments
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerError::invalid_params("missing required argument: code"))?;

        Ok(PromptResult {
            description: Some("Code review request".to_string()),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: json!({
                    "type": "text",
                    "text": format!("Please review the following code:\n\n{code}")
                }),
            }],
        })
    }
}

/// Static welcome text.
pub struct WelcomeResource;

#[async_trait::async_trait]
impl ResourceHandler for WelcomeResource {
    async fn read(&self, _ctx: &CallContext, _uri: &str) -> HandlerResult<String> {
        Ok("Welcome to the MCP gateway. Call tools/list to see what is available.".to_string())
    }
}

/// Build the default catalog served by the binary.
#[must_use]
pub fn sample_catalog() -> Catalog {
    let mut catalog = Catalog::new();

    catalog
        .register_tool(
            ToolEntry::new(
                "add_numbers",
                json!({
                    "type": "object",
                    "properties": {
                        "number1": { "type": "number" },
                        "number2": { "type": "number" }
                    },
                    "required": ["number1", "number2"]
                }),
                Arc::new(AddNumbersTool),
            )
            .with_description("Add two numbers and return the sum.")
            .with_output_schema(json!({
                "type": "object",
                "properties": { "result": { "type": "number" } }
            })),
        )
        .expect("valid builtin tool");

    catalog
        .register_tool(
            ToolEntry::new(
                "echo_stream",
                json!({
                    "type": "object",
                    "properties": {
                        "message": { "type": "string" }
                    }
                }),
                Arc::new(EchoStreamTool),
            )
            .with_description("Echo streamed text chunks back to the caller.")
            .with_capabilities(Capabilities::STANDARD | Capabilities::TEXT_STREAMING),
        )
        .expect("valid builtin tool");

    catalog
        .register_tool(
            ToolEntry::new(
                "upload_blob",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" }
                    }
                }),
                Arc::new(UploadBlobTool),
            )
            .with_description("Receive a binary upload stream and report its size.")
            .with_capabilities(
                Capabilities::BINARY_STREAMING | Capabilities::REQUIRES_WEBSOCKET,
            ),
        )
        .expect("valid builtin tool");

    catalog
        .register_prompt(
            PromptEntry::new("code_review", Arc::new(CodeReviewPrompt))
                .with_description("Ask for a review of a code snippet.")
                .with_arguments(vec![PromptArgument {
                    name: "code".to_string(),
                    description: Some("The code to review".to_string()),
                    required: true,
                }]),
        )
        .expect("valid builtin prompt");

    catalog
        .register_resource(
            ResourceEntry::new("welcome", "file://welcome.txt", Arc::new(WelcomeResource))
                .with_description("Getting-started notes for gateway clients.")
                .with_mime_type("text/plain"),
        )
        .expect("valid builtin resource");

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_numbers_integer_sum() {
        let result = AddNumbersTool
            .call(&CallContext::default(), json!({"number1": 5, "number2": 3}))
            .await
            .unwrap();
        assert_eq!(result, json!(8));
        assert_eq!(serde_json::to_string(&result).unwrap(), "8");
    }

    #[tokio::test]
    async fn test_add_numbers_float_sum() {
        let result = AddNumbersTool
            .call(&CallContext::default(), json!({"number1": 1.5, "number2": 2}))
            .await
            .unwrap();
        assert_eq!(result, json!(3.5));
    }

    #[tokio::test]
    async fn test_add_numbers_missing_argument() {
        let error = AddNumbersTool
            .call(&CallContext::default(), json!({"number1": 5}))
            .await
            .unwrap_err();
        assert_eq!(error.rpc_code(), -32602);
    }

    #[tokio::test]
    async fn test_upload_blob_requires_stream() {
        let error =
            UploadBlobTool.call(&CallContext::default(), json!({})).await.unwrap_err();
        assert_eq!(error.rpc_code(), -32602);
    }

    #[test]
    fn test_sample_catalog_contents() {
        let catalog = sample_catalog();
        assert!(catalog.has_tools());
        assert!(catalog.has_prompts());
        assert!(catalog.has_resources());
        assert!(catalog.tool("add_numbers").is_some());
        assert!(catalog.resource_by_uri("file://welcome.txt").is_some());
    }
}
