//! Tests for method routing, error mapping, capability gating and hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use mcp_gateway::catalog::{CallContext, Catalog, TransportKind, builtin};
use mcp_gateway::config::Config;
use mcp_gateway::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use mcp_gateway::server::dispatcher::Dispatcher;
use mcp_gateway::server::hooks::{HookRejection, HookRunner, InvocationHook};
use mcp_gateway::session::subscriptions::SubscriptionRegistry;

fn dispatcher_for(catalog: Catalog) -> (Dispatcher, Arc<SubscriptionRegistry>) {
    let subscriptions = Arc::new(SubscriptionRegistry::new());
    let dispatcher = Dispatcher::new(
        Arc::new(catalog),
        Arc::clone(&subscriptions),
        HookRunner::default(),
        Arc::new(Config::for_testing()),
    );
    (dispatcher, subscriptions)
}

fn request(method: &str, params: Value, id: Option<Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id,
    }
}

fn http_ctx() -> CallContext {
    CallContext::for_transport(TransportKind::Http)
}

async fn dispatch(dispatcher: &Dispatcher, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
    dispatcher.dispatch(req, &http_ctx()).await
}

// ─── Reserved method routing ────────────────────────────────────────────────

#[tokio::test]
async fn test_ping() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response =
        dispatch(&dispatcher, request("ping", Value::Null, Some(json!(1)))).await.unwrap();
    assert_eq!(response.result.unwrap(), json!({}));
}

#[tokio::test]
async fn test_unknown_method_is_32601() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response =
        dispatch(&dispatcher, request("no/such/method", Value::Null, Some(json!(1))))
            .await
            .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn test_invalid_envelope_is_32600() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let mut req = request("ping", Value::Null, Some(json!(1)));
    req.jsonrpc = "1.0".to_string();
    let response = dispatch(&dispatcher, req).await.unwrap();
    assert_eq!(response.error.unwrap().code, -32600);
}

#[tokio::test]
async fn test_notifications_produce_no_response_even_on_error() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    // Unknown method as a notification: error swallowed.
    assert!(dispatch(&dispatcher, request("no/such/method", Value::Null, None)).await.is_none());
    // Failing tool call as a notification: also swallowed.
    let req = request("tools/call", json!({"name": "does_not_exist"}), None);
    assert!(dispatch(&dispatcher, req).await.is_none());
}

#[tokio::test]
async fn test_initialize_reports_only_populated_kinds() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response =
        dispatch(&dispatcher, request("initialize", Value::Null, Some(json!(1)))).await.unwrap();
    let result = response.result.unwrap();
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["prompts"].is_object());
    assert!(result["capabilities"]["resources"]["subscribe"].as_bool().unwrap());
    assert_eq!(result["capabilities"]["notifications"]["tools"], true);

    // Empty catalog: no capabilities at all.
    let (empty, _) = dispatcher_for(Catalog::new());
    let response =
        dispatch(&empty, request("initialize", Value::Null, Some(json!(1)))).await.unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["capabilities"], json!({}));
}

#[tokio::test]
async fn test_response_id_matches_request_id() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    for id in [json!(7), json!("alpha")] {
        let response =
            dispatch(&dispatcher, request("ping", Value::Null, Some(id.clone()))).await.unwrap();
        assert_eq!(response.id.unwrap(), id);
    }
}

// ─── Tool calls ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tool_call_missing_name_is_32602() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response =
        dispatch(&dispatcher, request("tools/call", json!({}), Some(json!(1)))).await.unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_tool_call_unknown_tool_is_32601() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request("tools/call", json!({"name": "missing"}), Some(json!(1))),
    )
    .await
    .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn test_tool_call_invalid_arguments_is_32602() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request(
            "tools/call",
            json!({"name": "add_numbers", "arguments": {"number1": "five"}}),
            Some(json!(1)),
        ),
    )
    .await
    .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_websocket_only_tool_rejected_on_http() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request("tools/call", json!({"name": "upload_blob"}), Some(json!(1))),
    )
    .await
    .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, -32601);
    assert!(error.message.contains("Streaming not supported over http"));
}

#[tokio::test]
async fn test_direct_method_invocation() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request("add_numbers", json!({"number1": 2, "number2": 2}), Some(json!(1))),
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["content"][0]["text"], "4");
}

// ─── Prompts and resources ──────────────────────────────────────────────────

#[tokio::test]
async fn test_prompt_get() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request(
            "prompts/get",
            json!({"name": "code_review", "arguments": {"code": "fn main() {}"}}),
            Some(json!(1)),
        ),
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["messages"][0]["role"], "user");
    assert!(result["messages"][0]["content"]["text"].as_str().unwrap().contains("fn main()"));
}

#[tokio::test]
async fn test_prompt_get_missing_required_argument() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request("prompts/get", json!({"name": "code_review"}), Some(json!(1))),
    )
    .await
    .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_resource_read() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request("resources/read", json!({"uri": "file://welcome.txt"}), Some(json!(1))),
    )
    .await
    .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["contents"][0]["uri"], "file://welcome.txt");
    assert_eq!(result["contents"][0]["mimeType"], "text/plain");
    assert!(result["contents"][0]["text"].as_str().unwrap().contains("gateway"));
}

#[tokio::test]
async fn test_resource_read_unknown_uri_is_32602() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request("resources/read", json!({"uri": "file://missing"}), Some(json!(1))),
    )
    .await
    .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

// ─── Subscriptions ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_requires_session() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let response = dispatch(
        &dispatcher,
        request("resources/subscribe", json!({"uri": "file://welcome.txt"}), Some(json!(1))),
    )
    .await
    .unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_with_session() {
    let (dispatcher, subscriptions) = dispatcher_for(builtin::sample_catalog());
    let ctx = CallContext {
        transport: Some(TransportKind::Http),
        session_id: Some("abc".to_string()),
        stream: None,
    };

    let req = request("resources/subscribe", json!({"uri": "file://welcome.txt"}), Some(json!(1)));
    let response = dispatcher.dispatch(req, &ctx).await.unwrap();
    assert!(response.error.is_none());
    assert!(subscriptions.is_subscribed("abc", "file://welcome.txt").await);

    // Subscribing twice is fine.
    let req = request("resources/subscribe", json!({"uri": "file://welcome.txt"}), Some(json!(2)));
    assert!(dispatcher.dispatch(req, &ctx).await.unwrap().error.is_none());

    let req =
        request("resources/unsubscribe", json!({"uri": "file://welcome.txt"}), Some(json!(3)));
    assert!(dispatcher.dispatch(req, &ctx).await.unwrap().error.is_none());
    assert!(!subscriptions.is_subscribed("abc", "file://welcome.txt").await);
}

#[tokio::test]
async fn test_subscribe_unknown_uri_is_32602() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());
    let ctx = CallContext {
        transport: Some(TransportKind::Http),
        session_id: Some("abc".to_string()),
        stream: None,
    };
    let req = request("resources/subscribe", json!({"uri": "file://nope"}), Some(json!(1)));
    let response = dispatcher.dispatch(req, &ctx).await.unwrap();
    assert_eq!(response.error.unwrap().code, -32602);
}

// ─── Hooks ──────────────────────────────────────────────────────────────────

struct Recording {
    invoked: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

#[async_trait::async_trait]
impl InvocationHook for Recording {
    async fn on_invoking(&self, _name: &str, _request: &Value) -> Result<(), HookRejection> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_completed(&self, _name: &str, _response: &Value, _duration: Duration) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_failed(&self, _name: &str, _error: &str, _duration: Duration) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

struct DenyUploads;

#[async_trait::async_trait]
impl InvocationHook for DenyUploads {
    async fn on_invoking(&self, name: &str, _request: &Value) -> Result<(), HookRejection> {
        if name == "add_numbers" {
            Err(HookRejection::new("insufficient permissions"))
        } else {
            Ok(())
        }
    }
}

fn hooked_dispatcher(hooks: Vec<Arc<dyn InvocationHook>>) -> Dispatcher {
    Dispatcher::new(
        Arc::new(builtin::sample_catalog()),
        Arc::new(SubscriptionRegistry::new()),
        HookRunner::new(hooks),
        Arc::new(Config::for_testing()),
    )
}

#[tokio::test]
async fn test_hook_veto_is_32603_with_hook_message() {
    let dispatcher = hooked_dispatcher(vec![Arc::new(DenyUploads)]);
    let response = dispatch(
        &dispatcher,
        request(
            "tools/call",
            json!({"name": "add_numbers", "arguments": {"number1": 1, "number2": 1}}),
            Some(json!(1)),
        ),
    )
    .await
    .unwrap();

    let error = response.error.unwrap();
    assert_eq!(error.code, -32603);
    assert_eq!(error.message, "insufficient permissions");
}

#[tokio::test]
async fn test_hooks_observe_success_and_failure() {
    let recording = Arc::new(Recording {
        invoked: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
        failed: AtomicUsize::new(0),
    });
    let dispatcher = hooked_dispatcher(vec![recording.clone()]);

    let ok = request(
        "tools/call",
        json!({"name": "add_numbers", "arguments": {"number1": 1, "number2": 1}}),
        Some(json!(1)),
    );
    dispatch(&dispatcher, ok).await.unwrap();

    let bad = request(
        "tools/call",
        json!({"name": "add_numbers", "arguments": {}}),
        Some(json!(2)),
    );
    dispatch(&dispatcher, bad).await.unwrap();

    // Completion hooks are fire-and-forget; give them a beat.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recording.invoked.load(Ordering::SeqCst), 2);
    assert_eq!(recording.completed.load(Ordering::SeqCst), 1);
    assert_eq!(recording.failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hooks_skip_reserved_methods() {
    let recording = Arc::new(Recording {
        invoked: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
        failed: AtomicUsize::new(0),
    });
    let dispatcher = hooked_dispatcher(vec![recording.clone()]);

    dispatch(&dispatcher, request("initialize", Value::Null, Some(json!(1)))).await.unwrap();
    dispatch(&dispatcher, request("tools/list", Value::Null, Some(json!(2)))).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recording.invoked.load(Ordering::SeqCst), 0);
}

// ─── Listing over transports ────────────────────────────────────────────────

#[tokio::test]
async fn test_tools_list_filters_by_transport() {
    let (dispatcher, _) = dispatcher_for(builtin::sample_catalog());

    let response =
        dispatch(&dispatcher, request("tools/list", Value::Null, Some(json!(1)))).await.unwrap();
    let names: Vec<String> = response.result.unwrap()["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    // upload_blob is WebSocket-only; it must not be listed over HTTP.
    assert!(names.contains(&"add_numbers".to_string()));
    assert!(names.contains(&"echo_stream".to_string()));
    assert!(!names.contains(&"upload_blob".to_string()));

    let ws_ctx = CallContext::for_transport(TransportKind::Ws);
    let req = request("tools/list", Value::Null, Some(json!(2)));
    let response = dispatcher.dispatch(req, &ws_ctx).await.unwrap();
    let names: Vec<String> = response.result.unwrap()["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"upload_blob".to_string()));
}

#[tokio::test]
async fn test_lists_always_return_something() {
    let (dispatcher, _) = dispatcher_for(Catalog::new());
    for method in ["tools/list", "prompts/list", "resources/list"] {
        let response =
            dispatch(&dispatcher, request(method, Value::Null, Some(json!(1)))).await.unwrap();
        assert!(response.error.is_none());
    }
}
