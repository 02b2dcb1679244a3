//! WebSocket streaming transport.
//!
//! One persistent connection carries JSON-RPC envelopes and stream frames
//! as text, and chunk payloads as binary. A single writer task owns the
//! sink so concurrent producers cannot interleave partial frames. Streaming
//! tools are driven through a [`StreamConnector`]; a `start` frame naming a
//! streaming tool in `meta.method` is accepted as an implicit invocation.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::catalog::{CallContext, Capabilities, TransportKind};
use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, code};
use crate::protocol::stream::{StreamMessage, StreamMessageType};
use crate::streaming::{StreamConnector, StreamInbox, WsFrame};

use super::transport::GatewayState;

/// WebSocket upgrade handler for /ws.
pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// The streaming handler currently owning this connection's inbound frames.
struct ActiveStream {
    inbox: StreamInbox,
    task: JoinHandle<()>,
}

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sink, mut inbound) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsFrame>();

    tracing::info!("WebSocket connected");

    // Writer task: sole owner of the sink.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let message = match frame {
                WsFrame::Text(text) => Message::Text(text.into()),
                WsFrame::Binary(bytes) => Message::Binary(bytes.into()),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut active: Option<ActiveStream> = None;

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_text(&state, &out_tx, &mut active, text.as_str());
            }
            Ok(Message::Binary(payload)) => {
                handle_binary(&out_tx, active.as_ref(), &payload);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong are answered by the protocol layer
            Err(error) => {
                tracing::debug!(%error, "WebSocket read failed");
                break;
            }
        }
    }

    if let Some(active) = active.take() {
        active.inbox.fail_all("Connection closed");
    }
    drop(out_tx);
    let _ = writer.await;
    tracing::info!("WebSocket disconnected");
}

fn send_frame(out_tx: &mpsc::UnboundedSender<WsFrame>, frame: WsFrame) {
    let _ = out_tx.send(frame);
}

fn send_response(out_tx: &mpsc::UnboundedSender<WsFrame>, response: &JsonRpcResponse) {
    if let Ok(text) = serde_json::to_string(response) {
        send_frame(out_tx, WsFrame::Text(text));
    }
}

fn handle_text(
    state: &Arc<GatewayState>,
    out_tx: &mpsc::UnboundedSender<WsFrame>,
    active: &mut Option<ActiveStream>,
    text: &str,
) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(error) => {
            send_response(
                out_tx,
                &JsonRpcResponse::error(None, code::PARSE_ERROR, format!("Parse error: {error}")),
            );
            return;
        }
    };

    if value.get("jsonrpc").is_some() {
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => handle_envelope(state, out_tx, active, request),
            Err(error) => send_response(
                out_tx,
                &JsonRpcResponse::error(
                    None,
                    code::INVALID_REQUEST,
                    format!("Invalid request: {error}"),
                ),
            ),
        }
        return;
    }

    match serde_json::from_value::<StreamMessage>(value) {
        Ok(message) => handle_stream_message(state, out_tx, active, message),
        Err(_) => send_response(
            out_tx,
            &JsonRpcResponse::error(None, code::INVALID_REQUEST, "Unrecognized frame"),
        ),
    }
}

/// The tool name a request targets, when that tool is streaming-capable.
fn streaming_tool_name(state: &GatewayState, request: &JsonRpcRequest) -> Option<String> {
    let name = if request.method == "tools/call" {
        request.params.get("name").and_then(|v| v.as_str())?.to_string()
    } else {
        request.method.clone()
    };
    let entry = state.dispatcher.catalog().tool(&name)?;
    entry
        .capabilities
        .intersects(Capabilities::TEXT_STREAMING | Capabilities::BINARY_STREAMING)
        .then_some(name)
}

fn handle_envelope(
    state: &Arc<GatewayState>,
    out_tx: &mpsc::UnboundedSender<WsFrame>,
    active: &mut Option<ActiveStream>,
    request: JsonRpcRequest,
) {
    if streaming_tool_name(state, &request).is_some() {
        if active.as_ref().is_some_and(|a| !a.task.is_finished()) {
            send_response(
                out_tx,
                &JsonRpcResponse::error(
                    request.id,
                    code::TRANSPORT_ERROR,
                    "A streaming call is already active on this connection",
                ),
            );
            return;
        }
        *active = Some(spawn_streaming_call(state, out_tx, request, None));
        return;
    }

    // Plain request/response. Handlers may suspend, so they run off the
    // read loop; the writer task keeps response frames atomic.
    let state = Arc::clone(state);
    let out_tx = out_tx.clone();
    tokio::spawn(async move {
        let ctx = CallContext::for_transport(TransportKind::Ws);
        if let Some(response) = state.dispatcher.dispatch(request, &ctx).await {
            send_response(&out_tx, &response);
        }
    });
}

fn handle_stream_message(
    state: &Arc<GatewayState>,
    out_tx: &mpsc::UnboundedSender<WsFrame>,
    active: &mut Option<ActiveStream>,
    message: StreamMessage,
) {
    if let Some(current) = active.as_ref() {
        if !current.task.is_finished() {
            current.inbox.accept_message(message);
            return;
        }
    }

    // No live handler. A start frame naming a streaming tool acts as an
    // implicit invocation; the stream id becomes the response id.
    if message.message_type == StreamMessageType::Start {
        let method = message.meta.as_ref().and_then(|meta| meta.method.clone());
        if let Some(method) = method {
            let request = JsonRpcRequest {
                jsonrpc: JsonRpcResponse::VERSION.to_string(),
                method: "tools/call".to_string(),
                params: serde_json::json!({ "name": method, "arguments": {} }),
                id: Some(serde_json::json!(message.id)),
            };
            if streaming_tool_name(state, &request).is_some() {
                *active = Some(spawn_streaming_call(state, out_tx, request, Some(message)));
                return;
            }
        }
    }

    let frame =
        StreamMessage::error(message.id, code::TRANSPORT_ERROR, "No active stream handler");
    if let Ok(text) = serde_json::to_string(&frame) {
        send_frame(out_tx, WsFrame::Text(text));
    }
}

/// Spawn a streaming tool invocation with a fresh connector; the response
/// envelope is written when the handler returns.
fn spawn_streaming_call(
    state: &Arc<GatewayState>,
    out_tx: &mpsc::UnboundedSender<WsFrame>,
    request: JsonRpcRequest,
    initial: Option<StreamMessage>,
) -> ActiveStream {
    let (connector, inbox) =
        StreamConnector::new(out_tx.clone(), state.config.stream_idle_timeout);
    if let Some(message) = initial {
        inbox.accept_message(message);
    }

    let state = Arc::clone(state);
    let out_tx = out_tx.clone();
    let task = tokio::spawn(async move {
        let ctx = CallContext {
            transport: Some(TransportKind::Ws),
            session_id: None,
            stream: Some(connector),
        };
        if let Some(response) = state.dispatcher.dispatch(request, &ctx).await {
            send_response(&out_tx, &response);
        }
    });

    ActiveStream { inbox, task }
}

fn handle_binary(
    out_tx: &mpsc::UnboundedSender<WsFrame>,
    active: Option<&ActiveStream>,
    payload: &Bytes,
) {
    match active {
        Some(current) => current.inbox.accept_binary(payload),
        None => {
            let frame = StreamMessage::error(
                Uuid::nil().to_string(),
                code::TRANSPORT_ERROR,
                "No active stream handler",
            );
            if let Ok(text) = serde_json::to_string(&frame) {
                send_frame(out_tx, WsFrame::Text(text));
            }
        }
    }
}
