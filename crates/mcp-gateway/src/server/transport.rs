//! HTTP transport layer.
//!
//! Implements the Streamable HTTP transport on a single `/mcp` path
//! (POST for envelopes, GET for the SSE stream, DELETE for session
//! teardown) plus the deprecated stateless `/rpc` and sessionless `/sse`
//! endpoints, which reuse the same dispatcher. Reconnecting clients replay
//! missed events via `Last-Event-ID`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures::stream::{self, Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::{CallContext, TransportKind};
use crate::config::Config;
use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, RpcBody, code};
use crate::protocol::version::{self, Negotiation};
use crate::session::buffer::BufferedEvent;
use crate::session::{Session, SessionRegistry};
use crate::session::subscriptions::SubscriptionRegistry;

use super::dispatcher::Dispatcher;
use super::router::NotificationRouter;
use super::sse::SseStreamRegistry;
use super::ws;

/// Session id header, echoed on every response that has a session.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// Protocol version negotiation header.
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

/// SSE reconnection header.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// Shared state for all transport handlers.
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub sessions: Arc<SessionRegistry>,
    pub streams: Arc<SseStreamRegistry>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub notifications: Arc<NotificationRouter>,
    pub config: Arc<Config>,
}

/// Create the HTTP router for the gateway.
pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Streamable HTTP transport - single endpoint
        .route(
            "/mcp",
            get(handle_mcp_get).post(handle_mcp_post).delete(handle_mcp_delete),
        )
        // Legacy transports for backward compatibility
        .route("/rpc", axum::routing::post(handle_rpc_post))
        .route("/sse", get(handle_sse_legacy))
        // WebSocket streaming transport
        .route("/ws", get(ws::handle_upgrade))
        // Session management
        .route("/sessions", get(handle_sessions_list))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.count().await,
        "protocolVersion": state.config.protocol_version,
    }))
}

/// List active sessions (for debugging).
async fn handle_sessions_list(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "count": state.sessions.count().await }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn session_header_value(id: &str) -> HeaderValue {
    HeaderValue::from_str(id).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    response.headers_mut().insert(SESSION_ID_HEADER, session_header_value(session_id));
    response
}

/// Validate the protocol version header; rejection is a ready-made 400.
fn check_protocol_version(headers: &HeaderMap) -> Result<&'static str, Response> {
    match version::negotiate(header_str(headers, PROTOCOL_VERSION_HEADER)) {
        Negotiation::Accepted(accepted) => Ok(accepted),
        Negotiation::Rejected { requested } => {
            tracing::warn!(requested = %requested, "Rejected protocol version");
            Err((
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    None,
                    code::VERSION_MISMATCH,
                    version::unsupported_message(&requested),
                )),
            )
                .into_response())
        }
    }
}

/// 404 with a re-initialize hint, the distinct signal for lost sessions.
fn session_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(JsonRpcResponse::error(
            None,
            code::TRANSPORT_ERROR,
            "Session not found or expired. Send an initialize request to create a new session.",
        )),
    )
        .into_response()
}

/// Release per-session state held outside the session registry. Idempotent;
/// called when a presented session id turns out to be dead, so lazily
/// purged sessions do not leak subscriptions or stream handles.
async fn release_session_state(state: &GatewayState, session_id: &str) {
    state.subscriptions.clear_session(session_id).await;
    state.streams.clear_session(session_id).await;
}

/// Resolve the session for a POST: reuse a valid one, create on
/// `initialize`, reject otherwise.
async fn resolve_session(
    state: &GatewayState,
    session_header: Option<&str>,
    allow_create: bool,
) -> Result<Arc<Session>, Response> {
    if let Some(id) = session_header {
        if let Some(session) = state.sessions.get(id).await {
            return Ok(session);
        }
        release_session_state(state, id).await;
    }
    if allow_create {
        return Ok(state.sessions.create().await);
    }
    Err(session_not_found())
}

/// Handle POST requests to /mcp (Streamable HTTP transport).
async fn handle_mcp_post(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = check_protocol_version(&headers) {
        return rejection;
    }
    let session_header = header_str(&headers, SESSION_ID_HEADER);

    let body = match RpcBody::decode(&body) {
        Ok(body) => body,
        Err(error) => {
            return Json(JsonRpcResponse::error(
                None,
                code::PARSE_ERROR,
                format!("Parse error: {error}"),
            ))
            .into_response();
        }
    };

    match body {
        RpcBody::Single(request) => {
            let allow_create = request.method == "initialize";
            let session = match resolve_session(&state, session_header, allow_create).await {
                Ok(session) => session,
                Err(rejection) => return rejection,
            };
            let response = dispatch_http(&state, &session, request).await;
            let response = match response {
                None => StatusCode::NO_CONTENT.into_response(),
                Some(envelope) => Json(envelope).into_response(),
            };
            with_session_header(response, &session.id)
        }
        RpcBody::Batch(requests) => {
            let allow_create = requests.iter().any(|r| r.method == "initialize");
            let session = match resolve_session(&state, session_header, allow_create).await {
                Ok(session) => session,
                Err(rejection) => return rejection,
            };

            // One entry per request in input order; notifications omitted.
            let mut responses = Vec::new();
            for request in requests {
                if let Some(envelope) = dispatch_http(&state, &session, request).await {
                    responses.push(envelope);
                }
            }

            let response = if responses.is_empty() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                Json(responses).into_response()
            };
            with_session_header(response, &session.id)
        }
    }
}

async fn dispatch_http(
    state: &GatewayState,
    session: &Arc<Session>,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let ctx = CallContext {
        transport: Some(TransportKind::Http),
        session_id: Some(session.id.clone()),
        stream: None,
    };
    let is_tool_call = request.method == "tools/call";
    let response = state.dispatcher.dispatch(request, &ctx).await;

    // Successful tool results also land in the session buffer, so a client
    // that reconnects mid-call can recover them via Last-Event-ID replay.
    if is_tool_call {
        if let Some(envelope) = &response {
            if envelope.result.is_some() {
                state.notifications.publish_response(&session.id, envelope).await;
            }
        }
    }
    response
}

fn to_sse_event(event: &BufferedEvent) -> Event {
    Event::default().id(event.event_id.clone()).event(event.event_type.clone()).data(event.data.clone())
}

/// Handle GET requests to /mcp (SSE stream for server-initiated messages).
async fn handle_mcp_get(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = check_protocol_version(&headers) {
        return rejection;
    }
    let Some(session_id) = header_str(&headers, SESSION_ID_HEADER) else {
        return session_not_found();
    };
    let Some(session) = state.sessions.get(session_id).await else {
        release_session_state(&state, session_id).await;
        return session_not_found();
    };

    let last_event_id = header_str(&headers, LAST_EVENT_ID_HEADER).map(str::to_string);
    tracing::info!(
        session_id = %session.id,
        last_event_id = ?last_event_id,
        "New SSE stream connection"
    );

    let (_handle, receiver) = state.streams.register(&session.id).await;
    let missed = session.replay_after(last_event_id.as_deref()).await;
    let stream = build_sse_stream(missed, receiver);

    let response = (
        [
            ("X-Accel-Buffering", "no"),
            ("Cache-Control", "no-cache"),
        ],
        Sse::new(stream).keep_alive(
            KeepAlive::new().interval(state.config.sse_keep_alive).text("keep-alive"),
        ),
    )
        .into_response();
    with_session_header(response, &session.id)
}

/// Build an SSE stream: replay of missed events, then live events.
fn build_sse_stream(
    missed: Vec<BufferedEvent>,
    receiver: tokio::sync::mpsc::UnboundedReceiver<BufferedEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let replay_stream = stream::iter(missed.into_iter().map(|event| {
        tracing::debug!(event_id = %event.event_id, "Replaying missed event");
        Ok::<_, Infallible>(to_sse_event(&event))
    }));

    let live_stream =
        UnboundedReceiverStream::new(receiver).map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    replay_stream.chain(live_stream)
}

/// Handle DELETE requests to /mcp (explicit session teardown).
async fn handle_mcp_delete(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = check_protocol_version(&headers) {
        return rejection;
    }
    let Some(session_id) = header_str(&headers, SESSION_ID_HEADER) else {
        return session_not_found();
    };
    if state.sessions.get(session_id).await.is_none() {
        release_session_state(&state, session_id).await;
        return session_not_found();
    }

    state.sessions.remove(session_id).await;
    release_session_state(&state, session_id).await;

    (StatusCode::OK, Json(serde_json::json!({ "status": "deleted" }))).into_response()
}

/// Handle POST requests to /rpc (legacy stateless transport).
async fn handle_rpc_post(State(state): State<Arc<GatewayState>>, body: Bytes) -> Response {
    let body = match RpcBody::decode(&body) {
        Ok(body) => body,
        Err(error) => {
            return Json(JsonRpcResponse::error(
                None,
                code::PARSE_ERROR,
                format!("Parse error: {error}"),
            ))
            .into_response();
        }
    };

    let ctx = CallContext::for_transport(TransportKind::Http);
    match body {
        RpcBody::Single(request) => match state.dispatcher.dispatch(request, &ctx).await {
            None => StatusCode::NO_CONTENT.into_response(),
            Some(envelope) => Json(envelope).into_response(),
        },
        RpcBody::Batch(requests) => {
            let mut responses = Vec::new();
            for request in requests {
                if let Some(envelope) = state.dispatcher.dispatch(request, &ctx).await {
                    responses.push(envelope);
                }
            }
            if responses.is_empty() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                Json(responses).into_response()
            }
        }
    }
}

/// Legacy sessionless SSE endpoint.
///
/// No session, no buffering, no replay: the stream announces the companion
/// /rpc endpoint, then carries global broadcasts until the client goes away.
async fn handle_sse_legacy(State(state): State<Arc<GatewayState>>) -> Response {
    let (_handle, receiver) = state.streams.register_sessionless().await;
    tracing::info!("New legacy SSE connection");

    let endpoint = Event::default()
        .id("0")
        .event("endpoint")
        .data(serde_json::json!({ "endpoint": "/rpc" }).to_string());
    let initial = stream::iter([Ok::<_, Infallible>(endpoint)]);
    let live =
        UnboundedReceiverStream::new(receiver).map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    (
        [
            ("X-Accel-Buffering", "no"),
            ("Cache-Control", "no-cache"),
            ("Connection", "keep-alive"),
        ],
        Sse::new(initial.chain(live)).keep_alive(
            KeepAlive::new().interval(state.config.sse_keep_alive).text("keep-alive"),
        ),
    )
        .into_response()
}
