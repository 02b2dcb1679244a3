//! Notification routing.
//!
//! Outbound server-to-client notifications flow through here: each target
//! session assigns the next event id, appends the message to its replay
//! buffer, and the event is broadcast to the session's live SSE streams.
//! `notifications/resources/updated` is routed per subscription; everything
//! else goes to every live session. Sessionless legacy streams receive the
//! same broadcasts with global event ids and no buffering.

use std::sync::Arc;

use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::session::buffer::BufferedEvent;
use crate::session::subscriptions::SubscriptionRegistry;
use crate::session::{EventIdGenerator, SessionRegistry};

use super::sse::SseStreamRegistry;

/// Method names the router understands.
pub mod methods {
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
    pub const MESSAGE: &str = "notifications/message";
}

/// Fans notifications out to buffers and live SSE streams.
pub struct NotificationRouter {
    sessions: Arc<SessionRegistry>,
    streams: Arc<SseStreamRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    global_events: EventIdGenerator,
}

impl NotificationRouter {
    #[must_use]
    pub fn new(
        sessions: Arc<SessionRegistry>,
        streams: Arc<SseStreamRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self { sessions, streams, subscriptions, global_events: EventIdGenerator::new() }
    }

    /// Route one outbound notification.
    pub async fn publish(&self, notification: &JsonRpcRequest) {
        debug_assert!(notification.is_notification());

        let uri = notification.params.get("uri").and_then(|v| v.as_str());
        let targets = if notification.method == methods::RESOURCES_UPDATED {
            match uri {
                // Exact-URI routing; no wildcard matching.
                Some(uri) => self.subscriptions.subscribed_sessions(uri).await,
                None => self.sessions.session_ids().await,
            }
        } else {
            self.sessions.session_ids().await
        };

        let payload = match serde_json::to_string(notification) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(method = %notification.method, %error, "Unserializable notification");
                return;
            }
        };

        tracing::debug!(
            method = %notification.method,
            sessions = targets.len(),
            "Routing notification"
        );

        for session_id in targets {
            let Some(session) = self.sessions.peek(&session_id).await else {
                continue;
            };
            let event = session.buffer_event("message", payload.clone()).await;
            self.streams.broadcast(&session.id, &event).await;
        }

        // Subscription-routed updates stay out of the sessionless streams;
        // those streams never subscribed to anything.
        if notification.method != methods::RESOURCES_UPDATED || uri.is_none() {
            let event =
                BufferedEvent::new(self.global_events.next(None), "message", payload);
            self.streams.broadcast_sessionless(&event).await;
        }
    }

    /// Deliver a request's response into the session buffer and streams.
    ///
    /// Used by the HTTP transport so responses to long calls survive a
    /// reconnect via `Last-Event-ID` replay.
    pub async fn publish_response(&self, session_id: &str, response: &JsonRpcResponse) {
        let Some(session) = self.sessions.peek(session_id).await else {
            return;
        };
        let Ok(payload) = serde_json::to_string(response) else {
            return;
        };
        let event = session.buffer_event("message", payload).await;
        self.streams.broadcast(&session.id, &event).await;
    }

    /// Notify all sessions that the tool catalog changed.
    pub async fn tools_list_changed(&self) {
        self.publish(&Self::notification(methods::TOOLS_LIST_CHANGED, serde_json::Value::Null))
            .await;
    }

    /// Notify all sessions that the prompt catalog changed.
    pub async fn prompts_list_changed(&self) {
        self.publish(&Self::notification(methods::PROMPTS_LIST_CHANGED, serde_json::Value::Null))
            .await;
    }

    /// Notify subscribers of `uri` that the resource changed.
    pub async fn resource_updated(&self, uri: &str) {
        self.publish(&Self::notification(
            methods::RESOURCES_UPDATED,
            serde_json::json!({ "uri": uri }),
        ))
        .await;
    }

    /// Broadcast a logging message to every session.
    pub async fn log_message(&self, level: &str, data: serde_json::Value) {
        self.publish(&Self::notification(
            methods::MESSAGE,
            serde_json::json!({ "level": level, "data": data }),
        ))
        .await;
    }

    fn notification(method: &str, params: serde_json::Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: JsonRpcResponse::VERSION.to_string(),
            method: method.to_string(),
            params,
            id: None,
        }
    }
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter").finish()
    }
}
