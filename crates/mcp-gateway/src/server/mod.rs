//! Gateway server wiring.
//!
//! Ties the catalog, dispatcher, registries and transports together. The
//! host populates a [`Catalog`], optionally registers invocation hooks, and
//! runs the server over HTTP (Streamable HTTP + SSE + WebSocket) or stdio.

pub mod dispatcher;
pub mod hooks;
pub mod router;
pub mod sse;
pub mod stdio;
pub mod transport;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::session::SessionRegistry;
use crate::session::subscriptions::SubscriptionRegistry;

use dispatcher::Dispatcher;
use hooks::{HookRunner, InvocationHook};
use router::NotificationRouter;
use sse::SseStreamRegistry;
use transport::GatewayState;

/// The MCP gateway engine.
pub struct GatewayServer {
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Create a server over a populated catalog.
    #[must_use]
    pub fn new(catalog: Catalog, config: Config) -> Self {
        Self::with_hooks(catalog, config, Vec::new())
    }

    /// Create a server with invocation hooks (metrics, audit, authorization).
    #[must_use]
    pub fn with_hooks(
        catalog: Catalog,
        config: Config,
        hooks: Vec<Arc<dyn InvocationHook>>,
    ) -> Self {
        let config = Arc::new(config);
        let catalog = Arc::new(catalog);
        let sessions = Arc::new(SessionRegistry::new(
            config.session_timeout,
            config.buffer_capacity(),
        ));
        let streams = Arc::new(SseStreamRegistry::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let notifications = Arc::new(NotificationRouter::new(
            Arc::clone(&sessions),
            Arc::clone(&streams),
            Arc::clone(&subscriptions),
        ));
        let dispatcher = Dispatcher::new(
            catalog,
            Arc::clone(&subscriptions),
            HookRunner::new(hooks),
            Arc::clone(&config),
        );

        let state = Arc::new(GatewayState {
            dispatcher,
            sessions,
            streams,
            subscriptions,
            notifications,
            config,
        });

        Self { state }
    }

    /// Outbound notification entry point for the host.
    #[must_use]
    pub fn notifications(&self) -> Arc<NotificationRouter> {
        Arc::clone(&self.state.notifications)
    }

    /// The axum router serving every HTTP-based transport.
    #[must_use]
    pub fn router(&self) -> axum::Router {
        transport::create_router(Arc::clone(&self.state))
    }

    /// Spawn the periodic sweep that expires idle sessions and releases
    /// their streams and subscriptions.
    pub fn start_session_sweeper(&self) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(state.config.session_sweep_interval);
            loop {
                interval.tick().await;
                let expired = state.sessions.sweep_expired().await;
                for session_id in &expired {
                    state.subscriptions.clear_session(session_id).await;
                    state.streams.clear_session(session_id).await;
                }
                if !expired.is_empty() {
                    tracing::debug!(count = expired.len(), "Session sweep completed");
                }
            }
        });
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error on bind or server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        tracing::info!(port, "Starting MCP gateway in HTTP mode");
        self.start_session_sweeper();

        let router = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// Run the server in stdio mode (for desktop clients).
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure.
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        tracing::info!("Starting MCP gateway in stdio mode");
        stdio::run_stdio(&self.state.dispatcher).await
    }
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer").finish()
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to install CTRL+C handler");
        return;
    }
    tracing::info!("Received shutdown signal");
}
