//! Lifecycle hooks around procedure invocation.
//!
//! Hosts register hooks for cross-cutting concerns (metrics, audit,
//! authorization). `on_invoking` is awaited and may short-circuit the call;
//! the completion and failure hooks are fire-and-forget so they never sit
//! on the invocation critical path.

use std::sync::Arc;
use std::time::Duration;

/// A hook's veto of an invocation. Surfaced to the client as an internal
/// error carrying the hook's message.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct HookRejection {
    pub message: String,
}

impl HookRejection {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Observer of user-procedure invocations. Reserved protocol methods
/// (`initialize`, listings, subscriptions) are not observed.
#[async_trait::async_trait]
pub trait InvocationHook: Send + Sync {
    /// Runs before the handler. Returning an error cancels the invocation.
    async fn on_invoking(
        &self,
        _name: &str,
        _request: &serde_json::Value,
    ) -> Result<(), HookRejection> {
        Ok(())
    }

    /// Runs after a successful invocation, off the critical path.
    async fn on_completed(&self, _name: &str, _response: &serde_json::Value, _duration: Duration) {}

    /// Runs after a failed invocation, off the critical path.
    async fn on_failed(&self, _name: &str, _error: &str, _duration: Duration) {}
}

/// Executes registered hooks in registration order.
#[derive(Clone, Default)]
pub struct HookRunner {
    hooks: Arc<Vec<Arc<dyn InvocationHook>>>,
}

impl HookRunner {
    #[must_use]
    pub fn new(hooks: Vec<Arc<dyn InvocationHook>>) -> Self {
        Self { hooks: Arc::new(hooks) }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run `on_invoking` for every hook in order; the first rejection wins.
    pub async fn before(
        &self,
        name: &str,
        request: &serde_json::Value,
    ) -> Result<(), HookRejection> {
        for hook in self.hooks.iter() {
            if let Err(rejection) = hook.on_invoking(name, request).await {
                tracing::debug!(procedure = %name, reason = %rejection, "Invocation vetoed by hook");
                return Err(rejection);
            }
        }
        Ok(())
    }

    /// Fire `on_completed` on a detached task.
    pub fn after_success(&self, name: &str, response: serde_json::Value, duration: Duration) {
        if self.hooks.is_empty() {
            return;
        }
        let hooks = Arc::clone(&self.hooks);
        let name = name.to_string();
        tokio::spawn(async move {
            for hook in hooks.iter() {
                hook.on_completed(&name, &response, duration).await;
            }
        });
    }

    /// Fire `on_failed` on a detached task.
    pub fn after_failure(&self, name: &str, error: String, duration: Duration) {
        if self.hooks.is_empty() {
            return;
        }
        let hooks = Arc::clone(&self.hooks);
        let name = name.to_string();
        tokio::spawn(async move {
            for hook in hooks.iter() {
                hook.on_failed(&name, &error, duration).await;
            }
        });
    }
}

impl std::fmt::Debug for HookRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRunner").field("hooks", &self.hooks.len()).finish()
    }
}
