//! Resource subscription registry.
//!
//! Maps sessions to the resource URIs they follow, with a reverse index so
//! the notification router can find the audience of a `resources/updated`
//! without scanning every session. Matching is exact string equality; URIs
//! are not normalized.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    by_session: HashMap<String, HashSet<String>>,
    by_uri: HashMap<String, HashSet<String>>,
}

/// Which sessions follow which resource URIs. Both directions are kept
/// under one lock so they cannot drift apart.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    tables: RwLock<Tables>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a session to a URI. Returns whether the set changed.
    pub async fn subscribe(&self, session_id: &str, uri: &str) -> bool {
        let mut tables = self.tables.write().await;
        let added = tables
            .by_session
            .entry(session_id.to_string())
            .or_default()
            .insert(uri.to_string());
        if added {
            tables.by_uri.entry(uri.to_string()).or_default().insert(session_id.to_string());
        }
        added
    }

    /// Unsubscribe a session from a URI. Returns whether the set changed.
    pub async fn unsubscribe(&self, session_id: &str, uri: &str) -> bool {
        let mut tables = self.tables.write().await;
        let removed =
            tables.by_session.get_mut(session_id).is_some_and(|uris| uris.remove(uri));
        if removed {
            if let Some(sessions) = tables.by_uri.get_mut(uri) {
                sessions.remove(session_id);
                if sessions.is_empty() {
                    tables.by_uri.remove(uri);
                }
            }
            if tables.by_session.get(session_id).is_some_and(HashSet::is_empty) {
                tables.by_session.remove(session_id);
            }
        }
        removed
    }

    /// Whether the session currently follows the URI.
    pub async fn is_subscribed(&self, session_id: &str, uri: &str) -> bool {
        self.tables
            .read()
            .await
            .by_session
            .get(session_id)
            .is_some_and(|uris| uris.contains(uri))
    }

    /// Sessions subscribed to exactly this URI (snapshot).
    pub async fn subscribed_sessions(&self, uri: &str) -> Vec<String> {
        self.tables
            .read()
            .await
            .by_uri
            .get(uri)
            .map(|sessions| sessions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every subscription held by a session. Called on session
    /// deletion and expiry.
    pub async fn clear_session(&self, session_id: &str) {
        let mut tables = self.tables.write().await;
        if let Some(uris) = tables.by_session.remove(session_id) {
            for uri in uris {
                if let Some(sessions) = tables.by_uri.get_mut(&uri) {
                    sessions.remove(session_id);
                    if sessions.is_empty() {
                        tables.by_uri.remove(&uri);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_unsubscribe_round_trip() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.subscribe("a", "file://x").await);
        assert!(registry.is_subscribed("a", "file://x").await);
        assert!(registry.unsubscribe("a", "file://x").await);
        assert!(!registry.is_subscribed("a", "file://x").await);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.subscribe("a", "file://x").await);
        assert!(!registry.subscribe("a", "file://x").await);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("a", "file://x").await;
        assert!(registry.unsubscribe("a", "file://x").await);
        assert!(!registry.unsubscribe("a", "file://x").await);
    }

    #[tokio::test]
    async fn test_reverse_lookup() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("a", "file://x").await;
        registry.subscribe("b", "file://x").await;
        registry.subscribe("b", "file://y").await;

        let mut sessions = registry.subscribed_sessions("file://x").await;
        sessions.sort();
        assert_eq!(sessions, ["a", "b"]);
        assert_eq!(registry.subscribed_sessions("file://y").await, ["b"]);
        assert!(registry.subscribed_sessions("file://z").await.is_empty());
    }

    #[tokio::test]
    async fn test_exact_match_no_normalization() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("a", "file://x").await;
        assert!(!registry.is_subscribed("a", "file://X").await);
        assert!(!registry.is_subscribed("a", "file://x/").await);
    }

    #[tokio::test]
    async fn test_clear_session_drops_reverse_entries() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("a", "file://x").await;
        registry.subscribe("a", "file://y").await;
        registry.clear_session("a").await;

        assert!(!registry.is_subscribed("a", "file://x").await);
        assert!(registry.subscribed_sessions("file://x").await.is_empty());
        assert!(registry.subscribed_sessions("file://y").await.is_empty());
    }
}
