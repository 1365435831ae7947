//! Pending login state, correlating a login start with its provider callback.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// State recorded when a login flow starts.
#[derive(Debug, Clone)]
pub struct PendingState {
    pub token: String,
    /// Continuation payload handed back once after login.
    pub payload: serde_json::Value,
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingState {
    pub fn new(payload: serde_json::Value, code_verifier: Option<String>) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            payload,
            code_verifier,
            created_at: Utc::now(),
        }
    }
}

/// Storage for pending login state
#[async_trait]
pub trait PendingStateStore: Send + Sync {
    /// Store a new state
    async fn store(&self, state: PendingState);

    /// Look up a state without consuming it
    async fn get(&self, token: &str) -> Option<PendingState>;

    /// Retrieve and remove a state
    async fn take(&self, token: &str) -> Option<PendingState>;

    /// Remove states created more than `max_age` ago
    async fn purge_older_than(&self, max_age: Duration) -> usize;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory implementation of PendingStateStore
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, PendingState>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingStateStore for InMemoryStateStore {
    async fn store(&self, state: PendingState) {
        let mut states = self.states.write().await;
        states.insert(state.token.clone(), state);
    }

    async fn get(&self, token: &str) -> Option<PendingState> {
        self.states.read().await.get(token).cloned()
    }

    async fn take(&self, token: &str) -> Option<PendingState> {
        self.states.write().await.remove(token)
    }

    async fn purge_older_than(&self, max_age: Duration) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return 0;
        };
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, state| state.created_at > cutoff);
        before - states.len()
    }

    async fn len(&self) -> usize {
        self.states.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_state_store() {
        let store = InMemoryStateStore::new();

        let state = PendingState::new(
            serde_json::json!({"then": "edit"}),
            Some("verifier123".to_string()),
        );
        let token = state.token.clone();

        store.store(state).await;

        // Lookups do not consume
        let peeked = store.get(&token).await.unwrap();
        assert_eq!(peeked.code_verifier, Some("verifier123".to_string()));
        assert!(store.get(&token).await.is_some());

        let taken = store.take(&token).await.unwrap();
        assert_eq!(taken.payload, serde_json::json!({"then": "edit"}));

        assert!(store.take(&token).await.is_none());
        assert!(store.get(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let a = PendingState::new(serde_json::json!({}), None);
        let b = PendingState::new(serde_json::json!({}), None);
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 36);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let store = InMemoryStateStore::new();

        let mut stale = PendingState::new(serde_json::json!({}), None);
        stale.created_at = Utc::now() - Duration::minutes(30);
        let fresh = PendingState::new(serde_json::json!({}), None);
        let fresh_token = fresh.token.clone();

        store.store(stale).await;
        store.store(fresh).await;

        let purged = store.purge_older_than(Duration::minutes(10)).await;
        assert_eq!(purged, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(&fresh_token).await.is_some());
    }

    #[tokio::test]
    async fn test_purge_with_unrepresentable_age_keeps_everything() {
        let store = InMemoryStateStore::new();
        store.store(PendingState::new(serde_json::json!({}), None)).await;

        assert_eq!(store.purge_older_than(Duration::MAX).await, 0);
        assert_eq!(store.len().await, 1);
    }
}
