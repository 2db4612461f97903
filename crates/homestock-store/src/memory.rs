//! In-process [`StateStore`] backed by [`DashMap`].
//!
//! Suitable for tests and single-process deployments.  Cache expiry is
//! evaluated lazily on read; [`MemoryStateStore::purge_expired`] performs an
//! explicit sweep when the caller wants one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::StoreResult;
use crate::model::{CacheEntry, ConversationContext, WorkflowState};
use crate::state::{StateStore, expiry_from};

/// Cheaply cloneable in-memory state store.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    conversations: Arc<DashMap<String, ConversationContext>>,
    workflows: Arc<DashMap<(String, String), WorkflowState>>,
    cache: Arc<DashMap<String, CacheEntry<Value>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted conversations.
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Remove every expired cache entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.is_expired_at(now));
        let purged = before.saturating_sub(self.cache.len());
        if purged > 0 {
            debug!(purged, "expired cache entries purged");
        }
        purged
    }

    /// Remove `key` only if the entry stored right now is expired; a value
    /// written since the caller's check survives.
    fn evict_if_expired(&self, key: &str) -> bool {
        let evicted = self
            .cache
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some();
        if evicted {
            debug!(key, "cache entry expired on read");
        }
        evicted
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_conversation_state(
        &self,
        id: &str,
        state: &ConversationContext,
    ) -> StoreResult<()> {
        self.conversations.insert(id.to_string(), state.clone());
        debug!(conversation_id = id, "conversation state saved");
        Ok(())
    }

    async fn load_conversation_state(&self, id: &str) -> StoreResult<Option<ConversationContext>> {
        Ok(self.conversations.get(id).map(|e| e.value().clone()))
    }

    async fn delete_conversation_state(&self, id: &str) -> StoreResult<()> {
        self.conversations.remove(id);
        debug!(conversation_id = id, "conversation state deleted");
        Ok(())
    }

    async fn save_workflow_state(
        &self,
        workflow_id: &str,
        execution_id: &str,
        state: &WorkflowState,
    ) -> StoreResult<()> {
        self.workflows.insert(
            (workflow_id.to_string(), execution_id.to_string()),
            state.clone(),
        );
        Ok(())
    }

    async fn load_workflow_state(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> StoreResult<Option<WorkflowState>> {
        let key = (workflow_id.to_string(), execution_id.to_string());
        Ok(self.workflows.get(&key).map(|e| e.value().clone()))
    }

    async fn cache(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        let expires_at = expiry_from(ttl)?;
        self.cache
            .insert(key.to_string(), CacheEntry::new(key, value, expires_at));
        debug!(key, ?ttl, "cache insert");
        Ok(())
    }

    async fn get_cached(&self, key: &str) -> StoreResult<Option<Value>> {
        match self.cache.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        // The read guard is released above; removing under it would deadlock.
        self.evict_if_expired(key);
        Ok(None)
    }

    async fn invalidate(&self, key: &str) -> StoreResult<()> {
        self.cache.remove(key);
        debug!(key, "cache invalidate");
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
