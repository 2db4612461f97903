//! The [`StateStore`] contract.
//!
//! Every backend (in-memory, SQLite) implements the same narrow interface.
//! Callers treat any error as a miss and continue with in-memory state, so
//! implementations should return errors rather than panic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::model::{ConversationContext, WorkflowState};

/// Keyed persistence for conversation context, workflow state, and a
/// general TTL cache.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_conversation_state(&self, id: &str, state: &ConversationContext)
    -> StoreResult<()>;

    async fn load_conversation_state(&self, id: &str) -> StoreResult<Option<ConversationContext>>;

    /// Delete a conversation.  Deleting an unknown id is not an error.
    async fn delete_conversation_state(&self, id: &str) -> StoreResult<()>;

    async fn save_workflow_state(
        &self,
        workflow_id: &str,
        execution_id: &str,
        state: &WorkflowState,
    ) -> StoreResult<()>;

    async fn load_workflow_state(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> StoreResult<Option<WorkflowState>>;

    /// Store a value.  `ttl = None` means the entry never expires.
    async fn cache(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()>;

    /// Fetch a value; expired entries are evicted and reported as misses.
    async fn get_cached(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn invalidate(&self, key: &str) -> StoreResult<()>;
}

/// Serialize `value` and put it in the store's TTL cache.
pub async fn cache_typed<T: Serialize + ?Sized>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> StoreResult<()> {
    let json = serde_json::to_value(value)?;
    store.cache(key, json, ttl).await
}

/// Fetch a cached value and deserialize it.
///
/// An entry that no longer deserializes is invalidated and reported as a
/// miss.
pub async fn get_cached_typed<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> StoreResult<Option<T>> {
    let Some(json) = store.get_cached(key).await? else {
        return Ok(None);
    };
    match serde_json::from_value(json) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(key, %err, "cached value has unexpected shape, evicting");
            store.invalidate(key).await?;
            Ok(None)
        }
    }
}

/// Absolute expiry for a TTL measured from now.
pub(crate) fn expiry_from(ttl: Option<Duration>) -> StoreResult<Option<DateTime<Utc>>> {
    ttl.map(|ttl| {
        chrono::Duration::from_std(ttl)
            .map(|d| Utc::now() + d)
            .map_err(|e| StoreError::InvalidArgument(format!("ttl out of range: {e}")))
    })
    .transpose()
}
