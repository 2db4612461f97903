//! SQLite-backed [`StateStore`].
//!
//! Conversation and workflow state are stored as JSON documents keyed by
//! their ids; cache entries carry an optional absolute expiry (unix millis)
//! that is checked lazily on read.  A [`HotCache`] fronts conversation loads.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::HotCache;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::model::{ConversationContext, WorkflowState};
use crate::state::{StateStore, expiry_from};

/// Default number of conversation contexts held in the hot cache.
pub const DEFAULT_HOT_CAPACITY: u64 = 1_000;

/// Default time-to-live for hot cache entries.
pub const DEFAULT_HOT_TTL: Duration = Duration::from_secs(300);

/// State store persisting to SQLite.
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Database,
    hot: HotCache<ConversationContext>,
}

impl SqliteStateStore {
    /// Create a store over an already-migrated database.
    pub fn new(db: Database) -> Self {
        Self::with_hot_cache(db, DEFAULT_HOT_CAPACITY, DEFAULT_HOT_TTL)
    }

    pub fn with_hot_cache(db: Database, capacity: u64, ttl: Duration) -> Self {
        Self {
            db,
            hot: HotCache::new("conversations", capacity, ttl),
        }
    }

    /// Open (or create) the database at `path`, migrate it, and wrap it.
    pub async fn open(path: impl AsRef<std::path::Path> + Send + 'static) -> StoreResult<Self> {
        let db = Database::open_and_migrate(path).await?;
        Ok(Self::new(db))
    }

    /// In-memory SQLite store, migrated and ready.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let db = Database::open_in_memory()?;
        db.run_migrations().await?;
        Ok(Self::new(db))
    }

    pub fn hot_cache(&self) -> &HotCache<ConversationContext> {
        &self.hot
    }

    /// Delete every expired cache row, returning how many were removed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        let now = Utc::now().timestamp_millis();
        let purged = self
            .db
            .execute(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    rusqlite::params![now],
                )?)
            })
            .await?;
        debug!(purged, "expired cache entries purged");
        Ok(purged)
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    #[instrument(skip(self, state))]
    async fn save_conversation_state(
        &self,
        id: &str,
        state: &ConversationContext,
    ) -> StoreResult<()> {
        let key = id.to_string();
        let user_id = state.user_id.clone();
        let json = serde_json::to_string(state)?;
        let last_activity = state.last_activity.timestamp_millis();
        let now = Utc::now().timestamp_millis();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO conversation_states (conversation_id, user_id, state, last_activity, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(conversation_id) DO UPDATE SET \
                        user_id = excluded.user_id, state = excluded.state, \
                        last_activity = excluded.last_activity, updated_at = excluded.updated_at",
                    rusqlite::params![key, user_id, json, last_activity, now],
                )?;
                Ok(())
            })
            .await?;

        self.hot.insert(id, state.clone()).await;
        debug!(conversation_id = id, "conversation state saved");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_conversation_state(&self, id: &str) -> StoreResult<Option<ConversationContext>> {
        if let Some(ctx) = self.hot.get(id).await {
            return Ok(Some(ctx));
        }

        let key = id.to_string();
        let json: Option<String> = self
            .db
            .execute(move |conn| {
                match conn.query_row(
                    "SELECT state FROM conversation_states WHERE conversation_id = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                ) {
                    Ok(json) => Ok(Some(json)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await?;

        let Some(json) = json else {
            return Ok(None);
        };
        let ctx: ConversationContext = serde_json::from_str(&json)?;
        self.hot.insert(id, ctx.clone()).await;
        Ok(Some(ctx))
    }

    #[instrument(skip(self))]
    async fn delete_conversation_state(&self, id: &str) -> StoreResult<()> {
        self.hot.invalidate(id).await;
        let key = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM conversation_states WHERE conversation_id = ?1",
                    rusqlite::params![key],
                )?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self, state))]
    async fn save_workflow_state(
        &self,
        workflow_id: &str,
        execution_id: &str,
        state: &WorkflowState,
    ) -> StoreResult<()> {
        let workflow_id = workflow_id.to_string();
        let execution_id = execution_id.to_string();
        let status = serde_json::to_value(state.status)?
            .as_str()
            .unwrap_or("running")
            .to_string();
        let json = serde_json::to_string(state)?;
        let started_at = state.started_at.timestamp_millis();
        let now = Utc::now().timestamp_millis();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_states (workflow_id, execution_id, status, state, started_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT(workflow_id, execution_id) DO UPDATE SET \
                        status = excluded.status, state = excluded.state, updated_at = excluded.updated_at",
                    rusqlite::params![workflow_id, execution_id, status, json, started_at, now],
                )?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    async fn load_workflow_state(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> StoreResult<Option<WorkflowState>> {
        let workflow_id = workflow_id.to_string();
        let execution_id = execution_id.to_string();
        let json: Option<String> = self
            .db
            .execute(move |conn| {
                match conn.query_row(
                    "SELECT state FROM workflow_states WHERE workflow_id = ?1 AND execution_id = ?2",
                    rusqlite::params![workflow_id, execution_id],
                    |row| row.get(0),
                ) {
                    Ok(json) => Ok(Some(json)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await?;

        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    #[instrument(skip(self, value))]
    async fn cache(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        let expires_at = expiry_from(ttl)?.map(|at| at.timestamp_millis());
        let key = key.to_string();
        let json = serde_json::to_string(&value)?;
        let now = Utc::now().timestamp_millis();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO cache_entries (key, value, created_at, expires_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(key) DO UPDATE SET \
                        value = excluded.value, created_at = excluded.created_at, \
                        expires_at = excluded.expires_at",
                    rusqlite::params![key, json, now, expires_at],
                )?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    async fn get_cached(&self, key: &str) -> StoreResult<Option<Value>> {
        let key = key.to_string();
        let json: Option<String> = self
            .db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                    rusqlite::params![key],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
                );
                match result {
                    Ok((value, expires_at)) => {
                        let now = Utc::now().timestamp_millis();
                        if expires_at.is_some_and(|at: i64| at <= now) {
                            conn.execute(
                                "DELETE FROM cache_entries WHERE key = ?1",
                                rusqlite::params![key],
                            )?;
                            debug!(key = %key, "cache entry expired on read");
                            return Ok(None);
                        }
                        Ok(Some(value))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await?;

        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn invalidate(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM cache_entries WHERE key = ?1",
                    rusqlite::params![key],
                )?;
                Ok(())
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::WorkflowStatus;

    #[tokio::test]
    async fn conversation_upsert_and_hot_cache() {
        let store = SqliteStateStore::open_in_memory().await.unwrap();
        let mut ctx = ConversationContext::new("c1", "u1", "zh-CN");
        store.save_conversation_state("c1", &ctx).await.unwrap();

        ctx.preferred_language = "en".into();
        store.save_conversation_state("c1", &ctx).await.unwrap();

        let loaded = store.load_conversation_state("c1").await.unwrap().unwrap();
        assert_eq!(loaded.preferred_language, "en");
        assert_eq!(store.hot_cache().stats().hits(), 1);
    }

    #[tokio::test]
    async fn delete_clears_hot_cache_and_row() {
        let store = SqliteStateStore::open_in_memory().await.unwrap();
        let ctx = ConversationContext::new("c1", "u1", "zh-CN");
        store.save_conversation_state("c1", &ctx).await.unwrap();

        store.delete_conversation_state("c1").await.unwrap();
        assert!(store.load_conversation_state("c1").await.unwrap().is_none());
        // Unknown ids are fine.
        store.delete_conversation_state("never").await.unwrap();
    }

    #[tokio::test]
    async fn workflow_state_round_trip() {
        let store = SqliteStateStore::open_in_memory().await.unwrap();
        let mut state = WorkflowState::start("restock");
        state.finish(WorkflowStatus::Failed, Some("boom".into()));
        let exec = state.execution_id.to_string();

        store.save_workflow_state("restock", &exec, &state).await.unwrap();
        let loaded = store.load_workflow_state("restock", &exec).await.unwrap();
        assert_eq!(loaded, Some(state));
    }

    #[tokio::test]
    async fn cache_lazy_expiry() {
        let store = SqliteStateStore::open_in_memory().await.unwrap();
        store
            .cache("ttl", json!("soon"), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.cache("keep", json!([1, 2]), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.get_cached("ttl").await.unwrap().is_none());
        assert_eq!(store.get_cached("keep").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(store.purge_expired().await.unwrap(), 0);

        store.invalidate("keep").await.unwrap();
        assert!(store.get_cached("keep").await.unwrap().is_none());
    }
}
