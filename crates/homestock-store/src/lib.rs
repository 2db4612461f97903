//! # homestock-store
//!
//! Keyed persistence for the orchestration core: conversation context,
//! workflow execution state, and a general TTL cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  StateStore (trait)                      │
//! ├────────────────────┬─────────────────────┤
//! │  MemoryStateStore  │  SqliteStateStore   │
//! │  (DashMap)         │  HotCache (moka)    │
//! │                    │  Database (rusqlite)│
//! │                    │  Migrations         │
//! └────────────────────┴─────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use homestock_store::{SqliteStateStore, StateStore};
//!
//! let store = SqliteStateStore::open("data/homestock.db").await?;
//! store.cache("routing:c1", serde_json::json!({"agent": "inventory"}), None).await?;
//! ```

pub mod cache;
pub mod db;
pub mod error;
pub mod memory;
pub mod migration;
pub mod model;
pub mod sqlite;
pub mod state;

// ── re-exports ───────────────────────────────────────────────────────

pub use cache::{CacheStats, HotCache};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStateStore;
pub use model::{
    CacheEntry, ConversationContext, ConversationTurn, StepStatus, WorkflowState, WorkflowStatus,
    WorkflowStepExecution,
};
pub use sqlite::SqliteStateStore;
pub use state::{StateStore, cache_typed, get_cached_typed};
