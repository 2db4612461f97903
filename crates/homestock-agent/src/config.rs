//! Runtime configuration.
//!
//! [`HomeStockConfig`] is read from TOML.  Every field has a default, so an
//! empty file (or no file) yields a working in-memory setup:
//!
//! ```toml
//! [conversation]
//! max_conversation_history = 20
//! max_clarification_attempts = 3
//! fallback_intent = "query_information"
//! default_agent = "inventory"
//!
//! [router]
//! available_agents = ["inventory", "procurement", "finance", "notification"]
//!
//! [workflow]
//! max_concurrent_executions = 10
//!
//! [store]
//! backend = "sqlite"
//! database_path = "data/homestock.db"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use homestock_intent::RouterConfig;
use homestock_kernel::{AgentType, IntentKind};
use homestock_store::{Database, MemoryStateStore, SqliteStateStore, StateStore};

use crate::error::{AgentError, Result};
use crate::executor::ExecutorConfig;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// `[conversation]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Turns kept per conversation; older turns are dropped first.
    pub max_conversation_history: usize,
    /// Questions asked per clarification dialog before routing anyway.
    pub max_clarification_attempts: u32,
    pub fallback_intent: IntentKind,
    /// Agent used for degraded and unavailable-agent results.
    pub default_agent: AgentType,
    /// Lifetime of a pending clarification request.
    pub clarification_ttl_secs: u64,
    pub preferred_language: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_conversation_history: 20,
            max_clarification_attempts: 3,
            fallback_intent: IntentKind::QueryInformation,
            default_agent: AgentType::Inventory,
            clarification_ttl_secs: 1800,
            preferred_language: "zh-CN".into(),
        }
    }
}

/// `[router]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub available_agents: Vec<AgentType>,
    pub routing_context_ttl_secs: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            available_agents: AgentType::ALL.to_vec(),
            routing_context_ttl_secs: 3600,
        }
    }
}

/// `[workflow]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_concurrent_executions: usize,
    /// Deadline for one agent dispatch when the step sets none.
    pub default_step_timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            default_step_timeout_secs: 30,
        }
    }
}

/// State store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// `[store]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_path: PathBuf,
    pub hot_cache_capacity: u64,
    pub hot_cache_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_path: PathBuf::from("data/homestock.db"),
            hot_cache_capacity: 1_000,
            hot_cache_ttl_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Complete HomeStock configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeStockConfig {
    pub conversation: ConversationConfig,
    pub router: RouterSettings,
    pub workflow: WorkflowConfig,
    pub store: StoreConfig,
}

impl HomeStockConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| AgentError::Config {
            reason: format!("failed to parse TOML config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`.  A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file does not exist, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Reject values the orchestrator cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(AgentError::Config {
                reason: reason.to_string(),
            })
        };
        if self.conversation.max_conversation_history == 0 {
            return fail("conversation.max_conversation_history must be at least 1");
        }
        if self.conversation.max_clarification_attempts == 0 {
            return fail("conversation.max_clarification_attempts must be at least 1");
        }
        if self.workflow.max_concurrent_executions == 0 {
            return fail("workflow.max_concurrent_executions must be at least 1");
        }
        if self.router.available_agents.is_empty() {
            return fail("router.available_agents must not be empty");
        }
        Ok(())
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            available_agents: self.router.available_agents.clone(),
            default_agent: self.conversation.default_agent,
            context_ttl: ttl(self.router.routing_context_ttl_secs),
        }
    }

    pub fn clarification_ttl(&self) -> Option<Duration> {
        ttl(self.conversation.clarification_ttl_secs)
    }

    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow.default_step_timeout_secs.max(1))
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_concurrent_executions: self.workflow.max_concurrent_executions,
            default_step_timeout: self.default_step_timeout(),
        }
    }

    /// Open the configured state store backend.
    pub async fn open_store(&self) -> Result<Arc<dyn StateStore>> {
        match self.store.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStateStore::new())),
            StoreBackend::Sqlite => {
                let path = self.store.database_path.clone();
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent).map_err(|e| AgentError::Config {
                        reason: format!("failed to create {}: {e}", parent.display()),
                    })?;
                }
                let db = Database::open_and_migrate(path).await?;
                Ok(Arc::new(SqliteStateStore::with_hot_cache(
                    db,
                    self.store.hot_cache_capacity,
                    Duration::from_secs(self.store.hot_cache_ttl_secs),
                )))
            }
        }
    }
}

/// `0` disables expiry.
fn ttl(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = HomeStockConfig::from_toml_str("").unwrap();
        assert_eq!(config, HomeStockConfig::default());
        assert_eq!(config.conversation.max_conversation_history, 20);
        assert_eq!(config.conversation.max_clarification_attempts, 3);
        assert_eq!(config.conversation.fallback_intent, IntentKind::QueryInformation);
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = HomeStockConfig::from_toml_str(
            r#"
            [conversation]
            max_conversation_history = 5
            default_agent = "finance"

            [router]
            available_agents = ["inventory", "finance"]

            [store]
            backend = "sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.conversation.max_conversation_history, 5);
        assert_eq!(config.conversation.max_clarification_attempts, 3);
        assert_eq!(config.conversation.default_agent, AgentType::Finance);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);

        let router = config.router_config();
        assert_eq!(router.available_agents.len(), 2);
        assert_eq!(router.default_agent, AgentType::Finance);
        assert_eq!(router.context_ttl, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(HomeStockConfig::from_toml_str("[workflow]\nmax_concurrent_executions = 0").is_err());
        assert!(HomeStockConfig::from_toml_str("[router]\navailable_agents = []").is_err());
        assert!(HomeStockConfig::from_toml_str("[conversation]\nfallback_intent = \"chat\"").is_err());
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let mut config = HomeStockConfig::default();
        config.conversation.clarification_ttl_secs = 0;
        assert_eq!(config.clarification_ttl(), None);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HomeStockConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HomeStockConfig::default());
    }

    #[tokio::test]
    async fn sqlite_backend_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HomeStockConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        config.store.database_path = dir.path().join("nested").join("state.db");

        let store = config.open_store().await.unwrap();
        store.cache("k", serde_json::json!(1), None).await.unwrap();
        assert!(config.store.database_path.exists());
    }
}
