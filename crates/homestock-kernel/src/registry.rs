//! Worker-agent registry.
//!
//! The registry maps agent ids to live [`WorkerAgent`] instances together
//! with their lifecycle status.  It is backed by [`DashMap`] so the workflow
//! executor and the surrounding service can share it across tasks without a
//! global lock.
//!
//! # Example
//!
//! ```ignore
//! let registry = AgentRegistry::new();
//! registry.register(Arc::new(InventoryAgent::default()));
//! let agent = registry.resolve("inventory")?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::agent::WorkerAgent;
use crate::error::{KernelError, Result};
use crate::types::AgentType;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Registered and accepting tasks.
    Available,
    /// Temporarily taken out of rotation.
    Unavailable,
    /// The agent reported a failure and is not usable.
    Error,
}

/// Snapshot of a registered agent's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    /// If `status == Error`, a human-readable error message.
    pub last_error: Option<String>,
}

#[derive(Clone)]
struct Entry {
    agent: Arc<dyn WorkerAgent>,
    info: AgentInfo,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Concurrent worker-agent registry.  Cheaply cloneable (`Arc`-backed).
#[derive(Clone)]
pub struct AgentRegistry {
    inner: Arc<DashMap<String, Entry>>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Register an agent under its own id, replacing any previous entry.
    pub fn register(&self, agent: Arc<dyn WorkerAgent>) {
        let id = agent.agent_id().to_string();
        let agent_type = agent.agent_type();

        tracing::info!(agent_id = %id, agent_type = %agent_type, "agent registered");

        self.inner.insert(
            id.clone(),
            Entry {
                agent,
                info: AgentInfo {
                    id,
                    agent_type,
                    status: AgentStatus::Available,
                    registered_at: Utc::now(),
                    last_error: None,
                },
            },
        );
    }

    /// Remove an agent, returning its final info if it existed.
    pub fn unregister(&self, id: &str) -> Option<AgentInfo> {
        let removed = self.inner.remove(id).map(|(_, entry)| entry.info);
        if removed.is_some() {
            tracing::info!(agent_id = %id, "agent unregistered");
        }
        removed
    }

    /// Look up an agent regardless of status.
    pub fn get(&self, id: &str) -> Result<Arc<dyn WorkerAgent>> {
        self.inner
            .get(id)
            .map(|entry| Arc::clone(&entry.agent))
            .ok_or_else(|| KernelError::AgentNotFound {
                agent_id: id.to_string(),
            })
    }

    /// Look up an agent that is ready to accept work.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn WorkerAgent>> {
        let entry = self
            .inner
            .get(id)
            .ok_or_else(|| KernelError::AgentNotFound {
                agent_id: id.to_string(),
            })?;

        if entry.info.status != AgentStatus::Available {
            return Err(KernelError::AgentUnavailable {
                agent_id: id.to_string(),
                status: format!("{:?}", entry.info.status),
            });
        }
        Ok(Arc::clone(&entry.agent))
    }

    /// First available agent serving the given routing target.
    pub fn find_by_type(&self, agent_type: AgentType) -> Option<Arc<dyn WorkerAgent>> {
        self.inner
            .iter()
            .find(|e| e.info.agent_type == agent_type && e.info.status == AgentStatus::Available)
            .map(|e| Arc::clone(&e.agent))
    }

    pub fn info(&self, id: &str) -> Result<AgentInfo> {
        self.inner
            .get(id)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| KernelError::AgentNotFound {
                agent_id: id.to_string(),
            })
    }

    /// Update the status of a registered agent.
    pub fn set_status(&self, id: &str, status: AgentStatus) -> Result<()> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| KernelError::AgentNotFound {
                agent_id: id.to_string(),
            })?;

        let old = entry.info.status;
        entry.info.status = status;

        // Clear the error message when transitioning away from Error.
        if old == AgentStatus::Error && status != AgentStatus::Error {
            entry.info.last_error = None;
        }

        tracing::debug!(
            agent_id = %id,
            old_status = ?old,
            new_status = ?status,
            "agent status changed"
        );

        Ok(())
    }

    /// Record a failed state with an error message.
    pub fn set_error(&self, id: &str, error: impl Into<String>) -> Result<()> {
        let mut entry = self
            .inner
            .get_mut(id)
            .ok_or_else(|| KernelError::AgentNotFound {
                agent_id: id.to_string(),
            })?;

        let error = error.into();
        entry.info.status = AgentStatus::Error;
        entry.info.last_error = Some(error.clone());

        tracing::warn!(agent_id = %id, error = %error, "agent entered error state");

        Ok(())
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    pub fn list_all(&self) -> Vec<AgentInfo> {
        self.inner.iter().map(|e| e.info.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    pub fn is_available(&self, id: &str) -> bool {
        self.inner
            .get(id)
            .map(|e| e.info.status == AgentStatus::Available)
            .unwrap_or(false)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent::{AgentCapabilities, AgentMessage, AgentMetrics, AgentTask, TaskOutcome};

    struct StubAgent {
        id: &'static str,
        agent_type: AgentType,
    }

    #[async_trait]
    impl WorkerAgent for StubAgent {
        fn agent_id(&self) -> &str {
            self.id
        }

        fn agent_type(&self) -> AgentType {
            self.agent_type
        }

        async fn process_task(&self, task: AgentTask) -> Result<TaskOutcome> {
            Ok(TaskOutcome::ok(json!({"echo": task.task_type})))
        }

        async fn handle_message(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
            Ok(Some(message.reply(json!("ack"))))
        }

        fn capabilities(&self) -> AgentCapabilities {
            AgentCapabilities {
                agent_type: self.agent_type,
                task_types: vec!["echo".into()],
                description: "stub".into(),
            }
        }

        fn metrics(&self) -> AgentMetrics {
            AgentMetrics::default()
        }
    }

    fn stub(id: &'static str, agent_type: AgentType) -> Arc<dyn WorkerAgent> {
        Arc::new(StubAgent { id, agent_type })
    }

    #[test]
    fn register_and_resolve() {
        let registry = AgentRegistry::new();
        registry.register(stub("inventory", AgentType::Inventory));

        let agent = registry.resolve("inventory").expect("agent should exist");
        assert_eq!(agent.agent_id(), "inventory");
        assert_eq!(registry.info("inventory").unwrap().status, AgentStatus::Available);
    }

    #[test]
    fn not_found_error() {
        let registry = AgentRegistry::new();
        let result = registry.resolve("nonexistent");
        assert!(matches!(result, Err(KernelError::AgentNotFound { .. })));
    }

    #[test]
    fn unavailable_agent_is_not_resolved() {
        let registry = AgentRegistry::new();
        registry.register(stub("finance", AgentType::Finance));
        registry.set_status("finance", AgentStatus::Unavailable).unwrap();

        assert!(matches!(
            registry.resolve("finance"),
            Err(KernelError::AgentUnavailable { .. })
        ));
        // Plain lookup ignores status.
        assert!(registry.get("finance").is_ok());
    }

    #[test]
    fn error_state_with_message() {
        let registry = AgentRegistry::new();
        registry.register(stub("notify", AgentType::Notification));

        registry.set_error("notify", "smtp down").unwrap();
        let info = registry.info("notify").unwrap();
        assert_eq!(info.status, AgentStatus::Error);
        assert_eq!(info.last_error.as_deref(), Some("smtp down"));

        registry.set_status("notify", AgentStatus::Available).unwrap();
        assert!(registry.info("notify").unwrap().last_error.is_none());
    }

    #[test]
    fn find_by_type_skips_unavailable() {
        let registry = AgentRegistry::new();
        registry.register(stub("proc-a", AgentType::Procurement));
        registry.set_status("proc-a", AgentStatus::Unavailable).unwrap();
        assert!(registry.find_by_type(AgentType::Procurement).is_none());

        registry.register(stub("proc-b", AgentType::Procurement));
        let found = registry.find_by_type(AgentType::Procurement).unwrap();
        assert_eq!(found.agent_id(), "proc-b");
    }

    #[test]
    fn unregister() {
        let registry = AgentRegistry::new();
        registry.register(stub("temp", AgentType::Inventory));
        assert_eq!(registry.count(), 1);

        assert!(registry.unregister("temp").is_some());
        assert_eq!(registry.count(), 0);
        assert!(!registry.is_available("temp"));
    }

    #[tokio::test]
    async fn dispatch_through_registry() {
        let registry = AgentRegistry::new();
        registry.register(stub("inventory", AgentType::Inventory));

        let agent = registry.resolve("inventory").unwrap();
        let outcome = agent
            .process_task(AgentTask::new("consume_item", json!({})))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data["echo"], "consume_item");
    }
}
