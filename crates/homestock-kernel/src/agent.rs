//! Worker-agent contract.
//!
//! Inventory, procurement, finance and notification agents live outside the
//! orchestration core.  The core only needs to dispatch tasks to them and
//! look them up by id, so the contract is deliberately narrow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::AgentType;

// ---------------------------------------------------------------------------
// Task types
// ---------------------------------------------------------------------------

/// A unit of work handed to a worker agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    /// Unique task identifier (UUID v7).
    pub task_id: Uuid,
    /// Agent-specific task verb (e.g. "consume_item", "import_orders").
    pub task_type: String,
    /// Output of the previous pipeline stage, or the workflow input.
    pub input: Value,
    /// Static parameters declared on the workflow step.
    pub parameters: Value,
    /// Execution this task belongs to, if dispatched by a workflow.
    pub execution_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AgentTask {
    /// Create a task with a fresh id and the current timestamp.
    pub fn new(task_type: impl Into<String>, input: Value) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            task_type: task_type.into(),
            input,
            parameters: Value::Null,
            execution_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }
}

/// What a worker agent returns: the success/data/error triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// A message exchanged between agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    /// Message kind (e.g. "request", "event", "reply").
    pub kind: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Build a reply addressed back to the sender of `self`.
    pub fn reply(&self, payload: Value) -> Self {
        Self::new(self.to.clone(), self.from.clone(), "reply", payload)
    }
}

/// Static description of what an agent can do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub agent_type: AgentType,
    pub task_types: Vec<String>,
    pub description: String,
}

/// Runtime counters reported by an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_processed: u64,
    pub tasks_failed: u64,
    pub average_latency_ms: f64,
}

// ---------------------------------------------------------------------------
// Worker agent trait
// ---------------------------------------------------------------------------

/// A specialised worker agent that the orchestrator can dispatch tasks to.
#[async_trait]
pub trait WorkerAgent: Send + Sync {
    /// Unique identifier used for registry lookup.
    fn agent_id(&self) -> &str;

    /// Which routing target this agent serves.
    fn agent_type(&self) -> AgentType;

    /// Execute a task.  A returned `Err` and an `Ok` outcome with
    /// `success == false` are both treated as step failures.
    async fn process_task(&self, task: AgentTask) -> Result<TaskOutcome>;

    /// Handle an inter-agent message, optionally replying.
    async fn handle_message(&self, message: AgentMessage) -> Result<Option<AgentMessage>>;

    fn capabilities(&self) -> AgentCapabilities;

    fn metrics(&self) -> AgentMetrics;
}
