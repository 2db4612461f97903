//! Demo worker agents.
//!
//! One acknowledging agent per [`AgentType`], registered under the type's
//! name (`inventory`, `procurement`, ...).  Each task is answered with the
//! task type, the agent id and the input it received, so workflow outputs
//! show what flowed through the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use homestock_kernel::{
    AgentCapabilities, AgentMessage, AgentMetrics, AgentRegistry, AgentTask, AgentType, Result,
    TaskOutcome, WorkerAgent,
};

pub struct DemoAgent {
    id: String,
    agent_type: AgentType,
    processed: AtomicU64,
}

impl DemoAgent {
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            id: agent_type.as_str().to_string(),
            agent_type,
            processed: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl WorkerAgent for DemoAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    async fn process_task(&self, task: AgentTask) -> Result<TaskOutcome> {
        self.processed.fetch_add(1, Ordering::Relaxed);
        debug!(agent_id = %self.id, task_type = %task.task_type, "demo task acknowledged");
        Ok(TaskOutcome::ok(json!({
            "agent": self.id,
            "task_type": task.task_type,
            "acknowledged": true,
            "input": task.input,
            "parameters": task.parameters,
        })))
    }

    async fn handle_message(&self, message: AgentMessage) -> Result<Option<AgentMessage>> {
        Ok(Some(message.reply(json!({ "acknowledged": true }))))
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            agent_type: self.agent_type,
            task_types: vec!["*".into()],
            description: format!("demo {} agent that acknowledges every task", self.agent_type),
        }
    }

    fn metrics(&self) -> AgentMetrics {
        AgentMetrics {
            tasks_processed: self.processed.load(Ordering::Relaxed),
            ..AgentMetrics::default()
        }
    }
}

/// A registry holding one demo agent per type.
pub fn demo_registry() -> AgentRegistry {
    let registry = AgentRegistry::new();
    for agent_type in AgentType::ALL {
        registry.register(Arc::new(DemoAgent::new(agent_type)));
    }
    registry
}
