//! Workflow definitions.
//!
//! A workflow is an ordered list of steps executed as a linear pipeline:
//! each step's output is the next step's input.  Step kinds:
//!
//! | Kind | Behaviour |
//! |------|-----------|
//! | `agent_task` | dispatch a task to a registered worker agent |
//! | `sequential` | run nested steps as a sub-pipeline |
//! | `decision`, `conditional`, `parallel` | pass the input through unchanged |
//!
//! Definitions are plain serde data, typically loaded from JSON:
//!
//! ```json
//! { "id": "restock", "name": "Weekly restock", "steps": [
//!     { "id": "check", "type": "agent_task", "agent_id": "inventory",
//!       "task_type": "low_stock_report" },
//!     { "id": "order", "type": "agent_task", "agent_id": "procurement",
//!       "task_type": "create_shopping_list",
//!       "retry": { "max_retries": 2 } }
//! ] }
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Upper bound accepted for [`RetryPolicy::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Per-step retry behaviour for agent dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
    /// Upper bound for the delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 200,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// The delay after `current`, capped at `max_delay_ms`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let max = Duration::from_millis(self.max_delay_ms);
        let next = current.as_secs_f64() * self.backoff_multiplier.max(1.0);
        Duration::from_secs_f64(next.min(max.as_secs_f64()))
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// What a step does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    AgentTask {
        agent_id: String,
        task_type: String,
        #[serde(default)]
        parameters: Value,
    },
    Sequential {
        steps: Vec<WorkflowStep>,
    },
    Decision,
    Conditional,
    Parallel,
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AgentTask { .. } => "agent_task",
            Self::Sequential { .. } => "sequential",
            Self::Decision => "decision",
            Self::Conditional => "conditional",
            Self::Parallel => "parallel",
        }
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Per-dispatch deadline; the executor default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl WorkflowStep {
    /// An agent-task step with no retries.
    pub fn agent_task(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            StepKind::AgentTask {
                agent_id: agent_id.into(),
                task_type: task_type.into(),
                parameters: Value::Null,
            },
        )
    }

    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
            retry: None,
            timeout_secs: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            steps,
        }
    }

    /// Parse and validate a JSON definition.
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Ids must be non-empty and unique across all nesting levels, and retry
    /// counts may not exceed [`MAX_RETRIES`].
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| AgentError::InvalidWorkflow { reason };
        if self.id.trim().is_empty() {
            return Err(invalid("workflow id is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(invalid(format!("workflow `{}` has no steps", self.id)));
        }

        let mut seen = HashSet::new();
        let mut stack: Vec<&WorkflowStep> = self.steps.iter().collect();
        while let Some(step) = stack.pop() {
            if step.id.trim().is_empty() {
                return Err(invalid("step id is empty".into()));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(invalid(format!("duplicate step id `{}`", step.id)));
            }
            if let Some(retry) = &step.retry
                && retry.max_retries > MAX_RETRIES
            {
                return Err(invalid(format!(
                    "step `{}` asks for {} retries, at most {MAX_RETRIES} allowed",
                    step.id, retry.max_retries
                )));
            }
            if let StepKind::Sequential { steps } = &step.kind {
                stack.extend(steps.iter());
            }
        }
        Ok(())
    }

    /// Number of steps including nested ones.
    pub fn total_steps(&self) -> usize {
        fn count(steps: &[WorkflowStep]) -> usize {
            steps
                .iter()
                .map(|s| match &s.kind {
                    StepKind::Sequential { steps } => 1 + count(steps),
                    _ => 1,
                })
                .sum()
        }
        count(&self.steps)
    }
}
