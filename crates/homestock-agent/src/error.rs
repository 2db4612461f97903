//! Orchestration error types.
//!
//! Workflow failures are recorded on the [`WorkflowState`] they occurred in
//! and conversation failures are folded into a degraded
//! `ConversationResult`; [`AgentError`] is what those records are built
//! from.
//!
//! [`WorkflowState`]: homestock_store::WorkflowState

use std::time::Duration;

use uuid::Uuid;

/// Unified error type for the orchestration layer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Workflow errors ------------------------------------------------------
    /// The executor is already running its maximum number of executions.
    #[error("workflow capacity exceeded ({limit} executions in flight)")]
    CapacityExceeded { limit: usize },

    /// An agent-task step names an agent that is not registered.
    #[error("step `{step_id}`: agent not found: {agent_id}")]
    AgentNotFound { step_id: String, agent_id: String },

    /// A step failed after exhausting its retries.
    #[error("step `{step_id}` failed: {reason}")]
    StepFailed { step_id: String, reason: String },

    /// A single dispatch exceeded its deadline.
    #[error("step `{step_id}` timed out after {timeout:?}")]
    StepTimeout { step_id: String, timeout: Duration },

    /// The execution was cancelled between steps.
    #[error("execution {execution_id} was cancelled")]
    Cancelled { execution_id: Uuid },

    /// The workflow definition is malformed.
    #[error("invalid workflow: {reason}")]
    InvalidWorkflow { reason: String },

    // -- Conversation errors --------------------------------------------------
    /// The caller supplied unusable input (e.g. an empty conversation id).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    // -- Configuration errors -------------------------------------------------
    /// Configuration loading or validation failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the kernel crate.
    #[error("kernel error: {0}")]
    Kernel(#[from] homestock_kernel::KernelError),

    /// An error propagated from the state store.
    #[error("store error: {0}")]
    Store(#[from] homestock_store::StoreError),

    /// An error propagated from the intent crate.
    #[error("intent error: {0}")]
    Intent(#[from] homestock_intent::IntentError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;
