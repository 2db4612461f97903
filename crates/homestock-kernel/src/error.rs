//! Kernel error types.
//!
//! Registry lookups and worker-agent dispatch surface errors through
//! [`KernelError`].  Each variant carries enough context for the workflow
//! executor to record a meaningful failure on the step that triggered it.

/// Unified error type for the HomeStock kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Registry errors ----------------------------------------------------
    /// The requested worker agent is not registered.
    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    /// The agent is registered but not in a usable state.
    #[error("agent unavailable: {agent_id} (status: {status})")]
    AgentUnavailable { agent_id: String, status: String },

    // -- Dispatch errors ----------------------------------------------------
    /// A worker agent rejected or failed a task.
    #[error("task failed on agent `{agent_id}`: {reason}")]
    TaskFailed { agent_id: String, reason: String },

    /// An inter-agent message could not be handled.
    #[error("invalid agent message: {reason}")]
    InvalidMessage { reason: String },

    /// A label (intent, agent type, action) could not be parsed.
    #[error("unknown {kind} label: {value}")]
    UnknownLabel { kind: &'static str, value: String },

    // -- Serialization ------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
