//! HomeStock kernel.
//!
//! Foundational pieces shared by every other crate in the workspace:
//!
//! - **[`types`]** -- intent labels, worker-agent kinds, normalised actions,
//!   and the typed [`Entities`] record.
//! - **[`agent`]** -- the narrow [`WorkerAgent`] contract the orchestrator
//!   dispatches tasks through.
//! - **[`registry`]** -- concurrent agent registry using [`dashmap`].
//! - **[`error`]** -- unified kernel error types via [`thiserror`].

pub mod agent;
pub mod error;
pub mod registry;
pub mod types;

pub use agent::{
    AgentCapabilities, AgentMessage, AgentMetrics, AgentTask, TaskOutcome, WorkerAgent,
};
pub use error::{KernelError, Result};
pub use registry::{AgentInfo, AgentRegistry, AgentStatus};
pub use types::{ActionEntity, ActionKind, AgentType, Entities, EntityKind, IntentKind};
