//! Orchestration layer of HomeStock.
//!
//! - [`conversation::ConversationManager`] runs one utterance through
//!   classification, extraction, clarification and routing, keeping the
//!   per-conversation context in the state store.
//! - [`executor::WorkflowExecutor`] runs [`workflow::WorkflowDefinition`]s
//!   against the worker agents in the kernel registry.
//! - [`config::HomeStockConfig`] holds the runtime settings for both.

pub mod config;
pub mod conversation;
pub mod error;
pub mod executor;
pub mod workflow;

pub use config::{
    ConversationConfig, HomeStockConfig, RouterSettings, StoreBackend, StoreConfig, WorkflowConfig,
};
pub use conversation::{ConversationManager, ConversationResult, clarification_key};
pub use error::{AgentError, Result};
pub use executor::{ExecutorConfig, RunningExecution, WorkflowExecutor};
pub use workflow::{RetryPolicy, StepKind, WorkflowDefinition, WorkflowStep};
