//! Persisted state records.
//!
//! These are the values the [`StateStore`](crate::StateStore) saves and
//! loads: per-conversation context with its bounded turn history, workflow
//! execution state with its append-only step log, and generic TTL cache
//! entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use homestock_kernel::{AgentType, Entities, IntentKind};

// ═══════════════════════════════════════════════════════════════════════
//  Conversation
// ═══════════════════════════════════════════════════════════════════════

/// One utterance/response exchange.  Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub user_input: String,
    pub agent_response: String,
    pub intent: IntentKind,
    #[serde(default)]
    pub entities: Entities,
    pub timestamp: DateTime<Utc>,
    /// The agent the turn was routed to; `None` for clarification turns.
    pub agent_id: Option<AgentType>,
}

impl ConversationTurn {
    pub fn new(
        user_input: impl Into<String>,
        agent_response: impl Into<String>,
        intent: IntentKind,
        entities: Entities,
        agent_id: Option<AgentType>,
    ) -> Self {
        Self {
            turn_id: Uuid::now_v7(),
            user_input: user_input.into(),
            agent_response: agent_response.into(),
            intent,
            entities,
            timestamp: Utc::now(),
            agent_id,
        }
    }
}

/// Everything the orchestrator remembers about a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub user_id: String,
    pub current_intent: Option<IntentKind>,
    /// Last-known-good entity values merged across turns.
    #[serde(default)]
    pub entities: Entities,
    /// Oldest first; bounded by the manager's configured maximum.
    #[serde(default)]
    pub session_history: Vec<ConversationTurn>,
    /// Free-form context; carries the last routing decision.
    #[serde(default)]
    pub contextual_info: BTreeMap<String, Value>,
    pub last_activity: DateTime<Utc>,
    pub preferred_language: String,
}

impl ConversationContext {
    /// A fresh context for the first turn of a conversation.
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        preferred_language: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            current_intent: None,
            entities: Entities::default(),
            session_history: Vec::new(),
            contextual_info: BTreeMap::new(),
            last_activity: Utc::now(),
            preferred_language: preferred_language.into(),
        }
    }

    /// Append a turn and drop the oldest turns beyond `max_history`.
    ///
    /// Returns the number of evicted turns.
    pub fn push_turn(&mut self, turn: ConversationTurn, max_history: usize) -> usize {
        self.session_history.push(turn);
        let overflow = self.session_history.len().saturating_sub(max_history);
        if overflow > 0 {
            self.session_history.drain(..overflow);
        }
        overflow
    }

    /// The most recent turn, if any.
    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.session_history.last()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Workflow
// ═══════════════════════════════════════════════════════════════════════

/// Overall status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl WorkflowStatus {
    /// Terminal once the execution has left `Running`/`Paused`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running | Self::Paused)
    }
}

/// Status of a single step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Record of one attempted workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepExecution {
    pub step_id: String,
    pub status: StepStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Retries performed by the step handler (0 = first attempt succeeded).
    pub retry_count: u32,
}

impl WorkflowStepExecution {
    pub fn pending(step_id: impl Into<String>, input: Value) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            retry_count: 0,
        }
    }
}

/// Execution state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub execution_id: Uuid,
    /// Id of the step currently (or last) executing.
    pub current_step: Option<String>,
    /// Append-only; one entry per attempted step.
    pub step_history: Vec<WorkflowStepExecution>,
    #[serde(default)]
    pub global_context: BTreeMap<String, Value>,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WorkflowState {
    pub fn start(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: Uuid::now_v7(),
            current_step: None,
            step_history: Vec::new(),
            global_context: BTreeMap::new(),
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Move to a terminal status, stamping the completion time.
    pub fn finish(&mut self, status: WorkflowStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Cache entries
// ═══════════════════════════════════════════════════════════════════════

/// A value in the general-purpose TTL cache.  Expiry is checked lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, value: T, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            expires_at,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// ── tests ────────────────────────────────────────────────────────────
