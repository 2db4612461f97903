//! End-to-end tests over the public API of the orchestration crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use homestock_agent::{
    ConversationManager, HomeStockConfig, StoreBackend, WorkflowDefinition, WorkflowExecutor,
    WorkflowStep, clarification_key,
};
use homestock_intent::GuidanceType;
use homestock_kernel::{
    AgentCapabilities, AgentMessage, AgentMetrics, AgentRegistry, AgentTask, AgentType, IntentKind,
    TaskOutcome, WorkerAgent,
};
use homestock_store::{
    ConversationContext, MemoryStateStore, StateStore, StepStatus, StoreError, StoreResult,
    WorkflowState, WorkflowStatus,
};

fn manager_with(config: &HomeStockConfig) -> (ConversationManager, MemoryStateStore) {
    let store = MemoryStateStore::new();
    let mgr = ConversationManager::new(config, Arc::new(store.clone())).unwrap();
    (mgr, store)
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consume_scenario_routes_to_inventory() {
    let (mgr, store) = manager_with(&HomeStockConfig::default());
    let result = mgr.process("抽纸消耗1包", "conv-1", "user-1").await;

    assert!(result.success);
    assert_eq!(result.intent, IntentKind::InventoryManagement);
    assert_eq!(result.entities.unit.as_deref(), Some("包"));
    let routing = result.routing.unwrap();
    assert_eq!(routing.target_agent, AgentType::Inventory);
    assert!(routing.suggested_actions.iter().any(|a| a == "consume_item"));

    let persisted = store.load_conversation_state("conv-1").await.unwrap().unwrap();
    assert_eq!(persisted.user_id, "user-1");
    assert_eq!(persisted.entities.item_name.as_deref(), Some("抽纸"));
    assert_eq!(persisted.current_intent, Some(IntentKind::InventoryManagement));
}

#[tokio::test]
async fn history_is_trimmed_oldest_first() {
    let mut config = HomeStockConfig::default();
    config.conversation.max_conversation_history = 5;
    let (mgr, _) = manager_with(&config);

    for i in 1..=8 {
        mgr.process(&format!("抽纸消耗{i}包"), "conv-1", "user-1").await;
    }

    let ctx = mgr.get_context("conv-1").await.unwrap();
    assert_eq!(ctx.session_history.len(), 5);
    assert_eq!(ctx.session_history[0].user_input, "抽纸消耗4包");
    assert_eq!(ctx.last_turn().unwrap().user_input, "抽纸消耗8包");
}

#[tokio::test]
async fn unresolved_replies_end_in_forced_routing() {
    let (mgr, store) = manager_with(&HomeStockConfig::default());

    let first = mgr.process("添加", "conv-1", "user-1").await;
    assert!(first.requires_clarification);
    let first_request = first.clarification.unwrap();
    assert_eq!(first_request.guidance_type, GuidanceType::IncompleteCommand);
    assert_eq!(first_request.attempts, 1);

    for expected in [2, 3] {
        let reply = mgr.process("嗯", "conv-1", "user-1").await;
        assert!(reply.success);
        assert!(reply.requires_clarification);
        let request = reply.clarification.unwrap();
        assert_eq!(request.attempts, expected);
        assert_eq!(request.request_id, first_request.request_id);
    }

    let forced = mgr.process("嗯", "conv-1", "user-1").await;
    assert!(forced.success);
    assert!(!forced.requires_clarification);
    assert!(forced.forced_routing);
    assert_eq!(forced.routing.unwrap().target_agent, AgentType::Inventory);

    assert!(mgr.pending_clarification("conv-1").await.is_none());
    assert!(store.get_cached(&clarification_key("conv-1")).await.unwrap().is_none());

    // A fresh dialog starts from the first attempt again.
    let again = mgr.process("添加", "conv-1", "user-1").await;
    assert_eq!(again.clarification.unwrap().attempts, 1);
}

#[tokio::test]
async fn at_most_one_pending_request_per_conversation() {
    let (mgr, store) = manager_with(&HomeStockConfig::default());
    mgr.process("添加", "conv-1", "user-1").await;
    mgr.process("嗯", "conv-1", "user-1").await;
    mgr.process("添加", "conv-2", "user-1").await;

    let pending = mgr.pending_clarification("conv-1").await.unwrap();
    assert_eq!(pending.attempts, 2);
    assert_eq!(mgr.pending_clarification("conv-2").await.unwrap().attempts, 1);
    assert!(store.get_cached("clarification:conv-3").await.unwrap().is_none());
}

#[tokio::test]
async fn pronoun_resolves_against_previous_item() {
    let (mgr, _) = manager_with(&HomeStockConfig::default());
    mgr.process("抽纸消耗1包", "conv-1", "user-1").await;
    let result = mgr.process("它又消耗了2包", "conv-1", "user-1").await;

    assert!(!result.requires_clarification);
    assert_eq!(result.entities.item_name.as_deref(), Some("抽纸"));
    assert_eq!(result.routing.unwrap().target_agent, AgentType::Inventory);
}

#[tokio::test]
async fn delete_conversation_forgets_everything() {
    let (mgr, store) = manager_with(&HomeStockConfig::default());
    mgr.process("抽纸消耗1包", "conv-1", "user-1").await;
    mgr.process("添加", "conv-1", "user-1").await;

    mgr.delete_conversation("conv-1").await.unwrap();

    assert!(mgr.get_context("conv-1").await.is_none());
    assert!(mgr.pending_clarification("conv-1").await.is_none());
    assert!(store.get_cached("routing:conv-1").await.unwrap().is_none());
    assert!(mgr.active_conversations().is_empty());
}

#[tokio::test]
async fn sqlite_backed_manager_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = HomeStockConfig::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.database_path = dir.path().join("state.db");

    {
        let store = config.open_store().await.unwrap();
        let mgr = ConversationManager::new(&config, store).unwrap();
        mgr.process("抽纸消耗1包", "conv-1", "user-1").await;
        mgr.process("添加", "conv-1", "user-1").await;
    }

    let store = config.open_store().await.unwrap();
    let mgr = ConversationManager::new(&config, store).unwrap();
    assert!(mgr.active_conversations().is_empty());

    let ctx = mgr.get_context("conv-1").await.unwrap();
    assert_eq!(ctx.session_history.len(), 2);
    assert_eq!(mgr.pending_clarification("conv-1").await.unwrap().attempts, 1);
}

/// A store whose every operation fails.
struct FailingStore;

fn unavailable<T>() -> StoreResult<T> {
    Err(StoreError::InvalidArgument("storage offline".into()))
}

#[async_trait]
impl StateStore for FailingStore {
    async fn save_conversation_state(&self, _id: &str, _state: &ConversationContext) -> StoreResult<()> {
        unavailable()
    }

    async fn load_conversation_state(&self, _id: &str) -> StoreResult<Option<ConversationContext>> {
        unavailable()
    }

    async fn delete_conversation_state(&self, _id: &str) -> StoreResult<()> {
        unavailable()
    }

    async fn save_workflow_state(
        &self,
        _workflow_id: &str,
        _execution_id: &str,
        _state: &WorkflowState,
    ) -> StoreResult<()> {
        unavailable()
    }

    async fn load_workflow_state(
        &self,
        _workflow_id: &str,
        _execution_id: &str,
    ) -> StoreResult<Option<WorkflowState>> {
        unavailable()
    }

    async fn cache(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> StoreResult<()> {
        unavailable()
    }

    async fn get_cached(&self, _key: &str) -> StoreResult<Option<Value>> {
        unavailable()
    }

    async fn invalidate(&self, _key: &str) -> StoreResult<()> {
        unavailable()
    }
}

#[tokio::test]
async fn store_outage_does_not_fail_the_turn() {
    let mgr = ConversationManager::new(&HomeStockConfig::default(), Arc::new(FailingStore)).unwrap();

    let routed = mgr.process("抽纸消耗1包", "conv-1", "user-1").await;
    assert!(routed.success);
    assert!(routed.error.is_none());
    assert_eq!(routed.routing.unwrap().target_agent, AgentType::Inventory);

    let asked = mgr.process("添加", "conv-2", "user-1").await;
    assert!(asked.success);
    assert!(asked.requires_clarification);
    assert_eq!(asked.clarification.unwrap().attempts, 1);

    // The live table still carries the conversation.
    let ctx = mgr.get_context("conv-1").await.unwrap();
    assert_eq!(ctx.session_history.len(), 1);
    assert!(mgr.pending_clarification("conv-2").await.is_none());
}

#[tokio::test]
async fn workflow_runs_through_store_outage() {
    let registry = AgentRegistry::new();
    registry.register(Arc::new(EchoAgent { id: "a" }));
    let executor = WorkflowExecutor::new(
        registry,
        Arc::new(FailingStore),
        HomeStockConfig::default().executor_config(),
    );
    let definition =
        WorkflowDefinition::new("solo", "solo", vec![WorkflowStep::agent_task("one", "a", "echo")]);

    let state = executor.execute(&definition, json!({})).await.unwrap();
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(executor.load_state("solo", state.execution_id).await.is_err());
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

struct EchoAgent {
    id: &'static str,
}

#[async_trait]
impl WorkerAgent for EchoAgent {
    fn agent_id(&self) -> &str {
        self.id
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Inventory
    }

    async fn process_task(&self, task: AgentTask) -> homestock_kernel::Result<TaskOutcome> {
        let mut seen: Vec<Value> = task.input["seen"].as_array().cloned().unwrap_or_default();
        seen.push(json!(self.id));
        Ok(TaskOutcome::ok(json!({ "seen": seen })))
    }

    async fn handle_message(
        &self,
        _message: AgentMessage,
    ) -> homestock_kernel::Result<Option<AgentMessage>> {
        Ok(None)
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            agent_type: AgentType::Inventory,
            task_types: vec!["echo".into()],
            description: "echoes its input".into(),
        }
    }

    fn metrics(&self) -> AgentMetrics {
        AgentMetrics::default()
    }
}

#[tokio::test]
async fn workflow_stops_at_unregistered_agent() {
    let registry = AgentRegistry::new();
    registry.register(Arc::new(EchoAgent { id: "a" }));
    registry.register(Arc::new(EchoAgent { id: "c" }));
    let config = HomeStockConfig::default();
    let executor = WorkflowExecutor::new(
        registry,
        Arc::new(MemoryStateStore::new()),
        config.executor_config(),
    );

    let definition = WorkflowDefinition::from_json(
        r#"{
            "id": "restock",
            "name": "restock",
            "steps": [
                {"id": "A", "name": "check", "type": "agent_task", "agent_id": "a", "task_type": "echo"},
                {"id": "B", "name": "order", "type": "agent_task", "agent_id": "b", "task_type": "echo"},
                {"id": "C", "name": "notify", "type": "agent_task", "agent_id": "c", "task_type": "echo"}
            ]
        }"#,
    )
    .unwrap();

    let state = executor.execute(&definition, json!({})).await.unwrap();
    assert_eq!(state.status, WorkflowStatus::Failed);
    assert_eq!(state.step_history.len(), 2);
    assert_eq!(state.step_history[0].status, StepStatus::Completed);
    assert_eq!(state.step_history[1].step_id, "B");
    assert_eq!(state.step_history[1].status, StepStatus::Failed);
    assert!(state.error.unwrap().contains("B"));

    let persisted = executor
        .load_state("restock", state.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(persisted.status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn workflow_completes_with_all_agents() {
    let registry = AgentRegistry::new();
    for id in ["a", "b"] {
        registry.register(Arc::new(EchoAgent { id }));
    }
    let executor = WorkflowExecutor::new(
        registry,
        Arc::new(MemoryStateStore::new()),
        HomeStockConfig::default().executor_config(),
    );
    let definition = WorkflowDefinition::new(
        "pair",
        "pair",
        vec![
            WorkflowStep::agent_task("one", "a", "echo"),
            WorkflowStep::agent_task("two", "b", "echo"),
        ],
    );

    let state = executor.execute(&definition, json!({"seen": []})).await.unwrap();
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert_eq!(state.global_context["output"], json!({"seen": ["a", "b"]}));
}
