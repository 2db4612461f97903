//! Agent router.
//!
//! Maps a classified intent plus its entities to one of the worker agents:
//!
//! | Intent | Agent |
//! |--------|-------|
//! | inventory_management | inventory |
//! | procurement_management | procurement |
//! | financial_analysis | finance |
//! | notification_management | notification |
//! | query_information / help_request | implied by entities, else inventory |
//!
//! A rolling per-conversation [`RoutingContext`] is kept in the injected
//! [`StateStore`] under `routing:{conversation_id}`.  It is a weak prior:
//! consulted only when the classifier found no keyword at all and the
//! entities imply nothing specific.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use homestock_kernel::{ActionKind, AgentType, Entities, EntityKind, IntentKind};
use homestock_store::{StateStore, cache_typed, get_cached_typed};

use crate::classifier::IntentResult;
use crate::entities::mentions_action;

/// Confidence of a result that could not be routed to the intended agent.
pub const MIN_ROUTING_CONFIDENCE: f64 = 0.1;

/// Multiplier applied when several distinct items or platforms were named.
pub const AMBIGUITY_PENALTY: f64 = 0.8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub target_agent: AgentType,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub extracted_entities: Entities,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

/// Per-conversation rolling routing memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    pub conversation_id: String,
    pub last_intent: Option<IntentKind>,
    #[serde(default)]
    pub last_entities: Entities,
    pub last_decision: Option<RoutingResult>,
    pub turns_routed: u64,
    pub updated_at: DateTime<Utc>,
}

impl RoutingContext {
    fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            last_intent: None,
            last_entities: Entities::default(),
            last_decision: None,
            turns_routed: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Router settings.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Agents that may be targeted; others fall back to `default_agent`.
    pub available_agents: Vec<AgentType>,
    pub default_agent: AgentType,
    /// Lifetime of the stored routing context; `None` keeps it forever.
    pub context_ttl: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            available_agents: AgentType::ALL.to_vec(),
            default_agent: AgentType::Inventory,
            context_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Deterministic intent → agent router with a store-backed rolling context.
pub struct AgentRouter {
    config: RouterConfig,
    store: Arc<dyn StateStore>,
}

impl AgentRouter {
    pub fn new(config: RouterConfig, store: Arc<dyn StateStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route one classified utterance.  Never fails: store errors are
    /// logged and routing continues without the prior.
    pub async fn route(
        &self,
        conversation_id: &str,
        utterance: &str,
        intent: &IntentResult,
        entities: &Entities,
    ) -> RoutingResult {
        let previous = self.load_context(conversation_id).await;

        let (mut target, mut reasoning) = match agent_for_intent(intent.intent) {
            Some(agent) => (agent, format!("intent {} maps to {agent}", intent.intent)),
            None => match agent_for_entities(entities) {
                Some((agent, why)) => (agent, format!("intent {} routed by {why}", intent.intent)),
                None => (
                    AgentType::Inventory,
                    format!("intent {} has no specific entities, defaulting to inventory", intent.intent),
                ),
            },
        };

        // Weak prior: only without keyword evidence and without entity hints.
        if !intent.has_keyword_evidence()
            && agent_for_entities(entities).is_none()
            && let Some(prev) = previous.as_ref().and_then(|ctx| ctx.last_decision.as_ref())
        {
            target = prev.target_agent;
            reasoning = format!("no keyword evidence, continuing with previous agent {target}");
        }

        let mut confidence = intent.confidence.clamp(0.0, 1.0);
        if has_entity_ambiguity(entities) {
            confidence *= AMBIGUITY_PENALTY;
            reasoning.push_str("; several distinct items or platforms lower confidence");
        }

        if !self.config.available_agents.contains(&target) {
            warn!(%target, default = %self.config.default_agent, "target agent unavailable");
            reasoning = format!(
                "agent {target} is not available, falling back to {}",
                self.config.default_agent
            );
            target = self.config.default_agent;
            confidence = MIN_ROUTING_CONFIDENCE;
        }

        let result = RoutingResult {
            target_agent: target,
            confidence,
            reasoning,
            extracted_entities: entities.clone(),
            suggested_actions: suggested_actions(target, entities),
        };

        info!(
            conversation_id,
            intent = %intent.intent,
            agent = %result.target_agent,
            confidence = result.confidence,
            "utterance routed"
        );
        debug!(utterance, reasoning = %result.reasoning, "routing detail");

        let mut ctx = previous.unwrap_or_else(|| RoutingContext::new(conversation_id));
        ctx.last_intent = Some(intent.intent);
        ctx.last_entities = entities.clone();
        ctx.last_decision = Some(result.clone());
        ctx.turns_routed += 1;
        ctx.updated_at = Utc::now();
        self.save_context(&ctx).await;

        result
    }

    /// A minimal-confidence result for the default agent.
    pub fn fallback(&self, reason: impl Into<String>) -> RoutingResult {
        RoutingResult {
            target_agent: self.config.default_agent,
            confidence: MIN_ROUTING_CONFIDENCE,
            reasoning: reason.into(),
            extracted_entities: Entities::default(),
            suggested_actions: Vec::new(),
        }
    }

    /// The stored routing context, if any.  Store errors read as a miss.
    pub async fn load_context(&self, conversation_id: &str) -> Option<RoutingContext> {
        match get_cached_typed(self.store.as_ref(), &context_key(conversation_id)).await {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(conversation_id, %err, "failed to load routing context");
                None
            }
        }
    }

    /// Drop the stored routing context.
    pub async fn clear_context(&self, conversation_id: &str) {
        if let Err(err) = self.store.invalidate(&context_key(conversation_id)).await {
            warn!(conversation_id, %err, "failed to clear routing context");
        }
    }

    async fn save_context(&self, ctx: &RoutingContext) {
        let key = context_key(&ctx.conversation_id);
        if let Err(err) = cache_typed(self.store.as_ref(), &key, ctx, self.config.context_ttl).await {
            warn!(conversation_id = %ctx.conversation_id, %err, "failed to save routing context");
        }
    }
}

/// Store key of a conversation's routing context.
pub fn context_key(conversation_id: &str) -> String {
    format!("routing:{conversation_id}")
}

// -- helpers ----------------------------------------------------------------

fn agent_for_intent(intent: IntentKind) -> Option<AgentType> {
    match intent {
        IntentKind::InventoryManagement => Some(AgentType::Inventory),
        IntentKind::ProcurementManagement => Some(AgentType::Procurement),
        IntentKind::FinancialAnalysis => Some(AgentType::Finance),
        IntentKind::NotificationManagement => Some(AgentType::Notification),
        IntentKind::QueryInformation | IntentKind::HelpRequest => None,
    }
}

/// The agent implied by entity content, with a short explanation.
fn agent_for_entities(entities: &Entities) -> Option<(AgentType, &'static str)> {
    if entities.has(EntityKind::Platform) || mentions_action(entities, ActionKind::Import) {
        Some((AgentType::Procurement, "platform entity"))
    } else if mentions_action(entities, ActionKind::Analyze) || entities.has(EntityKind::TimePeriod) {
        Some((AgentType::Finance, "analysis or time period entity"))
    } else if mentions_action(entities, ActionKind::Notify) {
        Some((AgentType::Notification, "notify action"))
    } else if entities.has(EntityKind::ItemName) {
        Some((AgentType::Inventory, "item entity"))
    } else {
        None
    }
}

fn has_entity_ambiguity(entities: &Entities) -> bool {
    entities.items.len() > 1 || entities.platforms.len() > 1
}

fn suggested_actions(agent: AgentType, entities: &Entities) -> Vec<String> {
    let action = match (agent, entities.action_kind()) {
        (_, Some(ActionKind::Add)) => "add_item",
        (_, Some(ActionKind::Consume)) => "consume_item",
        (_, Some(ActionKind::Update)) => "update_item",
        (_, Some(ActionKind::Delete)) => "delete_item",
        (_, Some(ActionKind::Import)) => "import_orders",
        (_, Some(ActionKind::Analyze)) => "analyze_spending",
        (_, Some(ActionKind::Notify)) => "schedule_reminder",
        (AgentType::Inventory, _) => "query_inventory",
        (AgentType::Procurement, _) => "review_shopping_list",
        (AgentType::Finance, _) => "summarize_spending",
        (AgentType::Notification, _) => "list_reminders",
    };
    vec![action.to_string()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use homestock_store::MemoryStateStore;

    use super::*;

    fn intent(kind: IntentKind, confidence: f64, keywords: &[&str]) -> IntentResult {
        IntentResult {
            intent: kind,
            confidence,
            entities: Entities::default(),
            reasoning: String::new(),
            matched_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn router(store: Arc<dyn StateStore>) -> AgentRouter {
        AgentRouter::new(RouterConfig::default(), store)
    }

    #[tokio::test]
    async fn intent_table_routing() {
        let r = router(Arc::new(MemoryStateStore::new()));
        let cases = [
            (IntentKind::InventoryManagement, AgentType::Inventory),
            (IntentKind::ProcurementManagement, AgentType::Procurement),
            (IntentKind::FinancialAnalysis, AgentType::Finance),
            (IntentKind::NotificationManagement, AgentType::Notification),
        ];
        for (kind, agent) in cases {
            let result = r
                .route("c1", "x", &intent(kind, 0.7, &["kw"]), &Entities::default())
                .await;
            assert_eq!(result.target_agent, agent);
            assert!((result.confidence - 0.7).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn query_routes_by_entities() {
        let r = router(Arc::new(MemoryStateStore::new()));
        let q = intent(IntentKind::QueryInformation, 0.6, &["查询"]);

        let platform = Entities {
            platform: Some("京东".into()),
            ..Entities::default()
        };
        assert_eq!(r.route("c1", "x", &q, &platform).await.target_agent, AgentType::Procurement);

        let period = Entities {
            time_period: Some("本月".into()),
            ..Entities::default()
        };
        assert_eq!(r.route("c1", "x", &q, &period).await.target_agent, AgentType::Finance);

        let nothing = r.route("c2", "x", &q, &Entities::default()).await;
        assert_eq!(nothing.target_agent, AgentType::Inventory);
        assert_eq!(nothing.suggested_actions, vec!["query_inventory".to_string()]);
    }

    #[tokio::test]
    async fn several_items_downgrade_confidence() {
        let r = router(Arc::new(MemoryStateStore::new()));
        let entities = Entities {
            item_name: Some("牛奶".into()),
            items: vec!["牛奶".into(), "鸡蛋".into()],
            ..Entities::default()
        };
        let result = r
            .route("c1", "x", &intent(IntentKind::InventoryManagement, 0.6, &["添加"]), &entities)
            .await;
        assert!((result.confidence - 0.48).abs() < 1e-9);
    }

    #[tokio::test]
    async fn prior_used_only_without_evidence() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let r = router(Arc::clone(&store));

        r.route("c1", "x", &intent(IntentKind::FinancialAnalysis, 0.6, &["花费"]), &Entities::default())
            .await;

        let vague = r
            .route("c1", "嗯", &intent(IntentKind::QueryInformation, 0.5, &[]), &Entities::default())
            .await;
        assert_eq!(vague.target_agent, AgentType::Finance);

        // Explicit intent wins over the prior.
        let explicit = r
            .route("c1", "x", &intent(IntentKind::NotificationManagement, 0.6, &["提醒"]), &Entities::default())
            .await;
        assert_eq!(explicit.target_agent, AgentType::Notification);

        let ctx = r.load_context("c1").await.unwrap();
        assert_eq!(ctx.turns_routed, 3);
        assert_eq!(ctx.last_intent, Some(IntentKind::NotificationManagement));
    }

    #[tokio::test]
    async fn unavailable_agent_falls_back_to_default() {
        let config = RouterConfig {
            available_agents: vec![AgentType::Inventory],
            ..RouterConfig::default()
        };
        let r = AgentRouter::new(config, Arc::new(MemoryStateStore::new()));
        let result = r
            .route("c1", "x", &intent(IntentKind::FinancialAnalysis, 0.8, &["预算"]), &Entities::default())
            .await;
        assert_eq!(result.target_agent, AgentType::Inventory);
        assert!((result.confidence - MIN_ROUTING_CONFIDENCE).abs() < 1e-9);
        assert!(result.reasoning.contains("not available"));
    }

    #[tokio::test]
    async fn clear_context_forgets_prior() {
        let r = router(Arc::new(MemoryStateStore::new()));
        r.route("c1", "x", &intent(IntentKind::FinancialAnalysis, 0.6, &["花费"]), &Entities::default())
            .await;
        assert!(r.load_context("c1").await.is_some());
        r.clear_context("c1").await;
        assert!(r.load_context("c1").await.is_none());
    }
}
