//! Conversation manager.
//!
//! One [`ConversationManager::process`] call per inbound utterance:
//!
//! ```text
//!   load context (live table → store → fresh)
//!        │
//!   pending clarification? ── yes ──► combine reply with original input
//!        │
//!   extract entities + classify intent
//!        │
//!   clarification needed? ── yes ──► persist request, return question
//!        │                            (or route anyway once exhausted)
//!   route
//!        │
//!   append turn, merge entities, trim history, persist
//! ```
//!
//! Store failures are logged and treated as misses; the turn carries on
//! with in-memory state.  Anything else that goes wrong produces a degraded
//! [`ConversationResult`] with `success = false`, never an error.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use homestock_intent::{
    AgentRouter, ClarificationEngine, ClarificationRequest, EntityExtractor, IntentClassifier,
    RoutingResult,
};
use homestock_kernel::{AgentType, Entities, IntentKind};
use homestock_store::{
    ConversationContext, ConversationTurn, StateStore, cache_typed, get_cached_typed,
};

use crate::config::HomeStockConfig;
use crate::error::{AgentError, Result};

/// Key of the routing decision stored in `contextual_info`.
pub const LAST_ROUTING_KEY: &str = "last_routing";

/// Store cache key of a conversation's pending clarification request.
pub fn clarification_key(conversation_id: &str) -> String {
    format!("clarification:{conversation_id}")
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of one conversational turn.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationResult {
    /// `false` only for degraded results.
    pub success: bool,
    pub conversation_id: String,
    /// Text to show the user.
    pub response: String,
    pub intent: IntentKind,
    pub confidence: f64,
    pub entities: Entities,
    /// `None` while a clarification question is outstanding.
    pub routing: Option<RoutingResult>,
    pub requires_clarification: bool,
    pub clarification: Option<ClarificationRequest>,
    /// Set when clarification was exhausted and the turn was routed anyway.
    pub forced_routing: bool,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Settings the manager reads on every turn.
#[derive(Debug, Clone)]
struct Limits {
    max_history: usize,
    max_clarification_attempts: u32,
    clarification_ttl: Option<Duration>,
    preferred_language: String,
    fallback_intent: IntentKind,
}

/// Top-level conversational coordinator.
pub struct ConversationManager {
    limits: Limits,
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    clarification: ClarificationEngine,
    router: AgentRouter,
    store: Arc<dyn StateStore>,
    live: DashMap<String, ConversationContext>,
}

impl ConversationManager {
    /// Build the pipeline.  Fails only if a lexicon matcher cannot be
    /// compiled.
    pub fn new(config: &HomeStockConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        let conversation = &config.conversation;
        Ok(Self {
            limits: Limits {
                max_history: conversation.max_conversation_history.max(1),
                max_clarification_attempts: conversation.max_clarification_attempts.max(1),
                clarification_ttl: config.clarification_ttl(),
                preferred_language: conversation.preferred_language.clone(),
                fallback_intent: conversation.fallback_intent,
            },
            classifier: IntentClassifier::new(conversation.fallback_intent)?,
            extractor: EntityExtractor::new()?,
            clarification: ClarificationEngine::new()?,
            router: AgentRouter::new(config.router_config(), Arc::clone(&store)),
            store,
            live: DashMap::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Process one utterance.  Never fails.
    #[instrument(skip(self, utterance))]
    pub async fn process(
        &self,
        utterance: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> ConversationResult {
        match self.try_process(utterance, conversation_id, user_id).await {
            Ok(result) => result,
            Err(err) => {
                warn!(conversation_id, error = %err, "turn failed, returning degraded result");
                self.degraded(conversation_id, &err)
            }
        }
    }

    /// The conversation's context: live table first, then the store.
    pub async fn get_context(&self, conversation_id: &str) -> Option<ConversationContext> {
        if let Some(ctx) = self.live.get(conversation_id) {
            return Some(ctx.value().clone());
        }
        match self.store.load_conversation_state(conversation_id).await {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(conversation_id, %err, "failed to load conversation state");
                None
            }
        }
    }

    /// The outstanding clarification request, if any.
    pub async fn pending_clarification(&self, conversation_id: &str) -> Option<ClarificationRequest> {
        let key = clarification_key(conversation_id);
        match get_cached_typed(self.store.as_ref(), &key).await {
            Ok(request) => request,
            Err(err) => {
                warn!(conversation_id, %err, "failed to load pending clarification");
                None
            }
        }
    }

    /// Forget a conversation: live entry, persisted state, pending
    /// clarification and routing context.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        self.live.remove(conversation_id);
        self.store.delete_conversation_state(conversation_id).await?;
        self.store
            .invalidate(&clarification_key(conversation_id))
            .await?;
        self.router.clear_context(conversation_id).await;
        info!(conversation_id, "conversation deleted");
        Ok(())
    }

    /// Ids of conversations held in the live table.
    pub fn active_conversations(&self) -> Vec<String> {
        self.live.iter().map(|e| e.key().clone()).collect()
    }

    // -- pipeline -------------------------------------------------------------

    async fn try_process(
        &self,
        utterance: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<ConversationResult> {
        if conversation_id.trim().is_empty() {
            return Err(AgentError::InvalidInput {
                reason: "conversation id must not be empty".into(),
            });
        }

        let mut ctx = self.load_or_create(conversation_id, user_id).await;
        let pending = self.pending_clarification(conversation_id).await;
        let text = match &pending {
            Some(request) => {
                debug!(
                    conversation_id,
                    attempts = request.attempts,
                    "treating utterance as a clarification reply"
                );
                request.combine(utterance)
            }
            None => utterance.trim().to_string(),
        };

        let extracted = self.extractor.extract(&text);
        let intent = self
            .classifier
            .classify(&text, Some(&extracted.entities));
        let analysis = self
            .clarification
            .analyze(&text, &intent, &extracted, Some(&ctx));

        let mut forced = false;
        if analysis.needs_clarification {
            let request = match &pending {
                Some(previous) => self.clarification.follow_up(previous, &analysis, &text),
                None => Some(self.clarification.build_request(
                    &analysis,
                    &text,
                    self.limits.max_clarification_attempts,
                )),
            };

            if let Some(request) = request {
                info!(
                    conversation_id,
                    intent = %intent.intent,
                    attempts = request.attempts,
                    reason = analysis.reason.as_deref().unwrap_or_default(),
                    "clarification requested"
                );
                cache_typed(
                    self.store.as_ref(),
                    &clarification_key(conversation_id),
                    &request,
                    self.limits.clarification_ttl,
                )
                .await
                .unwrap_or_else(|err| warn!(conversation_id, %err, "failed to persist clarification request"));

                let turn = ConversationTurn::new(
                    utterance,
                    request.question.clone(),
                    intent.intent,
                    extracted.entities.clone(),
                    None,
                );
                ctx.current_intent = Some(intent.intent);
                ctx.push_turn(turn, self.limits.max_history);
                ctx.touch();
                self.persist(ctx).await;

                return Ok(ConversationResult {
                    success: true,
                    conversation_id: conversation_id.to_string(),
                    response: request.question.clone(),
                    intent: intent.intent,
                    confidence: intent.confidence,
                    entities: extracted.entities,
                    routing: None,
                    requires_clarification: true,
                    clarification: Some(request),
                    forced_routing: false,
                    error: None,
                });
            }

            info!(conversation_id, "clarification exhausted, routing on best effort");
            forced = true;
        }

        if pending.is_some() {
            self.store
                .invalidate(&clarification_key(conversation_id))
                .await
                .unwrap_or_else(|err| warn!(conversation_id, %err, "failed to clear clarification request"));
        }

        let mut entities = extracted.entities;
        if entities.item_name.is_none()
            && let Some(item) = analysis.resolved_item
        {
            debug!(conversation_id, item = %item, "pronoun resolved from context");
            entities.item_name = Some(item);
        }

        let routing = self
            .router
            .route(conversation_id, &text, &intent, &entities)
            .await;
        let response = response_text(&routing, forced);

        ctx.entities.merge_from(&entities);
        ctx.current_intent = Some(intent.intent);
        ctx.contextual_info
            .insert(LAST_ROUTING_KEY.into(), serde_json::to_value(&routing)?);
        let evicted = ctx.push_turn(
            ConversationTurn::new(
                utterance,
                response.clone(),
                intent.intent,
                entities.clone(),
                Some(routing.target_agent),
            ),
            self.limits.max_history,
        );
        if evicted > 0 {
            debug!(conversation_id, evicted, "session history trimmed");
        }
        ctx.touch();
        self.persist(ctx).await;

        Ok(ConversationResult {
            success: true,
            conversation_id: conversation_id.to_string(),
            response,
            intent: intent.intent,
            confidence: routing.confidence,
            entities,
            routing: Some(routing),
            requires_clarification: false,
            clarification: None,
            forced_routing: forced,
            error: None,
        })
    }

    async fn load_or_create(&self, conversation_id: &str, user_id: &str) -> ConversationContext {
        if let Some(ctx) = self.get_context(conversation_id).await {
            return ctx;
        }
        debug!(conversation_id, user_id, "starting new conversation");
        ConversationContext::new(conversation_id, user_id, &self.limits.preferred_language)
    }

    /// Update the live table and write through to the store.
    async fn persist(&self, ctx: ConversationContext) {
        let id = ctx.conversation_id.clone();
        if let Err(err) = self.store.save_conversation_state(&id, &ctx).await {
            warn!(conversation_id = %id, %err, "failed to persist conversation state");
        }
        self.live.insert(id, ctx);
    }

    fn degraded(&self, conversation_id: &str, err: &AgentError) -> ConversationResult {
        let routing = self
            .router
            .fallback(format!("degraded result after internal failure: {err}"));
        ConversationResult {
            success: false,
            conversation_id: conversation_id.to_string(),
            response: "抱歉，处理您的请求时出现了问题，请稍后再试。".into(),
            intent: self.limits.fallback_intent,
            confidence: routing.confidence,
            entities: Entities::default(),
            routing: Some(routing),
            requires_clarification: false,
            clarification: None,
            forced_routing: false,
            error: Some(err.to_string()),
        }
    }
}

fn response_text(routing: &RoutingResult, forced: bool) -> String {
    let agent = match routing.target_agent {
        AgentType::Inventory => "库存",
        AgentType::Procurement => "采购",
        AgentType::Finance => "财务",
        AgentType::Notification => "提醒",
    };
    let mut text = String::new();
    if forced {
        text.push_str("未能完全确认您的需求，已按最可能的理解处理。");
    }
    text.push_str(&format!("已转交{agent}助手处理。"));
    text
}

#[cfg(test)]
mod tests {
    use homestock_kernel::ActionKind;
    use homestock_store::MemoryStateStore;

    use super::*;

    fn manager() -> ConversationManager {
        ConversationManager::new(&HomeStockConfig::default(), Arc::new(MemoryStateStore::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn actionable_turn_is_routed_and_recorded() {
        let mgr = manager();
        let result = mgr.process("抽纸消耗1包", "c1", "u1").await;

        assert!(result.success);
        assert!(!result.requires_clarification);
        assert_eq!(result.intent, IntentKind::InventoryManagement);
        assert_eq!(result.entities.item_name.as_deref(), Some("抽纸"));
        assert_eq!(result.entities.quantity, Some(1.0));
        assert_eq!(result.entities.action_kind(), Some(ActionKind::Consume));
        let routing = result.routing.unwrap();
        assert_eq!(routing.target_agent, AgentType::Inventory);

        let ctx = mgr.get_context("c1").await.unwrap();
        assert_eq!(ctx.session_history.len(), 1);
        assert_eq!(ctx.session_history[0].agent_id, Some(AgentType::Inventory));
        assert!(ctx.contextual_info.contains_key(LAST_ROUTING_KEY));
        assert_eq!(mgr.active_conversations(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn bare_verb_asks_for_clarification() {
        let mgr = manager();
        let result = mgr.process("添加", "c1", "u1").await;

        assert!(result.success);
        assert!(result.requires_clarification);
        assert!(result.routing.is_none());
        let request = result.clarification.unwrap();
        assert_eq!(request.attempts, 1);
        assert_eq!(mgr.pending_clarification("c1").await, Some(request));
    }

    #[tokio::test]
    async fn reply_resolves_pending_request() {
        let mgr = manager();
        mgr.process("添加", "c1", "u1").await;
        let result = mgr.process("牛奶2瓶", "c1", "u1").await;

        assert!(!result.requires_clarification);
        assert!(!result.forced_routing);
        assert_eq!(result.entities.item_name.as_deref(), Some("牛奶"));
        assert_eq!(result.entities.quantity, Some(2.0));
        assert_eq!(result.routing.unwrap().target_agent, AgentType::Inventory);
        assert!(mgr.pending_clarification("c1").await.is_none());
    }

    #[tokio::test]
    async fn empty_conversation_id_degrades() {
        let mgr = manager();
        let result = mgr.process("抽纸消耗1包", "  ", "u1").await;

        assert!(!result.success);
        assert!(result.error.is_some());
        let routing = result.routing.unwrap();
        assert_eq!(routing.target_agent, AgentType::Inventory);
        assert!(routing.confidence <= 0.1);
        assert!(mgr.active_conversations().is_empty());
    }

    #[test]
    fn forced_response_mentions_best_effort() {
        let routing = RoutingResult {
            target_agent: AgentType::Finance,
            confidence: 0.6,
            reasoning: String::new(),
            extracted_entities: Entities::default(),
            suggested_actions: Vec::new(),
        };
        assert_eq!(response_text(&routing, false), "已转交财务助手处理。");
        assert!(response_text(&routing, true).starts_with("未能完全确认"));
    }
}
