//! Clarification engine.
//!
//! Decides whether an utterance is actionable or needs a follow-up question.
//! Checks run in a fixed order and the first hit wins:
//!
//! 1. intent confidence below [`AMBIGUOUS_INTENT_THRESHOLD`] → ambiguous intent
//! 2. required entities missing for the intent/action → entity missing
//! 3. unresolvable pronouns, vague quantifiers, relative times → context needed
//! 4. too short, a bare verb, or a verb with no object → incomplete command
//!
//! The dialog itself (pending → reply → resolved or re-asked, bounded by
//! `max_attempts`) is driven by the conversation manager; this module only
//! builds and escalates [`ClarificationRequest`]s.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use aho_corasick::AhoCorasick;
use homestock_kernel::{ActionKind, EntityKind, IntentKind};
use homestock_store::ConversationContext;

use crate::classifier::IntentResult;
use crate::entities::EntityResult;
use crate::error::{IntentError, Result};
use crate::lexicon::{self, ITEMS, PLATFORMS, PRONOUNS, QUANTIFIERS, TIME_PERIODS, TIME_RELATIVES};

/// Intent confidence strictly below this asks the user what they meant.
pub const AMBIGUOUS_INTENT_THRESHOLD: f64 = 0.5;

/// Inputs shorter than this (in characters) are incomplete.
pub const MIN_INPUT_CHARS: usize = 3;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why a clarification is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuidanceType {
    AmbiguousIntent,
    EntityMissing,
    IncompleteCommand,
    ContextNeeded,
}

/// Result of [`ClarificationEngine::analyze`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClarificationAnalysis {
    pub needs_clarification: bool,
    pub reason: Option<String>,
    #[serde(default)]
    pub missing_entities: Vec<EntityKind>,
    #[serde(default)]
    pub ambiguous_terms: Vec<String>,
    pub guidance_type: Option<GuidanceType>,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
    /// Item a pronoun was resolved to from the conversation context.
    pub resolved_item: Option<String>,
}

impl ClarificationAnalysis {
    fn actionable(resolved_item: Option<String>) -> Self {
        Self {
            resolved_item,
            ..Self::default()
        }
    }

    fn clarify(guidance: GuidanceType, reason: impl Into<String>, questions: Vec<String>) -> Self {
        Self {
            needs_clarification: true,
            reason: Some(reason.into()),
            guidance_type: Some(guidance),
            suggested_questions: questions,
            ..Self::default()
        }
    }
}

/// A pending follow-up question.  At most one exists per conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub request_id: Uuid,
    pub question: String,
    #[serde(default)]
    pub missing_entities: Vec<EntityKind>,
    pub guidance_type: GuidanceType,
    /// Questions asked so far in this dialog, starting at 1.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Everything the user has said in this dialog, space separated.
    pub original_input: String,
    #[serde(default)]
    pub suggested_responses: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ClarificationRequest {
    /// Whether another question would exceed `max_attempts`.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// The reply appended to the input that triggered this request.
    pub fn combine(&self, reply: &str) -> String {
        let reply = reply.trim();
        if reply.is_empty() {
            return self.original_input.clone();
        }
        format!("{} {reply}", self.original_input)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermClass {
    Pronoun,
    Quantifier,
    TimeRelative,
}

/// Stateless rule engine; build once and share.
pub struct ClarificationEngine {
    time_periods: AhoCorasick,
    ambiguous: Regex,
    /// Capture group index (minus one) → class.
    classes: Vec<TermClass>,
}

impl ClarificationEngine {
    pub fn new() -> Result<Self> {
        let mut alternatives = Vec::new();
        let mut classes = Vec::new();
        for (table, class) in [
            (PRONOUNS, TermClass::Pronoun),
            (QUANTIFIERS, TermClass::Quantifier),
            (TIME_RELATIVES, TermClass::TimeRelative),
        ] {
            for term in table {
                let escaped = regex::escape(term);
                // English terms must stand alone: `it` is not `item`.
                if term.is_ascii() {
                    alternatives.push(format!(r"(\b{escaped}\b)"));
                } else {
                    alternatives.push(format!("({escaped})"));
                }
                classes.push(class);
            }
        }
        let pattern = format!("(?i){}", alternatives.join("|"));
        let ambiguous = Regex::new(&pattern).map_err(|e| IntentError::InvalidPattern {
            pattern,
            reason: e.to_string(),
        })?;

        Ok(Self {
            time_periods: lexicon::matcher("time periods", TIME_PERIODS)?,
            ambiguous,
            classes,
        })
    }

    /// Decide whether `utterance` needs clarification.
    pub fn analyze(
        &self,
        utterance: &str,
        intent: &IntentResult,
        entities: &EntityResult,
        context: Option<&ConversationContext>,
    ) -> ClarificationAnalysis {
        let text = utterance.trim().to_lowercase();
        let found = &entities.entities;

        // 1. Ambiguous intent.
        if intent.confidence < AMBIGUOUS_INTENT_THRESHOLD {
            let mut questions = Vec::new();
            if let Some(action) = &found.action {
                questions.push(format!("您想对哪个物品执行「{}」操作？", action.verb));
            }
            questions.push("请问您是想管理库存、采购商品、查看花费，还是设置提醒？".to_string());
            debug!(confidence = intent.confidence, "clarification: ambiguous intent");
            return ClarificationAnalysis::clarify(
                GuidanceType::AmbiguousIntent,
                format!("intent confidence {:.2} is too low", intent.confidence),
                questions,
            );
        }

        let (pronouns, vague) = self.ambiguous_terms(&text);
        let resolved_item = if found.item_name.is_none() && !pronouns.is_empty() {
            context.and_then(|ctx| ctx.entities.item_name.clone())
        } else {
            None
        };
        let has_item = found.has(EntityKind::ItemName) || resolved_item.is_some();
        let bare_verb = lexicon::is_bare_action(&text);

        // 2. Required entities.  A bare verb is handled as incomplete below.
        if !bare_verb {
            let missing = required_missing(intent.intent, found.action_kind(), has_item, entities);
            if !missing.is_empty() {
                let questions = missing.iter().map(|kind| question_for(*kind)).collect();
                let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
                debug!(missing = ?names, "clarification: entity missing");
                let mut analysis = ClarificationAnalysis::clarify(
                    GuidanceType::EntityMissing,
                    format!("missing required entities: {}", names.join(", ")),
                    questions,
                );
                analysis.missing_entities = missing;
                return analysis;
            }
        }

        // 3. Context needed.
        let mut terms = vague;
        if found.item_name.is_none() && resolved_item.is_none() {
            terms.extend(pronouns);
        }
        if !terms.is_empty() {
            let questions = terms
                .iter()
                .map(|t| format!("「{t}」具体指的是什么？"))
                .collect();
            debug!(terms = ?terms, "clarification: context needed");
            let mut analysis = ClarificationAnalysis::clarify(
                GuidanceType::ContextNeeded,
                format!("ambiguous references: {}", terms.join(", ")),
                questions,
            );
            analysis.ambiguous_terms = terms;
            return analysis;
        }

        // 4. Incomplete command.
        let too_short = text.chars().count() < MIN_INPUT_CHARS;
        let missing_object = found.action_kind().is_some_and(|kind| {
            kind.requires_object()
                && match kind {
                    ActionKind::Import => !found.has(EntityKind::Platform) && !has_item,
                    _ => !has_item,
                }
        });
        if too_short || bare_verb || missing_object {
            let reason = if too_short {
                "input is too short"
            } else if bare_verb {
                "bare action verb without an object"
            } else {
                "action has no object"
            };
            debug!(reason, "clarification: incomplete command");
            return ClarificationAnalysis::clarify(
                GuidanceType::IncompleteCommand,
                reason,
                vec!["请补充完整的指令，例如「抽纸消耗1包」或「添加牛奶2瓶」。".to_string()],
            );
        }

        ClarificationAnalysis::actionable(resolved_item)
    }

    /// Create the first request of a dialog (`attempts = 1`).
    pub fn build_request(
        &self,
        analysis: &ClarificationAnalysis,
        original_input: &str,
        max_attempts: u32,
    ) -> ClarificationRequest {
        let guidance = analysis
            .guidance_type
            .unwrap_or(GuidanceType::IncompleteCommand);
        let question = if analysis.suggested_questions.is_empty() {
            "能再具体说明一下吗？".to_string()
        } else {
            analysis.suggested_questions.join(" ")
        };

        ClarificationRequest {
            request_id: Uuid::now_v7(),
            question,
            missing_entities: analysis.missing_entities.clone(),
            guidance_type: guidance,
            attempts: 1,
            max_attempts: max_attempts.max(1),
            original_input: original_input.trim().to_string(),
            suggested_responses: suggested_responses(guidance, &analysis.missing_entities),
            timestamp: Utc::now(),
        }
    }

    /// Ask again after an unresolved reply.
    ///
    /// Returns `None` once another question would exceed `max_attempts`; the
    /// caller then routes on a best-effort basis.
    pub fn follow_up(
        &self,
        previous: &ClarificationRequest,
        analysis: &ClarificationAnalysis,
        combined_input: &str,
    ) -> Option<ClarificationRequest> {
        if previous.is_exhausted() {
            warn!(
                attempts = previous.attempts,
                max_attempts = previous.max_attempts,
                "clarification attempts exhausted"
            );
            return None;
        }
        let mut next = self.build_request(analysis, combined_input, previous.max_attempts);
        next.request_id = previous.request_id;
        next.attempts = previous.attempts + 1;
        Some(next)
    }

    /// Ambiguous terms found in `text`, split into pronouns and the rest.
    fn ambiguous_terms(&self, text: &str) -> (Vec<String>, Vec<String>) {
        // `这个月` is a time period, not the pronoun `这个`.
        let scan = match lexicon::mask(&self.time_periods, text) {
            Ok(masked) => masked,
            Err(err) => {
                warn!(%err, "time period masking failed");
                text.to_string()
            }
        };

        let mut pronouns: Vec<String> = Vec::new();
        let mut vague: Vec<String> = Vec::new();
        for caps in self.ambiguous.captures_iter(&scan) {
            let Some((idx, m)) = caps
                .iter()
                .enumerate()
                .skip(1)
                .find_map(|(i, m)| m.map(|m| (i, m)))
            else {
                continue;
            };
            let term = m.as_str().to_string();
            let bucket = match self.classes[idx - 1] {
                TermClass::Pronoun => &mut pronouns,
                TermClass::Quantifier | TermClass::TimeRelative => &mut vague,
            };
            if !bucket.contains(&term) {
                bucket.push(term);
            }
        }
        (pronouns, vague)
    }
}

// -- helpers ----------------------------------------------------------------

fn required_missing(
    intent: IntentKind,
    action: Option<ActionKind>,
    has_item: bool,
    entities: &EntityResult,
) -> Vec<EntityKind> {
    let Some(action) = action else {
        return Vec::new();
    };
    let found = &entities.entities;
    let mut missing = Vec::new();
    match intent {
        IntentKind::InventoryManagement => {
            if action.requires_item() && !has_item {
                missing.push(EntityKind::ItemName);
            }
            if action.requires_quantity() && !found.has(EntityKind::Quantity) {
                missing.push(EntityKind::Quantity);
            }
        }
        IntentKind::ProcurementManagement => {
            if action == ActionKind::Import && !found.has(EntityKind::Platform) {
                missing.push(EntityKind::Platform);
            }
        }
        _ => {}
    }
    missing
}

fn question_for(kind: EntityKind) -> String {
    match kind {
        EntityKind::ItemName => "请问是哪个物品？",
        EntityKind::Quantity => "请问数量是多少？",
        EntityKind::Unit => "请问单位是什么（包、瓶、盒……）？",
        EntityKind::Platform => "请问是从哪个平台导入？（如淘宝、京东、拼多多）",
        EntityKind::Action => "请问您想做什么操作？",
        EntityKind::TimePeriod => "请问是哪个时间段？",
    }
    .to_string()
}

fn suggested_responses(guidance: GuidanceType, missing: &[EntityKind]) -> Vec<String> {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    match guidance {
        GuidanceType::AmbiguousIntent => owned(&["查看库存", "添加物品", "查看本月花费", "设置提醒"]),
        GuidanceType::IncompleteCommand => owned(&["抽纸消耗1包", "添加牛奶2瓶", "查询库存"]),
        GuidanceType::ContextNeeded => owned(&ITEMS[..3]),
        GuidanceType::EntityMissing => match missing.first() {
            Some(EntityKind::Platform) => owned(&PLATFORMS[..3]),
            Some(EntityKind::Quantity) => owned(&["1包", "2瓶", "3盒"]),
            Some(EntityKind::TimePeriod) => owned(&TIME_PERIODS[..3]),
            _ => owned(&ITEMS[..3]),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentClassifier;
    use crate::entities::EntityExtractor;

    struct Pipeline {
        classifier: IntentClassifier,
        extractor: EntityExtractor,
        engine: ClarificationEngine,
    }

    impl Pipeline {
        fn new() -> Self {
            Self {
                classifier: IntentClassifier::new(IntentKind::QueryInformation).unwrap(),
                extractor: EntityExtractor::new().unwrap(),
                engine: ClarificationEngine::new().unwrap(),
            }
        }

        fn analyze(&self, text: &str, ctx: Option<&ConversationContext>) -> ClarificationAnalysis {
            let entities = self.extractor.extract(text);
            let intent = self.classifier.classify(text, Some(&entities.entities));
            self.engine.analyze(text, &intent, &entities, ctx)
        }
    }

    #[test]
    fn complete_command_is_actionable() {
        let analysis = Pipeline::new().analyze("抽纸消耗1包", None);
        assert!(!analysis.needs_clarification);
        assert_eq!(analysis.guidance_type, None);
    }

    #[test]
    fn bare_verb_is_incomplete() {
        let p = Pipeline::new();
        let analysis = p.analyze("添加", None);
        assert!(analysis.needs_clarification);
        assert_eq!(analysis.guidance_type, Some(GuidanceType::IncompleteCommand));

        let request = p.engine.build_request(&analysis, "添加", 3);
        assert_eq!(request.attempts, 1);
        assert_eq!(request.max_attempts, 3);
        assert!(!request.suggested_responses.is_empty());
    }

    #[test]
    fn low_confidence_asks_about_intent() {
        let p = Pipeline::new();
        let entities = p.extractor.extract("添加牛奶");
        let intent = IntentResult {
            intent: IntentKind::QueryInformation,
            confidence: 0.3,
            entities: entities.entities.clone(),
            reasoning: "error".into(),
            matched_keywords: Vec::new(),
        };
        let analysis = p.engine.analyze("添加牛奶", &intent, &entities, None);
        assert_eq!(analysis.guidance_type, Some(GuidanceType::AmbiguousIntent));
        assert_eq!(analysis.suggested_questions.len(), 2);
        assert!(analysis.suggested_questions[0].contains("添加"));
    }

    #[test]
    fn missing_quantity_and_item() {
        let p = Pipeline::new();
        let analysis = p.analyze("添加牛奶", None);
        assert_eq!(analysis.guidance_type, Some(GuidanceType::EntityMissing));
        assert_eq!(analysis.missing_entities, vec![EntityKind::Quantity]);

        let analysis = p.analyze("消耗了2包", None);
        assert_eq!(analysis.missing_entities, vec![EntityKind::ItemName]);
    }

    #[test]
    fn import_requires_platform() {
        let analysis = Pipeline::new().analyze("导入订单", None);
        assert_eq!(analysis.guidance_type, Some(GuidanceType::EntityMissing));
        assert_eq!(analysis.missing_entities, vec![EntityKind::Platform]);
    }

    #[test]
    fn pronoun_resolves_from_context() {
        let p = Pipeline::new();
        let analysis = p.analyze("它还有多少", None);
        assert_eq!(analysis.guidance_type, Some(GuidanceType::ContextNeeded));
        assert_eq!(analysis.ambiguous_terms, vec!["它".to_string()]);

        let mut ctx = ConversationContext::new("c1", "u1", "zh-CN");
        ctx.entities.item_name = Some("牛奶".into());
        let analysis = p.analyze("它还有多少", Some(&ctx));
        assert!(!analysis.needs_clarification);
        assert_eq!(analysis.resolved_item.as_deref(), Some("牛奶"));
    }

    #[test]
    fn quantifiers_always_need_context() {
        let mut ctx = ConversationContext::new("c1", "u1", "zh-CN");
        ctx.entities.item_name = Some("牛奶".into());
        let analysis = Pipeline::new().analyze("最近花了多少钱", Some(&ctx));
        assert_eq!(analysis.guidance_type, Some(GuidanceType::ContextNeeded));
        assert_eq!(analysis.ambiguous_terms, vec!["最近".to_string()]);
    }

    #[test]
    fn time_periods_are_not_pronouns() {
        let analysis = Pipeline::new().analyze("这个月花了多少钱", None);
        assert!(!analysis.needs_clarification, "{analysis:?}");
    }

    #[test]
    fn english_pronouns_need_word_boundaries() {
        let p = Pipeline::new();
        assert!(!p.analyze("check stock item list", None).needs_clarification);
        let analysis = p.analyze("how many of it remaining", None);
        assert_eq!(analysis.ambiguous_terms, vec!["it".to_string()]);
    }

    #[test]
    fn follow_up_is_bounded() {
        let p = Pipeline::new();
        let analysis = p.analyze("添加", None);
        let first = p.engine.build_request(&analysis, "添加", 2);
        let combined = first.combine("嗯");
        assert_eq!(combined, "添加 嗯");

        let second = p.engine.follow_up(&first, &analysis, &combined).unwrap();
        assert_eq!(second.attempts, 2);
        assert_eq!(second.request_id, first.request_id);
        assert_eq!(second.original_input, "添加 嗯");
        assert!(second.is_exhausted());
        assert!(p.engine.follow_up(&second, &analysis, "添加 嗯 嗯").is_none());
    }

    #[test]
    fn guidance_serializes_kebab_case() {
        let json = serde_json::to_string(&GuidanceType::IncompleteCommand).unwrap();
        assert_eq!(json, "\"incomplete-command\"");
    }
}
