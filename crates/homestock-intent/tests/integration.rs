//! End-to-end tests of the understanding stages, wired the way the
//! conversation manager wires them.

use std::sync::Arc;

use homestock_kernel::{ActionKind, AgentType, EntityKind, IntentKind};
use homestock_store::{MemoryStateStore, StateStore};
use homestock_intent::{
    AgentRouter, ClarificationEngine, EntityExtractor, GuidanceType, IntentClassifier,
    RouterConfig,
};

struct Stages {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    clarification: ClarificationEngine,
    router: AgentRouter,
}

fn stages() -> Stages {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    Stages {
        classifier: IntentClassifier::new(IntentKind::QueryInformation).unwrap(),
        extractor: EntityExtractor::new().unwrap(),
        clarification: ClarificationEngine::new().unwrap(),
        router: AgentRouter::new(RouterConfig::default(), store),
    }
}

#[tokio::test]
async fn consume_tissue_routes_to_inventory() {
    let s = stages();
    let text = "抽纸消耗1包";

    let extracted = s.extractor.extract(text);
    let intent = s.classifier.classify(text, Some(&extracted.entities));
    assert_eq!(intent.intent, IntentKind::InventoryManagement);
    assert_eq!(intent.entities, extracted.entities);

    let analysis = s.clarification.analyze(text, &intent, &extracted, None);
    assert!(!analysis.needs_clarification);

    let routed = s.router.route("c1", text, &intent, &extracted.entities).await;
    assert_eq!(routed.target_agent, AgentType::Inventory);
    assert_eq!(routed.extracted_entities.item_name.as_deref(), Some("抽纸"));
    assert_eq!(routed.extracted_entities.action_kind(), Some(ActionKind::Consume));
    assert_eq!(routed.suggested_actions, vec!["consume_item".to_string()]);
}

#[tokio::test]
async fn import_with_platform_routes_to_procurement() {
    let s = stages();
    let text = "从京东导入订单";

    let extracted = s.extractor.extract(text);
    let intent = s.classifier.classify(text, Some(&extracted.entities));
    let analysis = s.clarification.analyze(text, &intent, &extracted, None);
    assert!(!analysis.needs_clarification, "{analysis:?}");

    let routed = s.router.route("c1", text, &intent, &extracted.entities).await;
    assert_eq!(routed.target_agent, AgentType::Procurement);
    assert_eq!(routed.suggested_actions, vec!["import_orders".to_string()]);
}

#[tokio::test]
async fn monthly_spending_routes_to_finance() {
    let s = stages();
    let text = "查看这个月的花费";

    let extracted = s.extractor.extract(text);
    assert!(extracted.fields.contains(&EntityKind::TimePeriod));
    let intent = s.classifier.classify(text, Some(&extracted.entities));
    let routed = s.router.route("c1", text, &intent, &extracted.entities).await;
    assert_eq!(routed.target_agent, AgentType::Finance);
}

#[test]
fn bare_add_needs_clarification() {
    let s = stages();
    let extracted = s.extractor.extract("添加");
    let intent = s.classifier.classify("添加", Some(&extracted.entities));
    let analysis = s.clarification.analyze("添加", &intent, &extracted, None);

    assert_eq!(analysis.guidance_type, Some(GuidanceType::IncompleteCommand));
    let request = s.clarification.build_request(&analysis, "添加", 3);
    assert_eq!(request.attempts, 1);
    assert_eq!(request.original_input, "添加");
}
