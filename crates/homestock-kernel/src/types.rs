//! Core domain vocabulary shared by every HomeStock crate.
//!
//! Intent labels, worker-agent kinds, normalised action verbs, and the typed
//! [`Entities`] record that replaces free-form entity maps when data crosses
//! component boundaries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;

// ---------------------------------------------------------------------------
// Intent labels
// ---------------------------------------------------------------------------

/// The fixed set of intents the classifier can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    InventoryManagement,
    ProcurementManagement,
    FinancialAnalysis,
    NotificationManagement,
    QueryInformation,
    HelpRequest,
}

impl IntentKind {
    /// All intents in classifier table order.
    pub const ALL: [IntentKind; 6] = [
        Self::InventoryManagement,
        Self::ProcurementManagement,
        Self::FinancialAnalysis,
        Self::NotificationManagement,
        Self::QueryInformation,
        Self::HelpRequest,
    ];

    /// Stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InventoryManagement => "inventory_management",
            Self::ProcurementManagement => "procurement_management",
            Self::FinancialAnalysis => "financial_analysis",
            Self::NotificationManagement => "notification_management",
            Self::QueryInformation => "query_information",
            Self::HelpRequest => "help_request",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalised)
            .ok_or_else(|| KernelError::UnknownLabel {
                kind: "intent",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Worker agent kinds
// ---------------------------------------------------------------------------

/// The specialised worker agents an utterance can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Inventory,
    Procurement,
    Finance,
    Notification,
}

impl AgentType {
    pub const ALL: [AgentType; 4] = [
        Self::Inventory,
        Self::Procurement,
        Self::Finance,
        Self::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Procurement => "procurement",
            Self::Finance => "finance",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|agent| agent.as_str() == normalised)
            .ok_or_else(|| KernelError::UnknownLabel {
                kind: "agent",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Normalised action verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Consume,
    Update,
    Delete,
    Query,
    Import,
    Analyze,
    Notify,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Consume => "consume",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Query => "query",
            Self::Import => "import",
            Self::Analyze => "analyze",
            Self::Notify => "notify",
        }
    }

    /// Whether an inventory command with this action must name an item.
    pub fn requires_item(&self) -> bool {
        matches!(self, Self::Add | Self::Consume | Self::Update)
    }

    /// Whether an inventory command with this action must carry a quantity.
    pub fn requires_quantity(&self) -> bool {
        matches!(self, Self::Add | Self::Consume)
    }

    /// Whether the verb is meaningless without an object.
    pub fn requires_object(&self) -> bool {
        matches!(self, Self::Add | Self::Consume | Self::Import)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action mention: the normalised kind plus the verb as the user wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntity {
    pub kind: ActionKind,
    pub verb: String,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Known entity kinds, used for required/missing entity bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ItemName,
    Quantity,
    Unit,
    Platform,
    Action,
    TimePeriod,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItemName => "item_name",
            Self::Quantity => "quantity",
            Self::Unit => "unit",
            Self::Platform => "platform",
            Self::Action => "action",
            Self::TimePeriod => "time_period",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured fields extracted from an utterance.
///
/// Scalar fields hold the canonical value (first match); the plural lists
/// hold every match when more than one was found.  Absent fields are
/// omitted from the serialized form rather than written as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quantities: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_period: Option<String>,
    /// Keys no extractor knows about.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Entities {
    /// `true` when no field at all is populated.
    pub fn is_empty(&self) -> bool {
        self.present_kinds().is_empty() && self.extra.is_empty()
    }

    /// Whether a value of the given kind is present (scalar or list form).
    pub fn has(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::ItemName => self.item_name.is_some() || !self.items.is_empty(),
            EntityKind::Quantity => self.quantity.is_some() || !self.quantities.is_empty(),
            EntityKind::Unit => self.unit.is_some(),
            EntityKind::Platform => self.platform.is_some() || !self.platforms.is_empty(),
            EntityKind::Action => self.action.is_some() || !self.actions.is_empty(),
            EntityKind::TimePeriod => self.time_period.is_some(),
        }
    }

    /// Every entity kind present, in declaration order.
    pub fn present_kinds(&self) -> Vec<EntityKind> {
        [
            EntityKind::ItemName,
            EntityKind::Quantity,
            EntityKind::Unit,
            EntityKind::Platform,
            EntityKind::Action,
            EntityKind::TimePeriod,
        ]
        .into_iter()
        .filter(|kind| self.has(*kind))
        .collect()
    }

    /// The normalised kind of the canonical action, if any.
    pub fn action_kind(&self) -> Option<ActionKind> {
        self.action.as_ref().map(|a| a.kind)
    }

    /// Last-known-good merge: fields present in `newer` replace ours,
    /// fields absent from `newer` keep their previous value.
    pub fn merge_from(&mut self, newer: &Entities) {
        if newer.item_name.is_some() {
            self.item_name = newer.item_name.clone();
        }
        if !newer.items.is_empty() {
            self.items = newer.items.clone();
        }
        if newer.quantity.is_some() {
            self.quantity = newer.quantity;
        }
        if !newer.quantities.is_empty() {
            self.quantities = newer.quantities.clone();
        }
        if newer.unit.is_some() {
            self.unit = newer.unit.clone();
        }
        if newer.platform.is_some() {
            self.platform = newer.platform.clone();
        }
        if !newer.platforms.is_empty() {
            self.platforms = newer.platforms.clone();
        }
        if newer.action.is_some() {
            self.action = newer.action.clone();
        }
        if !newer.actions.is_empty() {
            self.actions = newer.actions.clone();
        }
        if newer.time_period.is_some() {
            self.time_period = newer.time_period.clone();
        }
        for (key, value) in &newer.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_labels_round_trip_through_from_str() {
        for intent in IntentKind::ALL {
            assert_eq!(intent.as_str().parse::<IntentKind>().unwrap(), intent);
        }
        assert_eq!(
            "Inventory-Management".parse::<IntentKind>().unwrap(),
            IntentKind::InventoryManagement
        );
        assert!("shopping".parse::<IntentKind>().is_err());
    }

    #[test]
    fn agent_type_serializes_lowercase() {
        let json = serde_json::to_string(&AgentType::Procurement).unwrap();
        assert_eq!(json, "\"procurement\"");
        assert_eq!("FINANCE".parse::<AgentType>().unwrap(), AgentType::Finance);
    }

    #[test]
    fn absent_fields_are_omitted() {
        let entities = Entities {
            item_name: Some("抽纸".into()),
            ..Entities::default()
        };
        let json = serde_json::to_value(&entities).unwrap();
        assert_eq!(json, serde_json::json!({"item_name": "抽纸"}));
    }

    #[test]
    fn merge_keeps_last_known_good() {
        let mut current = Entities {
            item_name: Some("牛奶".into()),
            quantity: Some(2.0),
            unit: Some("瓶".into()),
            ..Entities::default()
        };
        let newer = Entities {
            quantity: Some(5.0),
            platform: Some("京东".into()),
            ..Entities::default()
        };
        current.merge_from(&newer);

        assert_eq!(current.item_name.as_deref(), Some("牛奶"));
        assert_eq!(current.quantity, Some(5.0));
        assert_eq!(current.unit.as_deref(), Some("瓶"));
        assert_eq!(current.platform.as_deref(), Some("京东"));
    }

    #[test]
    fn has_accepts_list_forms() {
        let entities = Entities {
            quantities: vec![1.0, 2.0],
            ..Entities::default()
        };
        assert!(entities.has(EntityKind::Quantity));
        assert!(!entities.has(EntityKind::ItemName));
        assert_eq!(entities.present_kinds(), vec![EntityKind::Quantity]);
    }

    #[test]
    fn action_requirements() {
        assert!(ActionKind::Add.requires_quantity());
        assert!(ActionKind::Update.requires_item());
        assert!(!ActionKind::Update.requires_quantity());
        assert!(ActionKind::Import.requires_object());
        assert!(!ActionKind::Query.requires_object());
    }
}
