//! Understanding stages of the HomeStock pipeline.
//!
//! - **Classification**: keyword-table scoring via [`classifier::IntentClassifier`].
//! - **Extraction**: lexicon-driven entities via [`entities::EntityExtractor`].
//! - **Clarification**: actionable-or-ask decisions and bounded follow-up
//!   requests via [`clarification::ClarificationEngine`].
//! - **Routing**: intent → worker agent with a store-backed rolling context
//!   via [`router::AgentRouter`].
//!
//! All stages are rule-based and synchronous except routing, which touches
//! the state store.

pub mod clarification;
pub mod classifier;
pub mod entities;
pub mod error;
pub mod lexicon;
pub mod router;

pub use clarification::{
    ClarificationAnalysis, ClarificationEngine, ClarificationRequest, GuidanceType,
};
pub use classifier::{IntentClassifier, IntentResult};
pub use entities::{EntityExtractor, EntityResult};
pub use error::{IntentError, Result};
pub use router::{AgentRouter, RouterConfig, RoutingContext, RoutingResult};
