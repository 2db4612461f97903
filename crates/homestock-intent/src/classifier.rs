//! Keyword-table intent classifier.
//!
//! Every keyword of every intent is compiled into a single ASCII
//! case-insensitive [`AhoCorasick`] automaton.  An utterance is scored by
//! counting, per intent, how many *distinct* keywords occur in it as
//! substrings (overlapping matches included, so `购买` counts both `购买`
//! and `买`).
//!
//! | Matches | Confidence |
//! |---------|------------|
//! | 0       | 0.5 (fallback intent) |
//! | n ≥ 1   | `min(0.9, 0.5 + 0.1 × n)` |
//! | error   | 0.3 (fallback intent) |

use std::collections::BTreeSet;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use homestock_kernel::{Entities, IntentKind};

use crate::error::{IntentError, Result};
use crate::lexicon::INTENT_KEYWORDS;

/// Confidence reported when no keyword matched.
pub const NO_MATCH_CONFIDENCE: f64 = 0.5;

/// Confidence reported when classification itself failed.
pub const ERROR_CONFIDENCE: f64 = 0.3;

const MAX_CONFIDENCE: f64 = 0.9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of classifying one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: IntentKind,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    /// Extractor output, when the caller supplied it.
    #[serde(default)]
    pub entities: Entities,
    pub reasoning: String,
    /// Distinct keywords that counted towards the winning intent.
    #[serde(default)]
    pub matched_keywords: Vec<String>,
}

impl IntentResult {
    /// Whether any keyword supported the chosen intent.
    pub fn has_keyword_evidence(&self) -> bool {
        !self.matched_keywords.is_empty()
    }

    fn fallback(intent: IntentKind, confidence: f64, reasoning: String, entities: Entities) -> Self {
        Self {
            intent,
            confidence,
            entities,
            reasoning,
            matched_keywords: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Rule-based intent classifier.
pub struct IntentClassifier {
    automaton: AhoCorasick,
    /// Pattern index → (intent, keyword).
    keywords: Vec<(IntentKind, &'static str)>,
    fallback: IntentKind,
}

impl IntentClassifier {
    /// Build the classifier over the built-in keyword table.
    pub fn new(fallback: IntentKind) -> Result<Self> {
        let keywords: Vec<(IntentKind, &'static str)> = INTENT_KEYWORDS
            .iter()
            .flat_map(|(intent, kws)| kws.iter().map(move |kw| (*intent, *kw)))
            .collect();

        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(keywords.iter().map(|(_, kw)| kw))
            .map_err(|e| IntentError::Automaton {
                name: "intent keywords",
                reason: e.to_string(),
            })?;

        debug!(keywords = keywords.len(), %fallback, "intent classifier built");

        Ok(Self {
            automaton,
            keywords,
            fallback,
        })
    }

    pub fn fallback_intent(&self) -> IntentKind {
        self.fallback
    }

    /// Classify an utterance.  Never fails.
    ///
    /// `entities` is echoed into the result when the caller has already run
    /// the extractor.
    pub fn classify(&self, utterance: &str, entities: Option<&Entities>) -> IntentResult {
        let entities = entities.cloned().unwrap_or_default();
        let text = utterance.trim().to_lowercase();

        if text.is_empty() {
            return IntentResult::fallback(
                self.fallback,
                NO_MATCH_CONFIDENCE,
                format!("empty input, using fallback intent {}", self.fallback),
                entities,
            );
        }

        let scores = match self.score(&text) {
            Ok(scores) => scores,
            Err(err) => {
                warn!(%err, "intent scoring failed, using fallback");
                return IntentResult::fallback(
                    self.fallback,
                    ERROR_CONFIDENCE,
                    format!("classification error ({err}), using fallback intent {}", self.fallback),
                    entities,
                );
            }
        };

        // Strictly greater keeps the earlier label on ties.
        let mut best: Option<(IntentKind, &BTreeSet<&'static str>)> = None;
        for (intent, matched) in &scores {
            if matched.is_empty() {
                continue;
            }
            if best.is_none_or(|(_, current)| matched.len() > current.len()) {
                best = Some((*intent, matched));
            }
        }

        let Some((intent, matched)) = best else {
            debug!(utterance, fallback = %self.fallback, "no intent keyword matched");
            return IntentResult::fallback(
                self.fallback,
                NO_MATCH_CONFIDENCE,
                format!("no keyword matched, using fallback intent {}", self.fallback),
                entities,
            );
        };

        let confidence = (NO_MATCH_CONFIDENCE + 0.1 * matched.len() as f64).min(MAX_CONFIDENCE);
        let matched_keywords: Vec<String> = matched.iter().map(|kw| kw.to_string()).collect();
        debug!(%intent, confidence, matched = matched_keywords.len(), "intent classified");

        IntentResult {
            intent,
            confidence,
            entities,
            reasoning: format!(
                "matched {} keyword(s) for {intent}: {}",
                matched_keywords.len(),
                matched_keywords.join(", ")
            ),
            matched_keywords,
        }
    }

    /// Distinct matched keywords per intent, in table order.
    fn score(&self, text: &str) -> Result<Vec<(IntentKind, BTreeSet<&'static str>)>> {
        let mut scores: Vec<(IntentKind, BTreeSet<&'static str>)> = INTENT_KEYWORDS
            .iter()
            .map(|(intent, _)| (*intent, BTreeSet::new()))
            .collect();

        for mat in self.automaton.try_find_overlapping_iter(text)? {
            let (intent, keyword) = self.keywords[mat.pattern().as_usize()];
            if let Some((_, set)) = scores.iter_mut().find(|(i, _)| *i == intent) {
                set.insert(keyword);
            }
        }
        Ok(scores)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
