//! Rule-based entity extraction.
//!
//! Independent extractors run over the lowercased utterance:
//!
//! - numbers (`1`, `2.5`, or a Chinese numeral directly before a unit) →
//!   `quantity` when exactly one is found, otherwise `quantities`
//! - item lexicon → `item_name` (first by position) and `items`
//! - action lexicon → `action` and `actions`
//! - platform lexicon → `platform` and `platforms`
//! - unit lexicon → `unit`, only directly after a number; first lexicon
//!   hit wins
//! - time-period lexicon → `time_period`
//!
//! Numbers are scanned with time periods masked out, so `最近一个月` yields
//! no quantity.  Units are scanned with item names masked as well, so
//! `面包` does not yield the unit `包`.

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use homestock_kernel::{ActionEntity, ActionKind, Entities, EntityKind};

use crate::error::{IntentError, Result};
use crate::lexicon::{self, ACTIONS, ITEMS, PLATFORMS, TIME_PERIODS, UNITS};

/// Confidence when at least one entity was extracted.
pub const RULE_CONFIDENCE: f64 = 0.7;

/// Confidence of the empty fallback result.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Output of [`EntityExtractor::extract`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityResult {
    pub entities: Entities,
    pub confidence: f64,
    /// Entity kinds present, in declaration order.
    pub fields: Vec<EntityKind>,
}

impl EntityResult {
    fn fallback() -> Self {
        Self {
            entities: Entities::default(),
            confidence: FALLBACK_CONFIDENCE,
            fields: Vec::new(),
        }
    }
}

/// Lexicon-driven entity extractor.
pub struct EntityExtractor {
    items: AhoCorasick,
    actions: AhoCorasick,
    platforms: AhoCorasick,
    time_periods: AhoCorasick,
    number: Regex,
    chinese_quantity: Regex,
    counted_unit: Regex,
}

impl EntityExtractor {
    pub fn new() -> Result<Self> {
        let verbs: Vec<&str> = ACTIONS.iter().map(|(verb, _)| *verb).collect();
        let units = UNITS
            .iter()
            .map(|u| regex::escape(u))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            items: lexicon::matcher("items", ITEMS)?,
            actions: lexicon::matcher("actions", &verbs)?,
            platforms: lexicon::matcher("platforms", PLATFORMS)?,
            time_periods: lexicon::matcher("time periods", TIME_PERIODS)?,
            number: compile(r"\d+(?:\.\d+)?")?,
            chinese_quantity: compile(&format!(r"([一二两三四五六七八九十]+)\s*(?:{units})"))?,
            counted_unit: compile(&format!(
                r"(?:\d+(?:\.\d+)?|[一二两三四五六七八九十]+)\s*({units})"
            ))?,
        })
    }

    /// Extract entities.  Never fails; internal errors yield the empty
    /// fallback result.
    pub fn extract(&self, utterance: &str) -> EntityResult {
        match self.try_extract(utterance) {
            Ok(entities) if entities.is_empty() => EntityResult::fallback(),
            Ok(entities) => {
                let fields = entities.present_kinds();
                debug!(fields = ?fields, "entities extracted");
                EntityResult {
                    entities,
                    confidence: RULE_CONFIDENCE,
                    fields,
                }
            }
            Err(err) => {
                warn!(%err, "entity extraction failed, returning empty result");
                EntityResult::fallback()
            }
        }
    }

    fn try_extract(&self, utterance: &str) -> Result<Entities> {
        let text = utterance.trim().to_lowercase();
        let mut entities = Entities::default();
        if text.is_empty() {
            return Ok(entities);
        }

        let untimed = lexicon::mask(&self.time_periods, &text)?;
        let numbers = self.quantities(&untimed);
        match numbers.as_slice() {
            [] => {}
            [single] => entities.quantity = Some(*single),
            _ => entities.quantities = numbers,
        }

        let items = lexicon_hits(&self.items, ITEMS, &text)?;
        entities.item_name = items.first().cloned();
        if items.len() > 1 {
            entities.items = items;
        }

        let mut actions: Vec<ActionEntity> = Vec::new();
        for mat in self.actions.try_find_iter(text.as_str())? {
            let (verb, kind) = ACTIONS[mat.pattern().as_usize()];
            if !actions.iter().any(|a| a.verb == verb) {
                actions.push(ActionEntity {
                    kind,
                    verb: verb.to_string(),
                });
            }
        }
        entities.action = actions.first().cloned();
        if actions.len() > 1 {
            entities.actions = actions;
        }

        let platforms = lexicon_hits(&self.platforms, PLATFORMS, &text)?;
        entities.platform = platforms.first().cloned();
        if platforms.len() > 1 {
            entities.platforms = platforms;
        }

        let scan = lexicon::mask(&self.items, &untimed)?;
        entities.unit = self
            .counted_unit
            .captures_iter(&scan)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| UNITS.iter().position(|u| *u == m.as_str()))
            .min()
            .map(|idx| UNITS[idx].to_string());

        entities.time_period = lexicon_hits(&self.time_periods, TIME_PERIODS, &text)?
            .into_iter()
            .next();

        Ok(entities)
    }

    /// Numeric tokens in order of appearance.
    fn quantities(&self, text: &str) -> Vec<f64> {
        let mut found: Vec<(usize, f64)> = self
            .number
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<f64>().ok().map(|n| (m.start(), n)))
            .collect();

        for caps in self.chinese_quantity.captures_iter(text) {
            if let Some(m) = caps.get(1)
                && let Some(n) = parse_chinese_number(m.as_str())
            {
                found.push((m.start(), n));
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        found.into_iter().map(|(_, n)| n).collect()
    }
}

/// Whether an action kind was mentioned anywhere in `entities`.
pub fn mentions_action(entities: &Entities, kind: ActionKind) -> bool {
    entities.action_kind() == Some(kind) || entities.actions.iter().any(|a| a.kind == kind)
}

// -- helpers ----------------------------------------------------------------

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| IntentError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Distinct lexicon entries matched in `text`, by position.
fn lexicon_hits(ac: &AhoCorasick, table: &[&str], text: &str) -> Result<Vec<String>> {
    let mut hits: Vec<String> = Vec::new();
    for mat in ac.try_find_iter(text)? {
        let entry = table[mat.pattern().as_usize()];
        if !hits.iter().any(|h| h == entry) {
            hits.push(entry.to_string());
        }
    }
    Ok(hits)
}

/// `三` → 3, `十二` → 12, `二十` → 20, `两` → 2.
fn parse_chinese_number(s: &str) -> Option<f64> {
    let chars: Vec<char> = s.chars().collect();
    match chars.iter().position(|c| *c == '十') {
        None if chars.len() == 1 => lexicon::chinese_numeral(chars[0]),
        None => None,
        Some(idx) => {
            let tens = match &chars[..idx] {
                [] => 1.0,
                [c] => lexicon::chinese_numeral(*c)?,
                _ => return None,
            };
            let ones = match &chars[idx + 1..] {
                [] => 0.0,
                [c] => lexicon::chinese_numeral(*c)?,
                _ => return None,
            };
            Some(tens * 10.0 + ones)
        }
    }
}
