//! Intent engine error types.
//!
//! The classifier, extractor and router never let these escape to the
//! conversation manager: each stage resolves them to a low-confidence
//! fallback.  They surface only from constructors and internal helpers.

use homestock_store::StoreError;

/// Unified error type for the intent engine.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Matcher construction ------------------------------------------------
    /// A keyword automaton could not be built.
    #[error("failed to build keyword matcher `{name}`: {reason}")]
    Automaton { name: &'static str, reason: String },

    /// A built-in pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // -- Matching --------------------------------------------------------------
    /// The matcher rejected a search (unsupported match kind, oversized input).
    #[error("keyword search failed: {0}")]
    Search(#[from] aho_corasick::MatchError),

    // -- Upstream crate errors -----------------------------------------------
    /// Routing context could not be read or written.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the intent crate.
pub type Result<T> = std::result::Result<T, IntentError>;
