//! Provider response contract shared by adapters, the normalizer, and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence recorded when a vendor supplies no score of its own.
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// A vendor-native citation before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCitation {
    pub url: String,
    pub title: Option<String>,
    pub text: Option<String>,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    /// [`DEFAULT_CONFIDENCE`] unless the vendor reported a score.
    pub confidence: f64,
}

impl RawCitation {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            text: None,
            start_index: None,
            end_index: None,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }
}

/// One provider answer in a vendor-independent shape. Never mutated after
/// the adapter returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    pub provider: String,
    pub model: String,
    pub raw_text: String,
    pub raw_citations: Vec<RawCitation>,
    /// Untouched vendor payload, kept for audit.
    pub raw_response: serde_json::Value,
    pub latency_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

/// Canonical citation record produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCitation {
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub cited_text: Option<String>,
    pub char_offset: Option<usize>,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub is_owned_domain: bool,
}
