//! Structured brand-extraction output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

impl Sentiment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Ranked items.
    List,
    /// A versus B.
    Comparison,
    /// A single recommendation.
    DirectAnswer,
    /// Story or history.
    Narrative,
    Refusal,
}

impl ResponseType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::List => "list",
            ResponseType::Comparison => "comparison",
            ResponseType::DirectAnswer => "direct_answer",
            ResponseType::Narrative => "narrative",
            ResponseType::Refusal => "refusal",
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single brand mention, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandMention {
    /// Brand name as written in the response.
    pub brand: String,
    /// 1-based order of first mention.
    pub position: u32,
    pub sentiment: Sentiment,
    pub is_recommended: bool,
    /// One sentence describing how the brand is discussed.
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseAnalysis {
    /// Canonical keys of target portfolio brands found.
    pub target_brands_found: Vec<String>,
    pub competitor_brands_found: Vec<String>,
    pub all_mentions: Vec<BrandMention>,
    pub target_domains_cited: Vec<String>,
    pub response_type: ResponseType,
    pub target_is_primary_recommendation: bool,
}

/// A mention labelled against the brand catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedMention {
    #[serde(flatten)]
    pub mention: BrandMention,
    pub is_target_brand: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// The catalog says a mention is a target brand, but the extractor did not
    /// list it in `target_brands_found`.
    TargetMentionNotReported,
    /// The extractor listed a target brand the catalog does not know as one.
    ReportedTargetNotInCatalog,
}

/// Disagreement between the extractor's own brand lists and the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandMismatch {
    pub kind: MismatchKind,
    pub brand: String,
}

/// What gets persisted for one analysed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub target_brands_found: Vec<String>,
    pub competitor_brands_found: Vec<String>,
    pub response_type: ResponseType,
    pub is_primary_recommendation: bool,
    pub target_domains_cited: Vec<String>,
    pub mentions: Vec<ClassifiedMention>,
    pub mismatches: Vec<BrandMismatch>,
}
