//! Vendor citation shapes to [`NormalizedCitation`].
//!
//! Vendors disagree about what a confidence of 1.0 means, so each one has
//! its own strategy. Unknown vendors fall through to [`CitationStrategy::Passthrough`].

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use geotrack_core::{NormalizedCitation, OwnedDomains, RawCitation, UnifiedResponse};
use regex::Regex;
use reqwest::Url;

/// Gemini reports 1.0 for chunks no grounding support scored.
const GEMINI_UNSCORED_CONFIDENCE: f64 = 0.9;
/// Host fragment of Gemini's grounding redirect URLs.
const GEMINI_REDIRECT_HOST: &str = "vertexaisearch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationStrategy {
    /// Annotation offsets and cited text kept; no vendor score, so 1.0.
    OpenAi,
    /// Real grounding scores kept; the 1.0 placeholder is discounted.
    Gemini,
    /// Bare URL list; no cited text, offset of the first `[n]` marker.
    Perplexity,
    /// Everything the adapter supplied, as is.
    Passthrough,
}

impl CitationStrategy {
    #[must_use]
    pub fn for_provider(provider: &str) -> Self {
        match provider {
            "openai" => Self::OpenAi,
            "gemini" => Self::Gemini,
            "perplexity" => Self::Perplexity,
            _ => Self::Passthrough,
        }
    }
}

/// Normalize a response's citations, deduplicating by URL (first occurrence
/// wins) and flagging owned domains.
#[must_use]
pub fn normalize_citations(
    response: &UnifiedResponse,
    owned: &OwnedDomains,
) -> Vec<NormalizedCitation> {
    let strategy = CitationStrategy::for_provider(&response.provider);
    let markers = if strategy == CitationStrategy::Perplexity {
        first_marker_offsets(&response.raw_text)
    } else {
        HashMap::new()
    };

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(response.raw_citations.len());

    for (idx, raw) in response.raw_citations.iter().enumerate() {
        if !seen.insert(raw.url.as_str()) {
            continue;
        }
        let mut citation = match strategy {
            CitationStrategy::OpenAi => NormalizedCitation {
                confidence: 1.0,
                ..base(raw)
            },
            CitationStrategy::Gemini => gemini(raw),
            CitationStrategy::Perplexity => NormalizedCitation {
                cited_text: None,
                char_offset: markers.get(&(idx + 1)).copied(),
                confidence: 1.0,
                ..base(raw)
            },
            CitationStrategy::Passthrough => base(raw),
        };
        citation.confidence = citation.confidence.clamp(0.0, 1.0);
        citation.is_owned_domain = owned.is_owned(&citation.domain);
        out.push(citation);
    }

    out
}

/// Distinct citation domains in first-seen order.
#[must_use]
pub fn cited_domains(citations: &[NormalizedCitation]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(citations.len());
    for c in citations {
        if !out.contains(&c.domain) {
            out.push(c.domain.clone());
        }
    }
    out
}

fn base(raw: &RawCitation) -> NormalizedCitation {
    NormalizedCitation {
        url: raw.url.clone(),
        domain: extract_domain(&raw.url),
        title: raw.title.clone(),
        cited_text: raw.text.clone(),
        char_offset: raw.start_index,
        confidence: raw.confidence,
        is_owned_domain: false,
    }
}

#[allow(clippy::float_cmp)]
fn gemini(raw: &RawCitation) -> NormalizedCitation {
    let mut citation = base(raw);
    if raw.url.contains(GEMINI_REDIRECT_HOST) {
        // The redirect hides the source; Gemini puts the source host in the title.
        if let Some(title) = raw.title.as_deref().filter(|t| !t.trim().is_empty()) {
            citation.domain = extract_domain(title);
        }
    }
    if raw.confidence == 1.0 {
        citation.confidence = GEMINI_UNSCORED_CONFIDENCE;
    }
    citation
}

/// Char offset of the first `[n]` marker for each `n` in `text`.
fn first_marker_offsets(text: &str) -> HashMap<usize, usize> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = MARKER.get_or_init(|| Regex::new(r"\[(\d+)\]").ok()) else {
        return HashMap::new();
    };

    let mut offsets = HashMap::new();
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(n) = num.as_str().parse::<usize>() else {
            continue;
        };
        offsets
            .entry(n)
            .or_insert_with(|| text[..whole.start()].chars().count());
    }
    offsets
}

/// Host of `url`, lowercased, without a leading `www.`.
///
/// Scheme, port, path, query and fragment are dropped. Input that does not
/// parse as an absolute URL is treated as `host[/path]`; if nothing usable
/// remains, the trimmed input itself is returned. Applying this to its own
/// output is a no-op.
#[must_use]
pub fn extract_domain(url: &str) -> String {
    let trimmed = url.trim();

    let host = Url::parse(trimmed)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| {
            let rest = trimmed.split_once("://").map_or(trimmed, |(_, rest)| rest);
            rest.split(['/', '?', '#'])
                .next()
                .unwrap_or_default()
                .to_owned()
        });

    let domain = if host.is_empty() {
        trimmed.to_lowercase()
    } else {
        host.to_lowercase()
    };

    let mut stripped = domain.as_str();
    while let Some(rest) = stripped.strip_prefix("www.") {
        stripped = rest;
    }
    stripped.to_owned()
}
