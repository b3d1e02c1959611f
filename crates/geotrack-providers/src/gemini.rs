//! Gemini `generateContent` adapter with Google Search grounding.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use geotrack_core::{RawCitation, UnifiedResponse, DEFAULT_CONFIDENCE};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;
use crate::http::{build_client, elapsed_ms, endpoint, send_json};
use crate::ProviderAdapter;

pub const PROVIDER_NAME: &str = "gemini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
    #[serde(default)]
    grounding_supports: Vec<GroundingSupport>,
}

#[derive(Debug, Default, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingSupport {
    segment: Option<Segment>,
    #[serde(default)]
    grounding_chunk_indices: Vec<usize>,
    #[serde(default)]
    confidence_scores: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Segment {
    start_index: Option<usize>,
    end_index: Option<usize>,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    model: String,
    url: Url,
}

impl GeminiAdapter {
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, model, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates an adapter with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the HTTP client cannot be built, or
    /// [`ProviderError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        let path = format!("v1beta/models/{model}:generateContent");
        Ok(Self {
            client: build_client(timeout_secs)?,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            url: endpoint(base_url, &path)?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn query(&self, prompt: &str) -> Result<UnifiedResponse, ProviderError> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "tools": [{ "google_search": {} }],
        });

        let start = Instant::now();
        let request = self
            .client
            .post(self.url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload);
        let raw = send_json(request, "gemini generateContent").await?;
        let latency_ms = elapsed_ms(start);

        let body: GenerateContentBody =
            serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Deserialize {
                context: "gemini generateContent".to_owned(),
                source: e,
            })?;

        let usage = body.usage_metadata.unwrap_or_default();
        let candidate = body.candidates.into_iter().next().unwrap_or_default();

        let raw_text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        let raw_citations = candidate
            .grounding_metadata
            .map(grounding_citations)
            .unwrap_or_default();

        tracing::debug!(
            model = %self.model,
            latency_ms,
            citations = raw_citations.len(),
            "gemini query complete"
        );

        Ok(UnifiedResponse {
            provider: PROVIDER_NAME.to_owned(),
            model: self.model.clone(),
            raw_text,
            raw_citations,
            raw_response: raw,
            latency_ms,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            timestamp: Utc::now(),
        })
    }
}

/// One citation per web grounding chunk, in chunk order, enriched from the
/// grounding supports.
///
/// A chunk keeps [`DEFAULT_CONFIDENCE`] until a support scores it; the first
/// score replaces the placeholder and later scores only raise it. The first
/// supporting segment with text supplies the cited text and offsets.
fn grounding_citations(metadata: GroundingMetadata) -> Vec<RawCitation> {
    let mut slots: Vec<Option<(RawCitation, bool)>> = metadata
        .grounding_chunks
        .into_iter()
        .map(|chunk| {
            chunk.web.map(|web| {
                let citation = RawCitation::new(web.uri.unwrap_or_default()).with_title(web.title);
                (citation, false)
            })
        })
        .collect();

    for support in metadata.grounding_supports {
        let segment = support.segment.unwrap_or_default();
        for (idx, score) in support
            .grounding_chunk_indices
            .iter()
            .zip(support.confidence_scores.iter())
        {
            let Some(Some((citation, scored))) = slots.get_mut(*idx) else {
                continue;
            };
            if !*scored || *score > citation.confidence {
                citation.confidence = *score;
                *scored = true;
            }
            if citation.text.is_none() {
                if let Some(text) = segment.text.as_ref().filter(|t| !t.is_empty()) {
                    citation.text = Some(text.clone());
                    citation.start_index = segment.start_index;
                    citation.end_index = segment.end_index;
                }
            }
        }
    }

    slots.into_iter().flatten().map(|(c, _)| c).collect()
}
