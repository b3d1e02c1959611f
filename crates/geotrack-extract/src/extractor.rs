//! Structured brand extraction over an OpenAI chat-completions call.

use std::fmt::Write as _;

use async_trait::async_trait;
use geotrack_core::{BrandCatalog, BrandConfig, ResponseAnalysis};
use geotrack_providers::{http, ProviderError};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ExtractionError;
use crate::retry::retry_with_backoff;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const MAX_ERROR_BODY_CHARS: usize = 500;

fn setup_error(err: ProviderError) -> ExtractionError {
    match err {
        ProviderError::Http(e) => ExtractionError::Http(e),
        ProviderError::InvalidBaseUrl(msg) => ExtractionError::InvalidBaseUrl(msg),
        other => ExtractionError::InvalidBaseUrl(other.to_string()),
    }
}

/// Turns a provider's answer text into a [`ResponseAnalysis`].
#[async_trait]
pub trait BrandExtractor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ExtractionError`] once the extractor's retries are exhausted.
    async fn analyze(
        &self,
        text: &str,
        citation_domains: &[String],
    ) -> Result<ResponseAnalysis, ExtractionError>;
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    refusal: Option<String>,
}

pub struct OpenAiExtractor {
    client: Client,
    api_key: String,
    model: String,
    url: Url,
    instructions: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl OpenAiExtractor {
    /// # Errors
    ///
    /// Returns [`ExtractionError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_key: &str,
        model: &str,
        max_retries: u32,
        catalog: &BrandCatalog,
    ) -> Result<Self, ExtractionError> {
        Self::with_base_url(api_key, model, max_retries, catalog, DEFAULT_BASE_URL)
    }

    /// Creates an extractor with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Http`] if the HTTP client cannot be built,
    /// or [`ExtractionError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        max_retries: u32,
        catalog: &BrandCatalog,
        base_url: &str,
    ) -> Result<Self, ExtractionError> {
        let client = http::build_client(DEFAULT_TIMEOUT_SECS).map_err(setup_error)?;
        let url = http::endpoint(base_url, "v1/chat/completions").map_err(setup_error)?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            url,
            instructions: build_instructions(catalog),
            max_retries,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        })
    }

    /// Override the first retry delay; tests use 0.
    #[must_use]
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    async fn attempt(&self, payload: &Value) -> Result<ResponseAnalysis, ExtractionError> {
        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let envelope: ChatBody =
            serde_json::from_str(&body).map_err(|e| ExtractionError::Deserialize {
                context: "extraction chat/completions".to_owned(),
                source: e,
            })?;
        let message = envelope
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ExtractionError::InvalidOutput("no choices returned".to_owned()))?;

        if let Some(refusal) = message.refusal.filter(|r| !r.is_empty()) {
            return Err(ExtractionError::Refused(refusal));
        }
        let content = message
            .content
            .ok_or_else(|| ExtractionError::InvalidOutput("empty message content".to_owned()))?;

        parse_analysis(&content)
    }
}

#[async_trait]
impl BrandExtractor for OpenAiExtractor {
    async fn analyze(
        &self,
        text: &str,
        citation_domains: &[String],
    ) -> Result<ResponseAnalysis, ExtractionError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.instructions },
                { "role": "user", "content": user_message(text, citation_domains) },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "response_analysis",
                    "strict": true,
                    "schema": analysis_schema(),
                }
            },
        });

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.attempt(&payload)
        })
        .await
    }
}

/// Decode and sanity-check the model's JSON.
fn parse_analysis(content: &str) -> Result<ResponseAnalysis, ExtractionError> {
    let analysis: ResponseAnalysis = serde_json::from_str(content)
        .map_err(|e| ExtractionError::InvalidOutput(e.to_string()))?;

    if let Some(bad) = analysis.all_mentions.iter().find(|m| m.position == 0) {
        return Err(ExtractionError::InvalidOutput(format!(
            "mention '{}' has position 0; positions are 1-based",
            bad.brand
        )));
    }
    Ok(analysis)
}

fn user_message(text: &str, citation_domains: &[String]) -> String {
    let domains = if citation_domains.is_empty() {
        "none".to_owned()
    } else {
        citation_domains.join(", ")
    };
    format!("Response to analyze:\n---\n{text}\n---\n\nCitations found: {domains}")
}

fn push_brand_lines<'a>(out: &mut String, brands: impl Iterator<Item = &'a BrandConfig>) {
    for brand in brands {
        let _ = write!(out, "- {}: {}", brand.key, brand.name);
        if !brand.aliases.is_empty() {
            let _ = write!(out, " (also: {})", brand.aliases.join(", "));
        }
        out.push('\n');
    }
}

/// System instructions derived from the brand catalog, so the extractor and
/// the stored target-brand labels share one alias table.
#[must_use]
pub fn build_instructions(catalog: &BrandCatalog) -> String {
    let target = catalog.target();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "You analyze LLM-generated answers about {}.",
        target.market
    );
    out.push_str(
        "Extract ALL brand mentions. For each brand give its position (order of \
         first mention, 1 = first), sentiment (positive, neutral, negative or \
         mixed), whether the answer recommends or favors it, and one sentence \
         of context.\n\n",
    );
    let _ = writeln!(out, "{} portfolio brands (canonical key: name):", target.name);
    push_brand_lines(&mut out, catalog.portfolio());
    out.push_str("\nKnown competitor brands (canonical key: name):\n");
    push_brand_lines(&mut out, catalog.competitors());
    let _ = write!(
        out,
        "\nReport target_brands_found and competitor_brands_found using the \
         canonical keys above. A competitor not listed above is reported by its \
         lowercase name. target_domains_cited lists cited domains owned by {}. \
         target_is_primary_recommendation is true only when a {} brand is the \
         top recommendation or the most favorably positioned brand. \
         response_type is one of: list (ranked items), comparison (A vs B), \
         direct_answer (single recommendation), narrative (story or history), \
         refusal (declines to answer).",
        target.name, target.name
    );
    out
}

/// Strict JSON schema for [`ResponseAnalysis`].
#[must_use]
pub fn analysis_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "target_brands_found",
            "competitor_brands_found",
            "all_mentions",
            "target_domains_cited",
            "response_type",
            "target_is_primary_recommendation"
        ],
        "properties": {
            "target_brands_found": { "type": "array", "items": { "type": "string" } },
            "competitor_brands_found": { "type": "array", "items": { "type": "string" } },
            "all_mentions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["brand", "position", "sentiment", "is_recommended", "context"],
                    "properties": {
                        "brand": { "type": "string" },
                        "position": { "type": "integer" },
                        "sentiment": {
                            "type": "string",
                            "enum": ["positive", "neutral", "negative", "mixed"]
                        },
                        "is_recommended": { "type": "boolean" },
                        "context": { "type": "string" }
                    }
                }
            },
            "target_domains_cited": { "type": "array", "items": { "type": "string" } },
            "response_type": {
                "type": "string",
                "enum": ["list", "comparison", "direct_answer", "narrative", "refusal"]
            },
            "target_is_primary_recommendation": { "type": "boolean" }
        }
    })
}
