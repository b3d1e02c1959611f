//! OpenAI Responses API adapter with the hosted web-search tool.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use geotrack_core::{RawCitation, UnifiedResponse};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;

use crate::error::ProviderError;
use crate::http::{build_client, elapsed_ms, endpoint, send_json};
use crate::ProviderAdapter;

pub const PROVIDER_NAME: &str = "openai";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/";
/// Separator placed between `output_text` blocks when they are joined.
const BLOCK_SEPARATOR: &str = "\n\n";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentBlock>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Annotation>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Annotation {
    UrlCitation {
        url: String,
        title: Option<String>,
        start_index: Option<usize>,
        end_index: Option<usize>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    model: String,
    url: Url,
}

impl OpenAiAdapter {
    /// Creates an adapter pointed at the production API.
    ///
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
        Ok(Self {
            client: build_client(timeout_secs)?,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            url: endpoint(base_url, "v1/responses")?,
        })
    }

    /// GPT-5 family models take `web_search`; older ones only know the preview tool.
    fn search_tool(&self) -> &'static str {
        if self.model.starts_with("gpt-5") {
            "web_search"
        } else {
            "web_search_preview"
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn query(&self, prompt: &str) -> Result<UnifiedResponse, ProviderError> {
        let payload = json!({
            "model": self.model,
            "tools": [{ "type": self.search_tool() }],
            "input": prompt,
        });

        let start = Instant::now();
        let request = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&payload);
        let raw = send_json(request, "openai responses").await?;
        let latency_ms = elapsed_ms(start);

        let body: ResponsesBody =
            serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Deserialize {
                context: "openai responses".to_owned(),
                source: e,
            })?;

        let (raw_text, raw_citations) = collect_output(body.output);
        let (input_tokens, output_tokens) = body
            .usage
            .map_or((0, 0), |u| (u.input_tokens, u.output_tokens));

        tracing::debug!(
            model = %self.model,
            latency_ms,
            citations = raw_citations.len(),
            "openai query complete"
        );

        Ok(UnifiedResponse {
            provider: PROVIDER_NAME.to_owned(),
            model: self.model.clone(),
            raw_text,
            raw_citations,
            raw_response: raw,
            latency_ms,
            input_tokens,
            output_tokens,
            timestamp: Utc::now(),
        })
    }
}

/// Join every `output_text` block and lift its `url_citation` annotations,
/// rebasing their char offsets onto the joined text.
fn collect_output(output: Vec<OutputItem>) -> (String, Vec<RawCitation>) {
    let mut text = String::new();
    let mut text_chars = 0usize;
    let mut citations = Vec::new();

    for item in output {
        let OutputItem::Message { content } = item else {
            continue;
        };
        for block in content {
            let ContentBlock::OutputText {
                text: block_text,
                annotations,
            } = block
            else {
                continue;
            };

            if !text.is_empty() {
                text.push_str(BLOCK_SEPARATOR);
                text_chars += BLOCK_SEPARATOR.chars().count();
            }
            let base = text_chars;

            for annotation in annotations {
                let Annotation::UrlCitation {
                    url,
                    title,
                    start_index,
                    end_index,
                } = annotation
                else {
                    continue;
                };
                let cited = match (start_index, end_index) {
                    (Some(s), Some(e)) => slice_chars(&block_text, s, e),
                    _ => None,
                };
                citations.push(RawCitation {
                    text: cited,
                    start_index: start_index.and_then(|s| s.checked_add(base)),
                    end_index: end_index.and_then(|e| e.checked_add(base)),
                    ..RawCitation::new(url).with_title(title)
                });
            }

            text_chars += block_text.chars().count();
            text.push_str(&block_text);
        }
    }

    (text, citations)
}

/// Characters `start..end` of `text`, or `None` when the range is empty or
/// out of bounds.
fn slice_chars(text: &str, start: usize, end: usize) -> Option<String> {
    if start >= end || end > text.chars().count() {
        return None;
    }
    Some(text.chars().skip(start).take(end - start).collect())
}
