//! Perplexity Sonar chat-completions adapter.

use std::collections::HashMap;
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

pub const PROVIDER_NAME: &str = "perplexity";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai/";

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    choices: Vec<Choice>,
    /// Flat list of source URLs, referenced in the text as `[1]`, `[2]`, ...
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct PerplexityAdapter {
    client: Client,
    api_key: String,
    model: String,
    url: Url,
}

impl PerplexityAdapter {
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
            url: endpoint(base_url, "chat/completions")?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for PerplexityAdapter {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn query(&self, prompt: &str) -> Result<UnifiedResponse, ProviderError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let start = Instant::now();
        let request = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(&payload);
        let raw = send_json(request, "perplexity chat/completions").await?;
        let latency_ms = elapsed_ms(start);

        let body: ChatBody =
            serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Deserialize {
                context: "perplexity chat/completions".to_owned(),
                source: e,
            })?;

        let raw_text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default();

        let titles: HashMap<String, Option<String>> = body
            .search_results
            .into_iter()
            .map(|r| (r.url, r.title))
            .collect();
        let raw_citations = body
            .citations
            .into_iter()
            .map(|url| {
                let title = titles.get(&url).cloned().flatten();
                RawCitation::new(url).with_title(title)
            })
            .collect::<Vec<_>>();

        let (input_tokens, output_tokens) = body
            .usage
            .map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));

        tracing::debug!(
            model = %self.model,
            latency_ms,
            citations = raw_citations.len(),
            "perplexity query complete"
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
