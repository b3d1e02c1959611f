//! Request plumbing shared by the vendor adapters and the brand extractor.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};

use crate::error::ProviderError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "geotrack/0.1 (brand-visibility-tracking)";
/// Longest slice of an error body kept in [`ProviderError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Client with `timeout_secs` request timeout and the shared connect timeout
/// and user agent.
///
/// # Errors
///
/// Returns [`ProviderError::Http`] if the TLS backend cannot be initialised.
pub fn build_client(timeout_secs: u64) -> Result<Client, ProviderError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Resolve `path` against `base`, treating `base` as a directory whether or
/// not it ends in a slash.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidBaseUrl`] if either part does not parse.
pub fn endpoint(base: &str, path: &str) -> Result<Url, ProviderError> {
    let normalised = format!("{}/", base.trim_end_matches('/'));
    let base_url = Url::parse(&normalised)
        .map_err(|e| ProviderError::InvalidBaseUrl(format!("'{base}': {e}")))?;
    base_url
        .join(path)
        .map_err(|e| ProviderError::InvalidBaseUrl(format!("'{base}' + '{path}': {e}")))
}

/// Send the request, require a 2xx status, and parse the body as JSON.
pub(crate) async fn send_json(
    request: RequestBuilder,
    context: &str,
) -> Result<serde_json::Value, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::Deserialize {
        context: context.to_owned(),
        source: e,
    })
}

/// Milliseconds elapsed since `start`, saturating.
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
