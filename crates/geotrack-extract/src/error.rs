use thiserror::Error;

/// Errors returned by a brand extractor.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Network, TLS, or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The extraction endpoint answered with a non-2xx status.
    #[error("extraction endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response envelope could not be decoded.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The model's output did not satisfy the analysis schema.
    #[error("extractor output violates the analysis schema: {0}")]
    InvalidOutput(String),

    /// The model declined to produce an analysis.
    #[error("extractor refused: {0}")]
    Refused(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}
