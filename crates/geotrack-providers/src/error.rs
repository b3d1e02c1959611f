use thiserror::Error;

/// Errors returned by a provider adapter or the registry.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network, TLS, or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The vendor answered with a non-2xx status.
    #[error("vendor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The provider was requested but no credential is configured for it.
    #[error("provider '{provider}' requires {var} to be set")]
    MissingApiKey {
        provider: String,
        var: &'static str,
    },

    #[error("no provider registered under '{0}'")]
    UnknownProvider(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}
