//! Web-search LLM vendor adapters.
//!
//! Every adapter turns one prompt into a [`UnifiedResponse`]. Adapters are
//! immutable after construction and are shared across concurrent tasks
//! behind `Arc`.

use async_trait::async_trait;
use geotrack_core::UnifiedResponse;

pub mod error;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod perplexity;
pub mod registry;

pub use error::ProviderError;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use perplexity::PerplexityAdapter;
pub use registry::{AdapterFactory, ProviderRegistry};

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name, stored as `responses.provider`.
    fn name(&self) -> &str;

    /// Vendor model id, stored as `responses.model`.
    fn model(&self) -> &str;

    /// Send `prompt` with web search enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on network failure, a non-2xx status, or an
    /// undecodable body.
    async fn query(&self, prompt: &str) -> Result<UnifiedResponse, ProviderError>;
}
