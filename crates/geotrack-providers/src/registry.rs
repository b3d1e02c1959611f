//! Provider name to adapter factory lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use geotrack_core::ProviderSettings;

use crate::error::ProviderError;
use crate::gemini::{self, GeminiAdapter};
use crate::openai::{self, OpenAiAdapter};
use crate::perplexity::{self, PerplexityAdapter};
use crate::ProviderAdapter;

/// Builds an adapter from a vendor's settings.
pub type AdapterFactory = Arc<
    dyn Fn(&ProviderSettings) -> Result<Arc<dyn ProviderAdapter>, ProviderError> + Send + Sync,
>;

/// Names mapped to adapter factories. Adding a vendor means registering one
/// more factory; nothing else dispatches on provider names.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `openai`, `gemini` and `perplexity` adapters.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(openai::PROVIDER_NAME, |s: &ProviderSettings| {
            let key = require_key(s, openai::PROVIDER_NAME, "OPENAI_API_KEY")?;
            let timeout = s.timeout_secs.unwrap_or(openai::DEFAULT_TIMEOUT_SECS);
            let adapter = OpenAiAdapter::new(key, &s.model, timeout)?;
            Ok(Arc::new(adapter) as Arc<dyn ProviderAdapter>)
        });
        registry.register(gemini::PROVIDER_NAME, |s: &ProviderSettings| {
            let key = require_key(s, gemini::PROVIDER_NAME, "GEMINI_API_KEY")?;
            let timeout = s.timeout_secs.unwrap_or(gemini::DEFAULT_TIMEOUT_SECS);
            let adapter = GeminiAdapter::new(key, &s.model, timeout)?;
            Ok(Arc::new(adapter) as Arc<dyn ProviderAdapter>)
        });
        registry.register(perplexity::PROVIDER_NAME, |s: &ProviderSettings| {
            let key = require_key(s, perplexity::PROVIDER_NAME, "PERPLEXITY_API_KEY")?;
            let timeout = s.timeout_secs.unwrap_or(perplexity::DEFAULT_TIMEOUT_SECS);
            let adapter = PerplexityAdapter::new(key, &s.model, timeout)?;
            Ok(Arc::new(adapter) as Arc<dyn ProviderAdapter>)
        });
        registry
    }

    /// Register (or replace) the factory for `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderSettings) -> Result<Arc<dyn ProviderAdapter>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.to_owned(), Arc::new(factory));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the adapter registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnknownProvider`] for unregistered names, or
    /// whatever the factory returns (typically
    /// [`ProviderError::MissingApiKey`]).
    pub fn build(
        &self,
        name: &str,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_owned()))?;
        factory(settings)
    }
}

fn require_key<'a>(
    settings: &'a ProviderSettings,
    provider: &str,
    var: &'static str,
) -> Result<&'a str, ProviderError> {
    settings
        .api_key
        .as_deref()
        .ok_or_else(|| ProviderError::MissingApiKey {
            provider: provider.to_owned(),
            var,
        })
}
