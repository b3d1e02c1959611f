use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Credentials and model selection for one upstream vendor.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub model: String,
    /// Overrides the adapter's vendor default when set.
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub brands_path: PathBuf,
    pub prompts_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub concurrency: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub openai: ProviderSettings,
    pub gemini: ProviderSettings,
    pub perplexity: ProviderSettings,
    pub extraction_model: String,
    pub extraction_max_retries: u32,
}

impl AppConfig {
    /// Settings for a vendor by registry name, or `None` for unknown names.
    #[must_use]
    pub fn provider_settings(&self, name: &str) -> Option<&ProviderSettings> {
        match name {
            "openai" => Some(&self.openai),
            "gemini" => Some(&self.gemini),
            "perplexity" => Some(&self.perplexity),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("brands_path", &self.brands_path)
            .field("prompts_path", &self.prompts_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("jitter_min_ms", &self.jitter_min_ms)
            .field("jitter_max_ms", &self.jitter_max_ms)
            .field("openai", &self.openai)
            .field("gemini", &self.gemini)
            .field("perplexity", &self.perplexity)
            .field("extraction_model", &self.extraction_model)
            .field("extraction_max_retries", &self.extraction_max_retries)
            .finish()
    }
}
