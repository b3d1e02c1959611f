//! Shared configuration, catalogs, and data model for geotrack.

pub mod analysis;
pub mod app_config;
pub mod brands;
pub mod config;
pub mod pricing;
pub mod prompts;
pub mod responses;

use thiserror::Error;

pub use analysis::{
    AnalysisRecord, BrandMention, BrandMismatch, ClassifiedMention, MismatchKind, ResponseAnalysis,
    ResponseType, Sentiment,
};
pub use app_config::{AppConfig, Environment, ProviderSettings};
pub use brands::{
    load_brand_catalog, BrandCatalog, BrandConfig, BrandsFile, OwnedDomains, Relationship,
    TargetConfig,
};
pub use config::{load_app_config, load_app_config_from_env, MAX_CONCURRENCY};
pub use pricing::{compute_costs, ModelUsage, ProviderCost};
pub use prompts::{load_prompts, Prompt, PromptsFile};
pub use responses::{NormalizedCitation, RawCitation, UnifiedResponse, DEFAULT_CONFIDENCE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation error: {0}")]
    Validation(String),
}
