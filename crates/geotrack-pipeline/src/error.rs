use geotrack_db::DbError;
use geotrack_providers::ProviderError;
use thiserror::Error;

/// A provider query that failed for one task. The task counts as failed and
/// no response row is written.
#[derive(Debug, Error)]
#[error("{provider} query for prompt '{prompt_id}' failed: {source}")]
pub struct AdapterError {
    pub provider: String,
    pub prompt_id: String,
    #[source]
    pub source: ProviderError,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("run {0} is unknown to the store")]
    UnknownRun(uuid::Uuid),

    #[error("response {0} is unknown to the store")]
    UnknownResponse(uuid::Uuid),

    #[error("response {0} already has an analysis")]
    DuplicateAnalysis(uuid::Uuid),

    #[error("store rejected write: {0}")]
    Rejected(String),
}

/// Errors that abort a batch before (or after) its tasks run. Task-level
/// failures never surface here; they are counted in the batch summary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no registered provider among requested: [{}]", .requested.join(", "))]
    NoActiveProviders { requested: Vec<String> },

    #[error("provider '{provider}' is misconfigured: {source}")]
    ProviderConfig {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("invalid batch configuration: {0}")]
    InvalidBatch(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
