//! Batch orchestration for geotrack.
//!
//! [`Pipeline::run_batch`] fans prompts out across providers and repeats,
//! throttles each provider independently, and persists every successful
//! response through a [`RunStore`]. A failed task never aborts its siblings.

pub mod batch;
pub mod error;
pub mod memory;
pub mod store;

pub use batch::{BatchConfig, BatchSummary, Pipeline, DEFAULT_CONCURRENCY};
pub use error::{AdapterError, PipelineError, StoreError};
pub use memory::{MemoryRunStore, RunStatus, StoredResponse, StoredRun};
pub use store::{PgRunStore, RunStore};
