//! Persistence seam for the orchestrator.
//!
//! Each method is one logical write and must be atomic on its own. The
//! orchestrator only ever writes citations and analyses for a response id the
//! same store already returned.

use async_trait::async_trait;
use geotrack_core::{AnalysisRecord, NormalizedCitation, Prompt, UnifiedResponse};
use geotrack_db::DbError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Record a new run in `running` status.
    async fn create_run(
        &self,
        prompt_count: usize,
        provider_count: usize,
        repeats: u32,
    ) -> Result<Uuid, StoreError>;

    async fn store_response(
        &self,
        run_id: Uuid,
        prompt: &Prompt,
        response: &UnifiedResponse,
        repeat_num: u32,
    ) -> Result<Uuid, StoreError>;

    /// All-or-nothing. Returns the number of rows written.
    async fn store_citations(
        &self,
        response_id: Uuid,
        citations: &[NormalizedCitation],
    ) -> Result<usize, StoreError>;

    /// Analysis and its brand mentions, all-or-nothing.
    async fn store_analysis(
        &self,
        response_id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<i64, StoreError>;

    /// Mark the run `completed`.
    async fn finish_run(&self, run_id: Uuid) -> Result<(), StoreError>;
}

/// [`RunStore`] backed by the Postgres schema in `geotrack-db`.
#[derive(Debug, Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn count_column(column: &'static str, value: usize) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| {
        StoreError::Db(DbError::OutOfRange {
            column,
            value: value as u64,
        })
    })
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(
        &self,
        prompt_count: usize,
        provider_count: usize,
        repeats: u32,
    ) -> Result<Uuid, StoreError> {
        let repeats = count_column("repeats", repeats as usize)?;
        Ok(geotrack_db::create_run(
            &self.pool,
            count_column("prompt_count", prompt_count)?,
            count_column("provider_count", provider_count)?,
            repeats,
        )
        .await?)
    }

    async fn store_response(
        &self,
        run_id: Uuid,
        prompt: &Prompt,
        response: &UnifiedResponse,
        repeat_num: u32,
    ) -> Result<Uuid, StoreError> {
        Ok(geotrack_db::insert_response(&self.pool, run_id, prompt, response, repeat_num).await?)
    }

    async fn store_citations(
        &self,
        response_id: Uuid,
        citations: &[NormalizedCitation],
    ) -> Result<usize, StoreError> {
        Ok(geotrack_db::insert_citations(&self.pool, response_id, citations).await?)
    }

    async fn store_analysis(
        &self,
        response_id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<i64, StoreError> {
        Ok(geotrack_db::insert_analysis(&self.pool, response_id, record).await?)
    }

    async fn finish_run(&self, run_id: Uuid) -> Result<(), StoreError> {
        Ok(geotrack_db::finish_run(&self.pool, run_id).await?)
    }
}
