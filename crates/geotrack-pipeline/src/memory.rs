//! In-process [`RunStore`] for dry runs and tests.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use geotrack_core::{AnalysisRecord, NormalizedCitation, Prompt, UnifiedResponse};
use geotrack_db::DbError;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::RunStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone)]
pub struct StoredRun {
    pub run_id: Uuid,
    pub prompt_count: usize,
    pub provider_count: usize,
    pub repeats: u32,
    pub status: RunStatus,
}

#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub response_id: Uuid,
    pub run_id: Uuid,
    pub prompt_id: String,
    pub provider: String,
    pub model: String,
    pub raw_text: String,
    pub repeat_num: u32,
}

#[derive(Debug, Default)]
struct Tables {
    runs: Vec<StoredRun>,
    responses: Vec<StoredResponse>,
    citations: Vec<(Uuid, NormalizedCitation)>,
    analyses: Vec<(Uuid, AnalysisRecord)>,
}

/// Keeps every row in memory behind a mutex. Each write takes the lock once,
/// so writes are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    tables: Mutex<Tables>,
}

impl MemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn run(&self, run_id: Uuid) -> Option<StoredRun> {
        self.lock().runs.iter().find(|r| r.run_id == run_id).cloned()
    }

    #[must_use]
    pub fn responses(&self, run_id: Uuid) -> Vec<StoredResponse> {
        self.lock()
            .responses
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn citations(&self, run_id: Uuid) -> Vec<NormalizedCitation> {
        let tables = self.lock();
        let ids = response_ids(&tables, run_id);
        tables
            .citations
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, c)| c.clone())
            .collect()
    }

    #[must_use]
    pub fn analyses(&self, run_id: Uuid) -> Vec<AnalysisRecord> {
        let tables = self.lock();
        let ids = response_ids(&tables, run_id);
        tables
            .analyses
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(_, a)| a.clone())
            .collect()
    }
}

fn response_ids(tables: &Tables, run_id: Uuid) -> HashSet<Uuid> {
    tables
        .responses
        .iter()
        .filter(|r| r.run_id == run_id)
        .map(|r| r.response_id)
        .collect()
}

fn has_response(tables: &Tables, response_id: Uuid) -> bool {
    tables.responses.iter().any(|r| r.response_id == response_id)
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(
        &self,
        prompt_count: usize,
        provider_count: usize,
        repeats: u32,
    ) -> Result<Uuid, StoreError> {
        let run_id = Uuid::new_v4();
        self.lock().runs.push(StoredRun {
            run_id,
            prompt_count,
            provider_count,
            repeats,
            status: RunStatus::Running,
        });
        Ok(run_id)
    }

    async fn store_response(
        &self,
        run_id: Uuid,
        prompt: &Prompt,
        response: &UnifiedResponse,
        repeat_num: u32,
    ) -> Result<Uuid, StoreError> {
        let mut tables = self.lock();
        if !tables.runs.iter().any(|r| r.run_id == run_id) {
            return Err(StoreError::UnknownRun(run_id));
        }
        let response_id = Uuid::new_v4();
        tables.responses.push(StoredResponse {
            response_id,
            run_id,
            prompt_id: prompt.id.clone(),
            provider: response.provider.clone(),
            model: response.model.clone(),
            raw_text: response.raw_text.clone(),
            repeat_num,
        });
        Ok(response_id)
    }

    async fn store_citations(
        &self,
        response_id: Uuid,
        citations: &[NormalizedCitation],
    ) -> Result<usize, StoreError> {
        let mut tables = self.lock();
        if !has_response(&tables, response_id) {
            return Err(StoreError::UnknownResponse(response_id));
        }
        tables
            .citations
            .extend(citations.iter().map(|c| (response_id, c.clone())));
        Ok(citations.len())
    }

    async fn store_analysis(
        &self,
        response_id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<i64, StoreError> {
        let mut tables = self.lock();
        if !has_response(&tables, response_id) {
            return Err(StoreError::UnknownResponse(response_id));
        }
        if tables.analyses.iter().any(|(id, _)| *id == response_id) {
            return Err(StoreError::DuplicateAnalysis(response_id));
        }
        tables.analyses.push((response_id, record.clone()));
        Ok(i64::try_from(tables.analyses.len()).unwrap_or(i64::MAX))
    }

    async fn finish_run(&self, run_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.lock();
        match tables
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id && r.status == RunStatus::Running)
        {
            Some(run) => {
                run.status = RunStatus::Completed;
                Ok(())
            }
            None => Err(StoreError::Db(DbError::InvalidRunTransition {
                run_id,
                expected_status: "running",
            })),
        }
    }
}
