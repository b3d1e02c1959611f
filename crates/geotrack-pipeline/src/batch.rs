//! Batch orchestration: prompts x providers x repeats, one task each.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use geotrack_core::{AppConfig, BrandCatalog, Prompt, ProviderSettings, MAX_CONCURRENCY};
use geotrack_extract::{cited_domains, normalize_citations, reconcile, BrandExtractor};
use geotrack_providers::{ProviderAdapter, ProviderRegistry};
use rand::Rng;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::{AdapterError, PipelineError};
use crate::store::RunStore;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Per-call batch parameters. Nothing here is read from env or disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub repeats: u32,
    /// In-flight queries allowed per provider.
    pub concurrency: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub analyze: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            repeats: 1,
            concurrency: DEFAULT_CONCURRENCY,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            analyze: true,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            repeats: 1,
            concurrency: config.concurrency,
            jitter_min_ms: config.jitter_min_ms,
            jitter_max_ms: config.jitter_max_ms,
            analyze: true,
        }
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.repeats == 0 {
            return Err(PipelineError::InvalidBatch(
                "repeats must be at least 1".to_owned(),
            ));
        }
        if self.concurrency == 0 {
            return Err(PipelineError::InvalidBatch(
                "concurrency must be at least 1".to_owned(),
            ));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(PipelineError::InvalidBatch(format!(
                "concurrency {} exceeds the maximum of {MAX_CONCURRENCY}",
                self.concurrency
            )));
        }
        if self.jitter_max_ms < self.jitter_min_ms {
            return Err(PipelineError::InvalidBatch(format!(
                "jitter range {}..={} ms is empty",
                self.jitter_min_ms, self.jitter_max_ms
            )));
        }
        Ok(())
    }
}

/// Outcome counts for a finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub providers: Vec<String>,
    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Succeeded tasks whose extraction failed; no analysis was stored.
    pub extraction_warnings: usize,
    pub brand_mismatches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Succeeded { analysis_skipped: bool, mismatches: usize },
    Failed,
}

/// One active provider: a shared adapter and its own limiter.
struct Lane {
    name: String,
    adapter: Arc<dyn ProviderAdapter>,
    limiter: Semaphore,
}

struct Task<'a> {
    prompt: &'a Prompt,
    lane: &'a Lane,
    repeat: u32,
}

pub struct Pipeline {
    store: Arc<dyn RunStore>,
    registry: ProviderRegistry,
    settings: HashMap<String, ProviderSettings>,
    catalog: Arc<BrandCatalog>,
    extractor: Option<Arc<dyn BrandExtractor>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn RunStore>,
        registry: ProviderRegistry,
        catalog: Arc<BrandCatalog>,
    ) -> Self {
        Self {
            store,
            registry,
            settings: HashMap::new(),
            catalog,
            extractor: None,
        }
    }

    /// Settings handed to the provider's factory. Providers without settings
    /// get [`ProviderSettings::default`].
    #[must_use]
    pub fn with_provider_settings(mut self, name: &str, settings: ProviderSettings) -> Self {
        self.settings.insert(name.to_owned(), settings);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn BrandExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build adapters for the requested providers. Unregistered names are
    /// dropped with a warning; duplicates collapse to one lane.
    fn resolve_lanes<S: AsRef<str>>(
        &self,
        providers: &[S],
        concurrency: usize,
    ) -> Result<Vec<Lane>, PipelineError> {
        let mut lanes: Vec<Lane> = Vec::new();

        for name in providers.iter().map(AsRef::as_ref) {
            if lanes.iter().any(|l| l.name == name) {
                continue;
            }
            if !self.registry.contains(name) {
                tracing::warn!(provider = name, "unknown provider, dropping from batch");
                continue;
            }
            let settings = self.settings.get(name).cloned().unwrap_or_default();
            let adapter = self.registry.build(name, &settings).map_err(|source| {
                PipelineError::ProviderConfig {
                    provider: name.to_owned(),
                    source,
                }
            })?;
            lanes.push(Lane {
                name: name.to_owned(),
                adapter,
                limiter: Semaphore::new(concurrency),
            });
        }

        if lanes.is_empty() {
            return Err(PipelineError::NoActiveProviders {
                requested: providers.iter().map(|p| p.as_ref().to_owned()).collect(),
            });
        }
        Ok(lanes)
    }

    /// Run every prompt against every active provider `config.repeats` times.
    ///
    /// The run row is created before any task starts and marked completed
    /// once all tasks have finished, whatever their outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoActiveProviders`] when no requested name is
    /// registered, [`PipelineError::ProviderConfig`] when a factory rejects its
    /// settings, [`PipelineError::InvalidBatch`] for unusable parameters, and
    /// [`PipelineError::Store`] if the run row cannot be created or finished.
    pub async fn run_batch<S: AsRef<str>>(
        &self,
        prompts: &[Prompt],
        providers: &[S],
        config: &BatchConfig,
    ) -> Result<BatchSummary, PipelineError> {
        config.validate()?;
        if config.analyze && self.extractor.is_none() {
            return Err(PipelineError::InvalidBatch(
                "analysis requested but no extractor is configured".to_owned(),
            ));
        }
        let lanes = self.resolve_lanes(providers, config.concurrency)?;

        let run_id = self
            .store
            .create_run(prompts.len(), lanes.len(), config.repeats)
            .await?;

        let tasks: Vec<Task<'_>> = prompts
            .iter()
            .flat_map(|prompt| {
                lanes.iter().flat_map(move |lane| {
                    (1..=config.repeats).map(move |repeat| Task {
                        prompt,
                        lane,
                        repeat,
                    })
                })
            })
            .collect();
        let total_tasks = tasks.len();

        tracing::info!(
            run_id = %run_id,
            prompts = prompts.len(),
            providers = lanes.len(),
            repeats = config.repeats,
            total_tasks,
            concurrency = config.concurrency,
            "batch started"
        );

        // Every task is polled at once; the per-provider limiters do the throttling.
        let outcomes: Vec<TaskOutcome> = stream::iter(tasks)
            .map(|task| self.run_task(run_id, task, config))
            .buffer_unordered(total_tasks.max(1))
            .collect()
            .await;

        let mut summary = BatchSummary {
            run_id,
            providers: lanes.iter().map(|l| l.name.clone()).collect(),
            total_tasks,
            succeeded: 0,
            failed: 0,
            extraction_warnings: 0,
            brand_mismatches: 0,
        };
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Succeeded {
                    analysis_skipped,
                    mismatches,
                } => {
                    summary.succeeded += 1;
                    summary.extraction_warnings += usize::from(analysis_skipped);
                    summary.brand_mismatches += mismatches;
                }
                TaskOutcome::Failed => summary.failed += 1,
            }
        }

        if let Err(e) = self.store.finish_run(run_id).await {
            tracing::error!(run_id = %run_id, error = %e, "failed to mark run completed");
            return Err(e.into());
        }

        if summary.failed > 0 {
            tracing::warn!(
                run_id = %run_id,
                failed = summary.failed,
                total_tasks,
                "some tasks failed"
            );
        }
        tracing::info!(
            run_id = %run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            extraction_warnings = summary.extraction_warnings,
            brand_mismatches = summary.brand_mismatches,
            "batch completed"
        );

        Ok(summary)
    }

    async fn run_task(&self, run_id: Uuid, task: Task<'_>, config: &BatchConfig) -> TaskOutcome {
        let Task {
            prompt,
            lane,
            repeat,
        } = task;
        let provider = lane.name.as_str();
        let prompt_id = prompt.id.as_str();

        let queried = {
            let Ok(_permit) = lane.limiter.acquire().await else {
                tracing::error!(provider, prompt_id, repeat, "provider limiter closed");
                return TaskOutcome::Failed;
            };
            let delay = jitter(config.jitter_min_ms, config.jitter_max_ms);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            lane.adapter.query(&prompt.text).await
        };

        let response = match queried {
            Ok(response) => response,
            Err(source) => {
                let err = AdapterError {
                    provider: provider.to_owned(),
                    prompt_id: prompt_id.to_owned(),
                    source,
                };
                tracing::error!(run_id = %run_id, provider, prompt_id, repeat, error = %err, "task failed");
                return TaskOutcome::Failed;
            }
        };

        let response_id = match self
            .store
            .store_response(run_id, prompt, &response, repeat)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(run_id = %run_id, provider, prompt_id, repeat, error = %e, "failed to store response");
                return TaskOutcome::Failed;
            }
        };

        let citations = normalize_citations(&response, self.catalog.owned_domains());
        if !citations.is_empty() {
            if let Err(e) = self.store.store_citations(response_id, &citations).await {
                tracing::error!(run_id = %run_id, provider, prompt_id, repeat, error = %e, "failed to store citations");
                return TaskOutcome::Failed;
            }
        }

        let extractor = match &self.extractor {
            Some(extractor) if config.analyze && !response.raw_text.trim().is_empty() => extractor,
            _ => {
                return TaskOutcome::Succeeded {
                    analysis_skipped: false,
                    mismatches: 0,
                }
            }
        };

        let domains = cited_domains(&citations);

        let analysis = match extractor.analyze(&response.raw_text, &domains).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(run_id = %run_id, provider, prompt_id, repeat, error = %e, "extraction failed, analysis skipped");
                return TaskOutcome::Succeeded {
                    analysis_skipped: true,
                    mismatches: 0,
                };
            }
        };

        let record = reconcile(&analysis, &self.catalog, &domains);
        for mismatch in &record.mismatches {
            tracing::warn!(
                run_id = %run_id,
                provider,
                prompt_id,
                brand = %mismatch.brand,
                kind = ?mismatch.kind,
                "brand classification mismatch"
            );
        }

        if let Err(e) = self.store.store_analysis(response_id, &record).await {
            tracing::error!(run_id = %run_id, provider, prompt_id, repeat, error = %e, "failed to store analysis");
            return TaskOutcome::Failed;
        }

        TaskOutcome::Succeeded {
            analysis_skipped: false,
            mismatches: record.mismatches.len(),
        }
    }
}

/// Uniform delay in `min..=max` milliseconds.
fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}
