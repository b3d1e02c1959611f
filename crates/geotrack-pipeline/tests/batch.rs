//! Orchestrator behaviour against scripted adapters and the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use geotrack_core::{
    AnalysisRecord, BrandCatalog, BrandConfig, BrandMention, BrandsFile, NormalizedCitation,
    Prompt, RawCitation, Relationship, ResponseAnalysis, ResponseType, Sentiment, TargetConfig,
    UnifiedResponse,
};
use geotrack_extract::{BrandExtractor, ExtractionError};
use geotrack_pipeline::{
    BatchConfig, MemoryRunStore, Pipeline, PipelineError, RunStatus, RunStore, StoreError,
};
use geotrack_providers::{ProviderAdapter, ProviderError, ProviderRegistry};
use tokio::time::Instant;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn catalog() -> Arc<BrandCatalog> {
    let brand = |key: &str, name: &str, relationship| BrandConfig {
        key: key.to_owned(),
        name: name.to_owned(),
        relationship,
        aliases: vec![],
    };
    Arc::new(
        BrandCatalog::from_file(BrandsFile {
            target: TargetConfig {
                name: "Coca-Cola India".to_owned(),
                market: "soft drinks in India".to_owned(),
            },
            owned_domains: vec!["thumsup.com".to_owned()],
            brands: vec![
                brand("thums_up", "Thums Up", Relationship::Portfolio),
                brand("pepsi", "Pepsi", Relationship::Competitor),
            ],
        })
        .expect("catalog should validate"),
    )
}

fn prompt(id: &str) -> Prompt {
    Prompt {
        id: id.to_owned(),
        text: format!("question {id}"),
        category: "cola".to_owned(),
        persona: "student".to_owned(),
        product: None,
        intent: "recommendation".to_owned(),
    }
}

fn no_jitter(analyze: bool) -> BatchConfig {
    BatchConfig {
        analyze,
        ..BatchConfig::default()
    }
}

/// Adapter that answers from a script and records how many calls overlap.
struct ScriptedAdapter {
    name: String,
    fail: bool,
    text: String,
    citations: Vec<RawCitation>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    /// Start and end instant of every query.
    spans: Mutex<Vec<(Instant, Instant)>>,
}

impl ScriptedAdapter {
    fn ok(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            fail: false,
            text: "Thums Up is the pick.".to_owned(),
            citations: vec![RawCitation::new("https://www.thumsup.com/story")],
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            spans: Mutex::new(Vec::new()),
        }
    }

    fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::ok(name)
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn query(&self, _prompt: &str) -> Result<UnifiedResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().unwrap().push((started, Instant::now()));

        if self.fail {
            return Err(ProviderError::Status {
                status: 500,
                body: "upstream exploded".to_owned(),
            });
        }
        Ok(UnifiedResponse {
            provider: self.name.clone(),
            model: "scripted-1".to_owned(),
            raw_text: self.text.clone(),
            raw_citations: self.citations.clone(),
            raw_response: serde_json::json!({ "scripted": true }),
            latency_ms: 5,
            input_tokens: 10,
            output_tokens: 20,
            timestamp: Utc::now(),
        })
    }
}

fn registry_with(adapters: &[Arc<ScriptedAdapter>]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for adapter in adapters {
        let shared = Arc::clone(adapter);
        registry.register(&adapter.name, move |_settings| {
            Ok(Arc::clone(&shared) as Arc<dyn ProviderAdapter>)
        });
    }
    registry
}

struct FailingExtractor;

#[async_trait]
impl BrandExtractor for FailingExtractor {
    async fn analyze(
        &self,
        _text: &str,
        _citation_domains: &[String],
    ) -> Result<ResponseAnalysis, ExtractionError> {
        Err(ExtractionError::InvalidOutput("not json".to_owned()))
    }
}

/// Reports a target brand the catalog does not know and omits one it does.
struct CannedExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl BrandExtractor for CannedExtractor {
    async fn analyze(
        &self,
        _text: &str,
        _citation_domains: &[String],
    ) -> Result<ResponseAnalysis, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResponseAnalysis {
            target_brands_found: vec!["kinley".to_owned()],
            competitor_brands_found: vec!["Pepsi".to_owned()],
            all_mentions: vec![BrandMention {
                brand: "Thums Up".to_owned(),
                position: 1,
                sentiment: Sentiment::Positive,
                is_recommended: true,
                context: "Top pick.".to_owned(),
            }],
            target_domains_cited: vec![],
            response_type: ResponseType::DirectAnswer,
            target_is_primary_recommendation: true,
        })
    }
}

/// Delegates to a [`MemoryRunStore`] but refuses every citation write.
struct CitationRejectingStore {
    inner: Arc<MemoryRunStore>,
}

#[async_trait]
impl RunStore for CitationRejectingStore {
    async fn create_run(
        &self,
        prompt_count: usize,
        provider_count: usize,
        repeats: u32,
    ) -> Result<Uuid, StoreError> {
        self.inner.create_run(prompt_count, provider_count, repeats).await
    }

    async fn store_response(
        &self,
        run_id: Uuid,
        prompt: &Prompt,
        response: &UnifiedResponse,
        repeat_num: u32,
    ) -> Result<Uuid, StoreError> {
        self.inner
            .store_response(run_id, prompt, response, repeat_num)
            .await
    }

    async fn store_citations(
        &self,
        _response_id: Uuid,
        _citations: &[NormalizedCitation],
    ) -> Result<usize, StoreError> {
        Err(StoreError::Rejected("disk full".to_owned()))
    }

    async fn store_analysis(
        &self,
        response_id: Uuid,
        record: &AnalysisRecord,
    ) -> Result<i64, StoreError> {
        self.inner.store_analysis(response_id, record).await
    }

    async fn finish_run(&self, run_id: Uuid) -> Result<(), StoreError> {
        self.inner.finish_run(run_id).await
    }
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_prompts_one_provider_without_extraction() {
    let adapter = Arc::new(ScriptedAdapter::ok("alpha"));
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store.clone(), registry_with(&[adapter]), catalog());

    let summary = pipeline
        .run_batch(&[prompt("p1"), prompt("p2")], &["alpha"], &no_jitter(false))
        .await
        .expect("batch should run");

    assert_eq!(summary.total_tasks, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.responses(summary.run_id).len(), 2);

    let citations = store.citations(summary.run_id);
    assert_eq!(citations.len(), 2);
    assert!(citations
        .iter()
        .all(|c| c.domain == "thumsup.com" && c.is_owned_domain));
    assert!(store.analyses(summary.run_id).is_empty());

    let run = store.run(summary.run_id).expect("run row exists");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!((run.prompt_count, run.provider_count, run.repeats), (2, 1, 1));
}

#[tokio::test]
async fn failing_provider_is_isolated_from_healthy_one() {
    let good = Arc::new(ScriptedAdapter::ok("good"));
    let broken = Arc::new(ScriptedAdapter::failing("broken"));
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(
        store.clone(),
        registry_with(&[good, broken.clone()]),
        catalog(),
    );

    let config = BatchConfig {
        repeats: 2,
        ..no_jitter(false)
    };
    let summary = pipeline
        .run_batch(&[prompt("p1")], &["good", "broken"], &config)
        .await
        .expect("task failures never fail the batch");

    assert_eq!(summary.total_tasks, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.succeeded + summary.failed, summary.total_tasks);
    assert_eq!(broken.calls.load(Ordering::SeqCst), 2);

    let responses = store.responses(summary.run_id);
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| r.provider == "good"));
    let mut repeats: Vec<u32> = responses.iter().map(|r| r.repeat_num).collect();
    repeats.sort_unstable();
    assert_eq!(repeats, vec![1, 2]);

    assert_eq!(
        store.run(summary.run_id).map(|r| r.status),
        Some(RunStatus::Completed)
    );
}

#[tokio::test]
async fn extraction_failure_keeps_response_and_counts_success() {
    let adapter = Arc::new(ScriptedAdapter::ok("alpha"));
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store.clone(), registry_with(&[adapter]), catalog())
        .with_extractor(Arc::new(FailingExtractor));

    let summary = pipeline
        .run_batch(&[prompt("p1")], &["alpha"], &no_jitter(true))
        .await
        .expect("batch should run");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.extraction_warnings, 1);
    assert_eq!(store.responses(summary.run_id).len(), 1);
    assert_eq!(store.citations(summary.run_id).len(), 1);
    assert!(store.analyses(summary.run_id).is_empty());
}

#[tokio::test]
async fn duplicate_vendor_citations_are_stored_once() {
    let adapter = Arc::new(ScriptedAdapter {
        citations: vec![
            RawCitation::new("https://example.org/a").with_title(Some("First".to_owned())),
            RawCitation::new("https://example.org/a").with_title(Some("Second".to_owned())),
        ],
        ..ScriptedAdapter::ok("alpha")
    });
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store.clone(), registry_with(&[adapter]), catalog());

    let summary = pipeline
        .run_batch(&[prompt("p1")], &["alpha"], &no_jitter(false))
        .await
        .unwrap();

    let citations = store.citations(summary.run_id);
    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0].title.as_deref(), Some("First"));
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analysis_is_reconciled_against_catalog_before_storing() {
    let adapter = Arc::new(ScriptedAdapter::ok("alpha"));
    let extractor = Arc::new(CannedExtractor {
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store.clone(), registry_with(&[adapter]), catalog())
        .with_extractor(extractor.clone());

    let summary = pipeline
        .run_batch(&[prompt("p1")], &["alpha"], &no_jitter(true))
        .await
        .unwrap();

    assert_eq!(summary.brand_mismatches, 2);
    let analyses = store.analyses(summary.run_id);
    assert_eq!(analyses.len(), 1);
    let record = &analyses[0];
    assert_eq!(record.target_brands_found, vec!["thums_up"]);
    assert_eq!(record.competitor_brands_found, vec!["pepsi"]);
    assert_eq!(record.target_domains_cited, vec!["thumsup.com"]);
    assert!(record.mentions[0].is_target_brand);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blank_response_text_skips_extraction() {
    let adapter = Arc::new(ScriptedAdapter {
        text: "   ".to_owned(),
        ..ScriptedAdapter::ok("alpha")
    });
    let extractor = Arc::new(CannedExtractor {
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store.clone(), registry_with(&[adapter]), catalog())
        .with_extractor(extractor.clone());

    let summary = pipeline
        .run_batch(&[prompt("p1")], &["alpha"], &no_jitter(true))
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert!(store.analyses(summary.run_id).is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn in_flight_queries_never_exceed_provider_limit() {
    let adapter = Arc::new(ScriptedAdapter {
        delay: Duration::from_millis(20),
        ..ScriptedAdapter::ok("alpha")
    });
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store, registry_with(&[adapter.clone()]), catalog());

    let prompts: Vec<Prompt> = (0..10).map(|i| prompt(&format!("p{i}"))).collect();
    let config = BatchConfig {
        concurrency: 2,
        ..no_jitter(false)
    };
    let summary = pipeline.run_batch(&prompts, &["alpha"], &config).await.unwrap();

    assert_eq!(summary.succeeded, 10);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 10);
    assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn jitter_is_drawn_after_the_slot_is_held() {
    const SLOTS: usize = 2;
    const JITTER_MIN: u64 = 100;

    let adapter = Arc::new(ScriptedAdapter {
        delay: Duration::from_millis(1_000),
        ..ScriptedAdapter::ok("alpha")
    });
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store, registry_with(&[adapter.clone()]), catalog());

    let prompts: Vec<Prompt> = (0..6).map(|i| prompt(&format!("p{i}"))).collect();
    let config = BatchConfig {
        concurrency: SLOTS,
        jitter_min_ms: JITTER_MIN,
        jitter_max_ms: 200,
        analyze: false,
        ..BatchConfig::default()
    };
    let began = Instant::now();
    let summary = pipeline.run_batch(&prompts, &["alpha"], &config).await.unwrap();

    assert_eq!(summary.succeeded, 6);
    assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), SLOTS);

    let spans = adapter.spans.lock().unwrap().clone();
    let mut starts: Vec<Instant> = spans.iter().map(|(s, _)| *s).collect();
    let mut ends: Vec<Instant> = spans.iter().map(|(_, e)| *e).collect();
    starts.sort();
    ends.sort();

    let min = Duration::from_millis(JITTER_MIN);
    // The first SLOTS tasks hold a slot from the start; every later one only
    // after an earlier query has released its slot.
    for (i, start) in starts.iter().enumerate() {
        let slot_acquired = if i < SLOTS { began } else { ends[i - SLOTS] };
        assert!(
            *start >= slot_acquired + min,
            "query {i} started {:?} after its slot was free",
            start.duration_since(slot_acquired)
        );
    }
}

#[tokio::test]
async fn providers_are_throttled_independently() {
    // Both adapters share one counter, so its peak shows cross-provider overlap.
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let make = |name: &str| {
        Arc::new(ScriptedAdapter {
            delay: Duration::from_millis(20),
            in_flight: Arc::clone(&in_flight),
            max_in_flight: Arc::clone(&peak),
            ..ScriptedAdapter::ok(name)
        })
    };
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(
        store,
        registry_with(&[make("alpha"), make("beta")]),
        catalog(),
    );

    let prompts: Vec<Prompt> = (0..4).map(|i| prompt(&format!("p{i}"))).collect();
    let config = BatchConfig {
        concurrency: 1,
        ..no_jitter(false)
    };
    let summary = pipeline
        .run_batch(&prompts, &["alpha", "beta"], &config)
        .await
        .unwrap();

    assert_eq!(summary.total_tasks, 8);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Provider resolution and configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_provider_names_are_dropped() {
    let adapter = Arc::new(ScriptedAdapter::ok("alpha"));
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store.clone(), registry_with(&[adapter]), catalog());

    let summary = pipeline
        .run_batch(
            &[prompt("p1")],
            &["alpha", "no-such-vendor", "alpha"],
            &no_jitter(false),
        )
        .await
        .unwrap();

    assert_eq!(summary.providers, vec!["alpha"]);
    assert_eq!(summary.total_tasks, 1);
    assert_eq!(store.run(summary.run_id).unwrap().provider_count, 1);
}

#[tokio::test]
async fn no_registered_provider_is_a_configuration_error() {
    let pipeline = Pipeline::new(
        Arc::new(MemoryRunStore::new()),
        registry_with(&[]),
        catalog(),
    );

    let err = pipeline
        .run_batch(&[prompt("p1")], &["ghost"], &no_jitter(false))
        .await
        .expect_err("empty active set must fail");

    match err {
        PipelineError::NoActiveProviders { requested } => assert_eq!(requested, vec!["ghost"]),
        other => panic!("expected NoActiveProviders, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_api_key_fails_before_any_task() {
    let store = Arc::new(MemoryRunStore::new());
    let pipeline = Pipeline::new(store, ProviderRegistry::with_defaults(), catalog());

    let err = pipeline
        .run_batch(&[prompt("p1")], &["openai"], &no_jitter(false))
        .await
        .expect_err("openai without a key must fail");

    assert!(matches!(
        err,
        PipelineError::ProviderConfig {
            source: ProviderError::MissingApiKey { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn analysis_without_extractor_is_rejected() {
    let adapter = Arc::new(ScriptedAdapter::ok("alpha"));
    let pipeline = Pipeline::new(
        Arc::new(MemoryRunStore::new()),
        registry_with(&[adapter.clone()]),
        catalog(),
    );

    let err = pipeline
        .run_batch(&[prompt("p1")], &["alpha"], &no_jitter(true))
        .await
        .expect_err("analysis needs an extractor");

    assert!(matches!(err, PipelineError::InvalidBatch(_)));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Storage failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn storage_failure_fails_only_the_enclosing_task() {
    let adapter = Arc::new(ScriptedAdapter {
        citations: vec![],
        ..ScriptedAdapter::ok("quiet")
    });
    let cited = Arc::new(ScriptedAdapter::ok("cited"));
    let inner = Arc::new(MemoryRunStore::new());
    let store = Arc::new(CitationRejectingStore {
        inner: inner.clone(),
    });
    let pipeline = Pipeline::new(store, registry_with(&[adapter, cited]), catalog());

    let summary = pipeline
        .run_batch(&[prompt("p1")], &["quiet", "cited"], &no_jitter(false))
        .await
        .unwrap();

    // The citation-free task never touches the failing write.
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(inner.responses(summary.run_id).len(), 2);
    assert_eq!(
        inner.run(summary.run_id).map(|r| r.status),
        Some(RunStatus::Completed)
    );
}
