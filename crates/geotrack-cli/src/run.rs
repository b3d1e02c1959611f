//! `run` and `query` command handlers.

use std::sync::Arc;

use futures::future::join_all;
use geotrack_core::{load_brand_catalog, load_prompts, AppConfig, BrandCatalog};
use geotrack_extract::{
    cited_domains, normalize_citations, reconcile, BrandExtractor, OpenAiExtractor,
};
use geotrack_pipeline::{BatchConfig, PgRunStore, Pipeline};
use geotrack_providers::ProviderRegistry;

#[derive(Debug)]
pub(crate) struct RunArgs {
    pub category: Option<String>,
    pub providers: Vec<String>,
    pub repeats: u32,
    pub concurrency: Option<usize>,
    pub analyze: bool,
}

/// Registered providers that have an API key in `config`.
fn configured_providers(registry: &ProviderRegistry, config: &AppConfig) -> Vec<String> {
    registry
        .names()
        .into_iter()
        .filter(|name| {
            config
                .provider_settings(name)
                .is_some_and(|s| s.api_key.is_some())
        })
        .map(str::to_owned)
        .collect()
}

fn build_extractor(
    config: &AppConfig,
    catalog: &BrandCatalog,
) -> anyhow::Result<Arc<dyn BrandExtractor>> {
    let api_key = config.openai.api_key.as_deref().ok_or_else(|| {
        anyhow::anyhow!("brand extraction needs OPENAI_API_KEY; pass --no-analyze to skip it")
    })?;
    let extractor = OpenAiExtractor::new(
        api_key,
        &config.extraction_model,
        config.extraction_max_retries,
        catalog,
    )
    .map_err(|e| anyhow::anyhow!("failed to build brand extractor: {e}"))?;
    Ok(Arc::new(extractor))
}

/// Run the prompt catalog and persist every response.
///
/// # Errors
///
/// Returns an error if the catalogs cannot be loaded, no provider can be
/// built, or the run row cannot be created or finished. Individual task
/// failures are reported in the summary, not returned.
pub(crate) async fn run_batch(
    pool: sqlx::PgPool,
    config: &AppConfig,
    args: RunArgs,
) -> anyhow::Result<()> {
    let catalog = Arc::new(load_brand_catalog(&config.brands_path)?);
    let prompts = load_prompts(&config.prompts_path, args.category.as_deref())?;
    if prompts.is_empty() {
        println!(
            "no prompts found{}",
            args.category
                .as_deref()
                .map(|c| format!(" in category '{c}'"))
                .unwrap_or_default()
        );
        return Ok(());
    }

    let registry = ProviderRegistry::with_defaults();
    let providers = if args.providers.is_empty() {
        configured_providers(&registry, config)
    } else {
        args.providers
    };
    if providers.is_empty() {
        anyhow::bail!(
            "no provider has an API key configured; set one of OPENAI_API_KEY, \
             GEMINI_API_KEY, PERPLEXITY_API_KEY"
        );
    }

    let names: Vec<String> = registry.names().into_iter().map(str::to_owned).collect();
    let mut pipeline = Pipeline::new(
        Arc::new(PgRunStore::new(pool)),
        registry,
        Arc::clone(&catalog),
    );
    for name in &names {
        if let Some(settings) = config.provider_settings(name) {
            pipeline = pipeline.with_provider_settings(name, settings.clone());
        }
    }
    if args.analyze {
        pipeline = pipeline.with_extractor(build_extractor(config, &catalog)?);
    }

    let batch = BatchConfig {
        repeats: args.repeats,
        concurrency: args.concurrency.unwrap_or(config.concurrency),
        analyze: args.analyze,
        ..BatchConfig::from_app_config(config)
    };

    let summary = pipeline.run_batch(&prompts, &providers, &batch).await?;

    println!(
        "run {}: {} tasks, {} succeeded, {} failed",
        summary.run_id, summary.total_tasks, summary.succeeded, summary.failed
    );
    println!("providers: {}", summary.providers.join(", "));
    if summary.extraction_warnings > 0 {
        println!(
            "{} responses stored without analysis (extraction failed)",
            summary.extraction_warnings
        );
    }
    if summary.brand_mismatches > 0 {
        println!(
            "{} brand classification mismatches flagged",
            summary.brand_mismatches
        );
    }
    println!("next: geotrack report --run-id {}", summary.run_id);

    Ok(())
}

/// Send one prompt to one or all providers and print the answers.
///
/// # Errors
///
/// Returns an error if the brand catalog cannot be loaded, a named provider
/// is unknown or misconfigured, or analysis is requested without an OpenAI
/// key.
pub(crate) async fn run_query(
    config: &AppConfig,
    prompt: &str,
    provider: &str,
    analyze: bool,
) -> anyhow::Result<()> {
    let catalog = load_brand_catalog(&config.brands_path)?;
    let registry = ProviderRegistry::with_defaults();
    let query_all = provider == "all";

    let names = if query_all {
        configured_providers(&registry, config)
    } else {
        vec![provider.to_owned()]
    };
    if names.is_empty() {
        anyhow::bail!("no provider has an API key configured");
    }

    let mut adapters = Vec::with_capacity(names.len());
    for name in &names {
        let settings = config.provider_settings(name).cloned().unwrap_or_default();
        match registry.build(name, &settings) {
            Ok(adapter) => adapters.push(adapter),
            Err(e) if query_all => eprintln!("skipping {name}: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    let extractor = if analyze {
        Some(build_extractor(config, &catalog)?)
    } else {
        None
    };

    let results = join_all(adapters.iter().map(|adapter| async move {
        let result = adapter.query(prompt).await;
        (adapter, result)
    }))
    .await;

    for (adapter, result) in results {
        println!("## {} ({})", adapter.name(), adapter.model());
        println!();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                eprintln!("error: {} query failed: {e}", adapter.name());
                println!();
                continue;
            }
        };

        println!(
            "latency: {} ms, tokens: {} in / {} out",
            response.latency_ms, response.input_tokens, response.output_tokens
        );
        println!();
        println!("{}", response.raw_text);

        let citations = normalize_citations(&response, catalog.owned_domains());
        if !citations.is_empty() {
            println!();
            println!("Citations:");
            for (idx, c) in citations.iter().enumerate() {
                let owned = if c.is_owned_domain { " [owned]" } else { "" };
                println!("  [{}] {}{owned} {}", idx + 1, c.domain, c.url);
            }
        }

        if let Some(extractor) = &extractor {
            if response.raw_text.trim().is_empty() {
                continue;
            }
            let domains = cited_domains(&citations);
            match extractor.analyze(&response.raw_text, &domains).await {
                Ok(analysis) => {
                    let record = reconcile(&analysis, &catalog, &domains);
                    println!();
                    println!("Analysis:");
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                Err(e) => eprintln!("warning: analysis failed for {}: {e}", adapter.name()),
            }
        }
        println!();
    }

    Ok(())
}
