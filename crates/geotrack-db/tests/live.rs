//! Live integration tests for geotrack-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness; `DATABASE_URL` must point at a server the harness can
//! create databases on, so the tests are ignored by default. Run them with
//! `cargo test -p geotrack-db -- --ignored`.

use chrono::Utc;
use geotrack_core::{
    AnalysisRecord, BrandMention, BrandMismatch, ClassifiedMention, MismatchKind,
    NormalizedCitation, Prompt, ResponseType, Sentiment, UnifiedResponse,
};
use geotrack_db::{
    create_run, db_stats, engine_overview, export_rows, finish_run, get_run, insert_analysis,
    insert_citations, insert_response, latest_run, list_response_citations, list_run_analyses,
    list_run_responses, list_runs, top_cited_domains, top_competitors, usage_by_model,
    weakest_prompts, DbError,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prompt(id: &str) -> Prompt {
    Prompt {
        id: id.to_string(),
        text: format!("Prompt text for {id}"),
        category: "category".to_string(),
        persona: "young professional".to_string(),
        product: None,
        intent: "discovery".to_string(),
    }
}

fn response(provider: &str, model: &str) -> UnifiedResponse {
    UnifiedResponse {
        provider: provider.to_string(),
        model: model.to_string(),
        raw_text: "Thums Up and Pepsi are both popular.".to_string(),
        raw_citations: vec![],
        raw_response: serde_json::json!({ "id": "resp_1" }),
        latency_ms: 1200,
        input_tokens: 100,
        output_tokens: 400,
        timestamp: Utc::now(),
    }
}

fn citation(url: &str, domain: &str, owned: bool) -> NormalizedCitation {
    NormalizedCitation {
        url: url.to_string(),
        domain: domain.to_string(),
        title: Some("Title".to_string()),
        cited_text: None,
        char_offset: Some(4),
        confidence: 1.0,
        is_owned_domain: owned,
    }
}

fn mention(brand: &str, position: u32, is_target_brand: bool) -> ClassifiedMention {
    ClassifiedMention {
        mention: BrandMention {
            brand: brand.to_string(),
            position,
            sentiment: Sentiment::Positive,
            is_recommended: position == 1,
            context: format!("{brand} is mentioned."),
        },
        is_target_brand,
    }
}

fn record(target_found: bool) -> AnalysisRecord {
    AnalysisRecord {
        target_brands_found: if target_found {
            vec!["thums_up".to_string()]
        } else {
            vec![]
        },
        competitor_brands_found: vec!["pepsi".to_string()],
        response_type: ResponseType::Comparison,
        is_primary_recommendation: target_found,
        target_domains_cited: vec![],
        mentions: vec![mention("Thums Up", 1, true), mention("Pepsi", 2, false)],
        mismatches: vec![],
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn run_lifecycle_running_to_completed(pool: sqlx::PgPool) {
    let run_id = create_run(&pool, 6, 3, 1).await.expect("create_run failed");

    let run = get_run(&pool, run_id).await.expect("get_run failed");
    assert_eq!(run.status, "running");
    assert!(run.finished_at.is_none());
    assert_eq!(run.prompt_count, 6);

    finish_run(&pool, run_id).await.expect("finish_run failed");

    let run = get_run(&pool, run_id).await.expect("get_run failed");
    assert_eq!(run.status, "completed");
    assert!(run.finished_at.is_some(), "finished_at should be set");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn finishing_a_run_twice_is_rejected(pool: sqlx::PgPool) {
    let run_id = create_run(&pool, 1, 1, 1).await.expect("create failed");
    finish_run(&pool, run_id).await.expect("first finish failed");

    let err = finish_run(&pool, run_id)
        .await
        .expect_err("second finish should fail");
    assert!(matches!(
        err,
        DbError::InvalidRunTransition {
            expected_status: "running",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn get_run_unknown_id_is_not_found(pool: sqlx::PgPool) {
    let err = get_run(&pool, Uuid::new_v4())
        .await
        .expect_err("unknown run should fail");
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn latest_run_is_none_on_empty_database(pool: sqlx::PgPool) {
    assert!(latest_run(&pool).await.expect("latest_run failed").is_none());

    let first = create_run(&pool, 1, 1, 1).await.expect("create failed");
    let second = create_run(&pool, 1, 1, 1).await.expect("create failed");

    let runs = list_runs(&pool, 10).await.expect("list_runs failed");
    assert_eq!(runs.len(), 2);
    let ids: Vec<Uuid> = runs.iter().map(|r| r.run_id).collect();
    assert!(ids.contains(&first) && ids.contains(&second));
    assert!(latest_run(&pool).await.expect("latest_run failed").is_some());
}

// ---------------------------------------------------------------------------
// Responses, citations, analyses
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn response_with_citations_and_analysis_round_trips(pool: sqlx::PgPool) {
    let run_id = create_run(&pool, 1, 1, 1).await.expect("create failed");
    let response_id = insert_response(&pool, run_id, &prompt("cmp-001"), &response("openai", "gpt-5"), 1)
        .await
        .expect("insert_response failed");

    let inserted = insert_citations(
        &pool,
        response_id,
        &[
            citation("https://www.thumsup.com/", "thumsup.com", true),
            citation("https://example.org/a", "example.org", false),
        ],
    )
    .await
    .expect("insert_citations failed");
    assert_eq!(inserted, 2);

    let mut rec = record(true);
    rec.mismatches.push(BrandMismatch {
        kind: MismatchKind::ReportedTargetNotInCatalog,
        brand: "Coca-Cola Mystery".to_string(),
    });
    insert_analysis(&pool, response_id, &rec)
        .await
        .expect("insert_analysis failed");

    let responses = list_run_responses(&pool, run_id).await.expect("list failed");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].prompt_id, "cmp-001");
    assert_eq!(responses[0].repeat_num, 1);
    assert_eq!(responses[0].raw_response["id"], "resp_1");

    let citations = list_response_citations(&pool, response_id)
        .await
        .expect("list citations failed");
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].domain, "thumsup.com");
    assert_eq!(citations[0].char_offset, Some(4));

    let analyses = list_run_analyses(&pool, run_id).await.expect("list analyses failed");
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].response_type, "comparison");
    assert_eq!(analyses[0].target_brands_found, serde_json::json!(["thums_up"]));
    assert_eq!(
        analyses[0].brand_mismatches[0]["kind"],
        "reported_target_not_in_catalog"
    );

    let stats = db_stats(&pool).await.expect("db_stats failed");
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.citations, 2);
    assert_eq!(stats.brand_mentions, 2);
    assert_eq!(stats.responses_by_provider, vec![("openai".to_string(), 1)]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn second_analysis_for_a_response_rolls_back_its_mentions(pool: sqlx::PgPool) {
    let run_id = create_run(&pool, 1, 1, 1).await.expect("create failed");
    let response_id = insert_response(&pool, run_id, &prompt("p"), &response("gemini", "g"), 1)
        .await
        .expect("insert_response failed");

    insert_analysis(&pool, response_id, &record(true))
        .await
        .expect("first analysis failed");
    insert_analysis(&pool, response_id, &record(true))
        .await
        .expect_err("duplicate analysis should violate the unique constraint");

    let stats = db_stats(&pool).await.expect("db_stats failed");
    assert_eq!(stats.analyses, 1);
    assert_eq!(stats.brand_mentions, 2, "mentions of the failed insert must roll back");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn response_for_unknown_run_is_rejected(pool: sqlx::PgPool) {
    let err = insert_response(&pool, Uuid::new_v4(), &prompt("p"), &response("openai", "m"), 1)
        .await
        .expect_err("foreign key should reject unknown run");
    assert!(matches!(err, DbError::Sqlx(_)));
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn aggregates_are_scoped_to_the_requested_run(pool: sqlx::PgPool) {
    let run_a = create_run(&pool, 2, 1, 1).await.expect("create failed");
    let run_b = create_run(&pool, 1, 1, 1).await.expect("create failed");

    let visible = insert_response(&pool, run_a, &prompt("cat-001"), &response("openai", "gpt-5"), 1)
        .await
        .expect("insert failed");
    insert_citations(
        &pool,
        visible,
        &[citation("https://coca-colaindia.com/x", "coca-colaindia.com", true)],
    )
    .await
    .expect("citations failed");
    insert_analysis(&pool, visible, &record(true)).await.expect("analysis failed");

    let hidden = insert_response(&pool, run_a, &prompt("cat-002"), &response("openai", "gpt-5"), 1)
        .await
        .expect("insert failed");
    insert_analysis(&pool, hidden, &record(false)).await.expect("analysis failed");

    insert_response(&pool, run_b, &prompt("cat-001"), &response("perplexity", "sonar"), 1)
        .await
        .expect("insert failed");

    let overview = engine_overview(&pool, Some(run_a)).await.expect("overview failed");
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].provider, "openai");
    assert_eq!(overview[0].total_responses, 2);
    assert_eq!(overview[0].visibility_score, 50.0);
    assert_eq!(overview[0].share_of_voice, 50.0);
    assert_eq!(overview[0].citation_rate, 50.0);
    assert_eq!(overview[0].owned_citation_rate, 100.0);
    assert_eq!(overview[0].avg_target_position, Some(1.0));
    assert_eq!(overview[0].sentiment.get("positive"), Some(&2));

    let all = engine_overview(&pool, None).await.expect("overview failed");
    assert_eq!(all.len(), 2);

    let competitors = top_competitors(&pool, Some(run_a), 10).await.expect("competitors failed");
    assert_eq!(competitors.len(), 1);
    assert_eq!(competitors[0].brand, "Pepsi");
    assert_eq!(competitors[0].mention_count, 2);
    assert_eq!(competitors[0].sentiment_mode, "positive");

    let domains = top_cited_domains(&pool, Some(run_a), 10).await.expect("domains failed");
    assert_eq!(domains.len(), 1);
    assert!(domains[0].is_owned_domain);

    let weakest = weakest_prompts(&pool, Some(run_a), 5).await.expect("weakest failed");
    assert_eq!(weakest[0].prompt_id, "cat-002");
    assert_eq!(weakest[0].visibility(), 0.0);

    let usage = usage_by_model(&pool, Some(run_b)).await.expect("usage failed");
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].provider, "perplexity");
    assert_eq!(usage[0].queries, 1);
    assert_eq!(usage[0].output_tokens, 400);
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn export_joins_analysis_and_counts_citations(pool: sqlx::PgPool) {
    let run_a = create_run(&pool, 2, 1, 1).await.expect("create failed");
    let run_b = create_run(&pool, 1, 1, 1).await.expect("create failed");

    let analysed = insert_response(&pool, run_a, &prompt("cat-001"), &response("openai", "gpt-4o"), 1)
        .await
        .expect("insert failed");
    insert_citations(
        &pool,
        analysed,
        &[
            citation("https://thumsup.com/a", "thumsup.com", true),
            citation("https://news.example.com/b", "news.example.com", false),
        ],
    )
    .await
    .expect("citations failed");
    insert_analysis(&pool, analysed, &record(true)).await.expect("analysis failed");

    insert_response(&pool, run_a, &prompt("cat-002"), &response("openai", "gpt-4o"), 1)
        .await
        .expect("insert failed");
    insert_response(&pool, run_b, &prompt("cat-001"), &response("gemini", "gemini-2.5-flash"), 1)
        .await
        .expect("insert failed");

    let rows = export_rows(&pool, Some(run_a)).await.expect("export failed");
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].prompt_id, "cat-001");
    assert_eq!(rows[0].citation_count, 2);
    assert_eq!(rows[0].owned_citation_count, 1);
    assert_eq!(rows[0].response_type.as_deref(), Some("comparison"));
    assert_eq!(rows[0].is_primary_recommendation, Some(true));
    assert_eq!(
        rows[0].target_brands_found,
        Some(serde_json::json!(["thums_up"]))
    );

    assert_eq!(rows[1].prompt_id, "cat-002");
    assert_eq!(rows[1].citation_count, 0);
    assert!(rows[1].response_type.is_none());
    assert!(rows[1].target_brands_found.is_none());

    let all = export_rows(&pool, None).await.expect("export failed");
    assert_eq!(all.len(), 3);
}
