//! Read-side aggregation over stored runs.
//!
//! Every query takes an optional run filter bound as a parameter
//! (`$1::uuid IS NULL OR r.run_id = $1`); `None` aggregates across all runs.
//! SQL returns raw counts and sums; rates are derived here so the rounding
//! rules live in one place.

use std::collections::BTreeMap;

use geotrack_core::ModelUsage;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `part / whole` as a percentage rounded to one decimal place; 0 when
/// `whole` is 0.
#[allow(clippy::cast_precision_loss)]
fn percent(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Database totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbStats {
    pub runs: i64,
    pub responses: i64,
    pub citations: i64,
    pub brand_mentions: i64,
    pub analyses: i64,
    /// Response count per provider, sorted by provider name.
    pub responses_by_provider: Vec<(String, i64)>,
}

#[derive(Debug, sqlx::FromRow)]
struct TotalsRow {
    runs: i64,
    responses: i64,
    citations: i64,
    brand_mentions: i64,
    analyses: i64,
}

/// Row counts for every table plus responses per provider.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either query fails.
pub async fn db_stats(pool: &PgPool) -> Result<DbStats, DbError> {
    let totals = sqlx::query_as::<_, TotalsRow>(
        "SELECT (SELECT COUNT(*) FROM runs) AS runs, \
                (SELECT COUNT(*) FROM responses) AS responses, \
                (SELECT COUNT(*) FROM citations) AS citations, \
                (SELECT COUNT(*) FROM brand_mentions) AS brand_mentions, \
                (SELECT COUNT(*) FROM analyses) AS analyses",
    )
    .fetch_one(pool)
    .await?;

    let responses_by_provider = sqlx::query_as::<_, (String, i64)>(
        "SELECT provider, COUNT(*) \
         FROM responses \
         GROUP BY provider \
         ORDER BY provider",
    )
    .fetch_all(pool)
    .await?;

    Ok(DbStats {
        runs: totals.runs,
        responses: totals.responses,
        citations: totals.citations,
        brand_mentions: totals.brand_mentions,
        analyses: totals.analyses,
        responses_by_provider,
    })
}

// ---------------------------------------------------------------------------
// Engine overview
// ---------------------------------------------------------------------------

/// Raw per-provider counters as returned by SQL.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub(crate) struct EngineCounts {
    pub provider: String,
    pub total_responses: i64,
    pub visible_responses: i64,
    pub recommended_responses: i64,
    pub total_mentions: i64,
    pub target_mentions: i64,
    pub target_position_sum: i64,
    pub responses_with_citations: i64,
    pub total_citations: i64,
    pub owned_citations: i64,
    pub avg_latency_ms: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
}

/// Visibility metrics for one provider. Rates are percentages (0-100, 1 dp).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOverview {
    pub provider: String,
    pub total_responses: i64,
    /// Responses where at least one target brand was found.
    pub visibility_score: f64,
    /// Target-brand mentions over all brand mentions.
    pub share_of_voice: f64,
    /// Responses where the target is the primary recommendation.
    pub recommendation_rate: f64,
    /// Mean position of target-brand mentions; `None` without any.
    pub avg_target_position: Option<f64>,
    /// Sentiment of target-brand mentions.
    pub sentiment: BTreeMap<String, i64>,
    /// Responses carrying at least one citation.
    pub citation_rate: f64,
    /// Citations pointing at an owned domain, over all citations.
    pub owned_citation_rate: f64,
    pub avg_latency_ms: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
}

impl EngineOverview {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn from_counts(counts: EngineCounts, sentiment: BTreeMap<String, i64>) -> Self {
        let avg_target_position = (counts.target_mentions > 0).then(|| {
            round1(counts.target_position_sum as f64 / counts.target_mentions as f64)
        });

        Self {
            visibility_score: percent(counts.visible_responses, counts.total_responses),
            share_of_voice: percent(counts.target_mentions, counts.total_mentions),
            recommendation_rate: percent(counts.recommended_responses, counts.total_responses),
            avg_target_position,
            sentiment,
            citation_rate: percent(counts.responses_with_citations, counts.total_responses),
            owned_citation_rate: percent(counts.owned_citations, counts.total_citations),
            total_responses: counts.total_responses,
            avg_latency_ms: counts.avg_latency_ms,
            total_input_tokens: counts.total_input_tokens,
            total_output_tokens: counts.total_output_tokens,
            provider: counts.provider,
        }
    }
}

/// Per-provider visibility metrics, sorted by provider name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn engine_overview(
    pool: &PgPool,
    run_id: Option<Uuid>,
) -> Result<Vec<EngineOverview>, DbError> {
    let counts = sqlx::query_as::<_, EngineCounts>(
        "SELECT r.provider, \
                COUNT(*) AS total_responses, \
                COUNT(a.analysis_id) FILTER \
                    (WHERE jsonb_array_length(a.target_brands_found) > 0) AS visible_responses, \
                COUNT(a.analysis_id) FILTER \
                    (WHERE a.is_primary_recommendation) AS recommended_responses, \
                COALESCE(SUM(m.total_mentions), 0)::BIGINT AS total_mentions, \
                COALESCE(SUM(m.target_mentions), 0)::BIGINT AS target_mentions, \
                COALESCE(SUM(m.target_position_sum), 0)::BIGINT AS target_position_sum, \
                COUNT(c.response_id) AS responses_with_citations, \
                COALESCE(SUM(c.citation_count), 0)::BIGINT AS total_citations, \
                COALESCE(SUM(c.owned_count), 0)::BIGINT AS owned_citations, \
                COALESCE(AVG(r.latency_ms), 0)::BIGINT AS avg_latency_ms, \
                COALESCE(SUM(r.input_tokens), 0)::BIGINT AS total_input_tokens, \
                COALESCE(SUM(r.output_tokens), 0)::BIGINT AS total_output_tokens \
         FROM responses r \
         LEFT JOIN analyses a ON a.response_id = r.response_id \
         LEFT JOIN ( \
             SELECT response_id, \
                    COUNT(*) AS total_mentions, \
                    COUNT(*) FILTER (WHERE is_target_brand) AS target_mentions, \
                    COALESCE(SUM(position) FILTER (WHERE is_target_brand), 0) \
                        AS target_position_sum \
             FROM brand_mentions \
             GROUP BY response_id \
         ) m ON m.response_id = r.response_id \
         LEFT JOIN ( \
             SELECT response_id, \
                    COUNT(*) AS citation_count, \
                    COUNT(*) FILTER (WHERE is_owned_domain) AS owned_count \
             FROM citations \
             GROUP BY response_id \
         ) c ON c.response_id = r.response_id \
         WHERE ($1::uuid IS NULL OR r.run_id = $1) \
         GROUP BY r.provider \
         ORDER BY r.provider",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    let sentiment_rows = sqlx::query_as::<_, (String, String, i64)>(
        "SELECT r.provider, bm.sentiment, COUNT(*) \
         FROM brand_mentions bm \
         JOIN responses r ON r.response_id = bm.response_id \
         WHERE bm.is_target_brand \
           AND ($1::uuid IS NULL OR r.run_id = $1) \
         GROUP BY r.provider, bm.sentiment",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    let mut sentiment_by_provider: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for (provider, sentiment, count) in sentiment_rows {
        sentiment_by_provider
            .entry(provider)
            .or_default()
            .insert(sentiment, count);
    }

    Ok(counts
        .into_iter()
        .map(|c| {
            let sentiment = sentiment_by_provider.remove(&c.provider).unwrap_or_default();
            EngineOverview::from_counts(c, sentiment)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Competitors, domains, prompts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CompetitorSummary {
    pub brand: String,
    pub mention_count: i64,
    pub avg_position: f64,
    /// Most frequent sentiment across the brand's mentions.
    pub sentiment_mode: String,
    pub recommendation_count: i64,
}

/// Most-mentioned non-target brands.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn top_competitors(
    pool: &PgPool,
    run_id: Option<Uuid>,
    limit: i64,
) -> Result<Vec<CompetitorSummary>, DbError> {
    let rows = sqlx::query_as::<_, CompetitorSummary>(
        "SELECT bm.brand, \
                COUNT(*) AS mention_count, \
                ROUND(AVG(bm.position)::NUMERIC, 1)::DOUBLE PRECISION AS avg_position, \
                MODE() WITHIN GROUP (ORDER BY bm.sentiment) AS sentiment_mode, \
                COUNT(*) FILTER (WHERE bm.is_recommended) AS recommendation_count \
         FROM brand_mentions bm \
         JOIN responses r ON r.response_id = bm.response_id \
         WHERE NOT bm.is_target_brand \
           AND ($1::uuid IS NULL OR r.run_id = $1) \
         GROUP BY bm.brand \
         ORDER BY mention_count DESC, bm.brand \
         LIMIT $2",
    )
    .bind(run_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DomainCount {
    pub domain: String,
    pub citation_count: i64,
    pub is_owned_domain: bool,
}

/// Most frequently cited domains.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn top_cited_domains(
    pool: &PgPool,
    run_id: Option<Uuid>,
    limit: i64,
) -> Result<Vec<DomainCount>, DbError> {
    let rows = sqlx::query_as::<_, DomainCount>(
        "SELECT c.domain, \
                COUNT(*) AS citation_count, \
                BOOL_OR(c.is_owned_domain) AS is_owned_domain \
         FROM citations c \
         JOIN responses r ON r.response_id = c.response_id \
         WHERE ($1::uuid IS NULL OR r.run_id = $1) \
         GROUP BY c.domain \
         ORDER BY citation_count DESC, c.domain \
         LIMIT $2",
    )
    .bind(run_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Target visibility for a single prompt across providers and repeats.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PromptVisibility {
    pub prompt_id: String,
    pub prompt_text: String,
    /// Analysed responses for this prompt.
    pub analysed_responses: i64,
    pub visible_responses: i64,
    pub recommended_responses: i64,
}

impl PromptVisibility {
    #[must_use]
    pub fn visibility(&self) -> f64 {
        percent(self.visible_responses, self.analysed_responses)
    }

    #[must_use]
    pub fn recommendation(&self) -> f64 {
        percent(self.recommended_responses, self.analysed_responses)
    }
}

/// Prompts with the lowest target visibility, worst first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn weakest_prompts(
    pool: &PgPool,
    run_id: Option<Uuid>,
    limit: i64,
) -> Result<Vec<PromptVisibility>, DbError> {
    let rows = sqlx::query_as::<_, PromptVisibility>(
        "SELECT r.prompt_id, \
                MIN(r.prompt_text) AS prompt_text, \
                COUNT(*) AS analysed_responses, \
                COUNT(*) FILTER \
                    (WHERE jsonb_array_length(a.target_brands_found) > 0) AS visible_responses, \
                COUNT(*) FILTER (WHERE a.is_primary_recommendation) AS recommended_responses \
         FROM responses r \
         JOIN analyses a ON a.response_id = r.response_id \
         WHERE ($1::uuid IS NULL OR r.run_id = $1) \
         GROUP BY r.prompt_id \
         ORDER BY (COUNT(*) FILTER \
                      (WHERE jsonb_array_length(a.target_brands_found) > 0))::DOUBLE PRECISION \
                  / COUNT(*) ASC, \
                  r.prompt_id \
         LIMIT $2",
    )
    .bind(run_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    provider: String,
    model: String,
    queries: i64,
    input_tokens: i64,
    output_tokens: i64,
}

/// Query and token totals per provider/model, the input to cost estimation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn usage_by_model(
    pool: &PgPool,
    run_id: Option<Uuid>,
) -> Result<Vec<ModelUsage>, DbError> {
    let rows = sqlx::query_as::<_, UsageRow>(
        "SELECT r.provider, r.model, \
                COUNT(*) AS queries, \
                COALESCE(SUM(r.input_tokens), 0)::BIGINT AS input_tokens, \
                COALESCE(SUM(r.output_tokens), 0)::BIGINT AS output_tokens \
         FROM responses r \
         WHERE ($1::uuid IS NULL OR r.run_id = $1) \
         GROUP BY r.provider, r.model \
         ORDER BY r.provider, r.model",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ModelUsage {
            provider: r.provider,
            model: r.model,
            queries: r.queries,
            input_tokens: r.input_tokens,
            output_tokens: r.output_tokens,
        })
        .collect())
}
