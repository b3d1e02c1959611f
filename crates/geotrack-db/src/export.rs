//! Flat per-response rows for CSV export.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// One stored response with its analysis (if any) and citation counts.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportRow {
    pub run_id: Uuid,
    pub prompt_id: String,
    pub prompt_text: String,
    pub provider: String,
    pub model: String,
    pub latency_ms: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub repeat_num: i32,
    /// `None` when the response has no analysis.
    pub target_brands_found: Option<Value>,
    pub competitor_brands_found: Option<Value>,
    pub response_type: Option<String>,
    pub is_primary_recommendation: Option<bool>,
    pub citation_count: i64,
    pub owned_citation_count: i64,
}

/// Every stored response, optionally limited to one run, ordered by prompt,
/// provider and repeat.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn export_rows(pool: &PgPool, run_id: Option<Uuid>) -> Result<Vec<ExportRow>, DbError> {
    let rows = sqlx::query_as::<_, ExportRow>(
        "SELECT r.run_id, r.prompt_id, r.prompt_text, r.provider, r.model, \
                r.latency_ms, r.input_tokens, r.output_tokens, r.repeat_num, \
                a.target_brands_found, a.competitor_brands_found, a.response_type, \
                a.is_primary_recommendation, \
                (SELECT COUNT(*) FROM citations c \
                  WHERE c.response_id = r.response_id) AS citation_count, \
                (SELECT COUNT(*) FROM citations c \
                  WHERE c.response_id = r.response_id AND c.is_owned_domain) \
                  AS owned_citation_count \
         FROM responses r \
         LEFT JOIN analyses a ON a.response_id = r.response_id \
         WHERE $1::uuid IS NULL OR r.run_id = $1 \
         ORDER BY r.prompt_id, r.provider, r.repeat_num, r.\"timestamp\"",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
