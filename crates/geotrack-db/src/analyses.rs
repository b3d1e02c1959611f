//! Database operations for the `analyses` and `brand_mentions` tables.

use geotrack_core::AnalysisRecord;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `analyses` table, joined to its response's prompt and
/// provider.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRow {
    pub analysis_id: i64,
    pub response_id: Uuid,
    pub prompt_id: String,
    pub provider: String,
    pub target_brands_found: Value,
    pub competitor_brands_found: Value,
    pub response_type: String,
    pub is_primary_recommendation: bool,
    pub target_domains_cited: Value,
    pub brand_mismatches: Value,
}

/// Insert the analysis for a response and its brand mentions atomically.
///
/// The analysis row and every mention row commit together; a failure on any
/// mention rolls the analysis back too.
///
/// # Errors
///
/// Returns [`DbError::Json`] if a list column cannot be encoded, or
/// [`DbError::Sqlx`] if the response already has an analysis or any insert
/// fails.
pub async fn insert_analysis(
    pool: &PgPool,
    response_id: Uuid,
    record: &AnalysisRecord,
) -> Result<i64, DbError> {
    let target_brands = serde_json::to_value(&record.target_brands_found)?;
    let competitor_brands = serde_json::to_value(&record.competitor_brands_found)?;
    let target_domains = serde_json::to_value(&record.target_domains_cited)?;
    let mismatches = serde_json::to_value(&record.mismatches)?;

    let mut tx = pool.begin().await?;

    let analysis_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO analyses \
             (response_id, target_brands_found, competitor_brands_found, response_type, \
              is_primary_recommendation, target_domains_cited, brand_mismatches) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING analysis_id",
    )
    .bind(response_id)
    .bind(target_brands)
    .bind(competitor_brands)
    .bind(record.response_type.as_str())
    .bind(record.is_primary_recommendation)
    .bind(target_domains)
    .bind(mismatches)
    .fetch_one(&mut *tx)
    .await?;

    for m in &record.mentions {
        let position = i32::try_from(m.mention.position).map_err(|_| DbError::OutOfRange {
            column: "position",
            value: u64::from(m.mention.position),
        })?;

        sqlx::query(
            "INSERT INTO brand_mentions \
                 (response_id, brand, position, sentiment, is_recommended, context, \
                  is_target_brand) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(response_id)
        .bind(&m.mention.brand)
        .bind(position)
        .bind(m.mention.sentiment.as_str())
        .bind(m.mention.is_recommended)
        .bind(&m.mention.context)
        .bind(m.is_target_brand)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(analysis_id)
}

/// All analyses recorded for a run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_run_analyses(pool: &PgPool, run_id: Uuid) -> Result<Vec<AnalysisRow>, DbError> {
    let rows = sqlx::query_as::<_, AnalysisRow>(
        "SELECT a.analysis_id, a.response_id, r.prompt_id, r.provider, \
                a.target_brands_found, a.competitor_brands_found, a.response_type, \
                a.is_primary_recommendation, a.target_domains_cited, a.brand_mismatches \
         FROM analyses a \
         JOIN responses r ON r.response_id = a.response_id \
         WHERE r.run_id = $1 \
         ORDER BY r.prompt_id, r.provider, r.repeat_num",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
