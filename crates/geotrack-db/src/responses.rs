//! Database operations for the `responses` table.

use chrono::{DateTime, Utc};
use geotrack_core::{Prompt, UnifiedResponse};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{to_i32, to_i64, DbError};

/// A row from the `responses` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResponseRow {
    pub response_id: Uuid,
    pub run_id: Uuid,
    pub prompt_id: String,
    pub prompt_text: String,
    pub provider: String,
    pub model: String,
    pub raw_text: String,
    pub raw_response: Value,
    pub latency_ms: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub repeat_num: i32,
    pub timestamp: DateTime<Utc>,
}

/// Persist one provider answer and return its freshly generated id.
///
/// # Errors
///
/// Returns [`DbError::OutOfRange`] if a counter does not fit its column, or
/// [`DbError::Sqlx`] if the insert fails (including an unknown `run_id`).
pub async fn insert_response(
    pool: &PgPool,
    run_id: Uuid,
    prompt: &Prompt,
    response: &UnifiedResponse,
    repeat_num: u32,
) -> Result<Uuid, DbError> {
    let response_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO responses \
             (response_id, run_id, prompt_id, prompt_text, provider, model, raw_text, \
              raw_response, latency_ms, input_tokens, output_tokens, repeat_num, \"timestamp\") \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(response_id)
    .bind(run_id)
    .bind(&prompt.id)
    .bind(&prompt.text)
    .bind(&response.provider)
    .bind(&response.model)
    .bind(&response.raw_text)
    .bind(&response.raw_response)
    .bind(to_i64("latency_ms", response.latency_ms)?)
    .bind(to_i64("input_tokens", response.input_tokens)?)
    .bind(to_i64("output_tokens", response.output_tokens)?)
    .bind(to_i32("repeat_num", u64::from(repeat_num))?)
    .bind(response.timestamp)
    .execute(pool)
    .await?;

    Ok(response_id)
}

/// All responses for a run, ordered by prompt, provider, then repeat.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_run_responses(pool: &PgPool, run_id: Uuid) -> Result<Vec<ResponseRow>, DbError> {
    let rows = sqlx::query_as::<_, ResponseRow>(
        "SELECT response_id, run_id, prompt_id, prompt_text, provider, model, raw_text, \
                raw_response, latency_ms, input_tokens, output_tokens, repeat_num, \"timestamp\" \
         FROM responses \
         WHERE run_id = $1 \
         ORDER BY prompt_id, provider, repeat_num",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
