//! Database operations for the `runs` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub prompt_count: i32,
    pub provider_count: i32,
    pub repeats: i32,
    /// `running` or `completed`.
    pub status: String,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Creates a new run in `running` status and returns its id.
///
/// The UUID is generated in Rust and never shares an id space with responses.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_run(
    pool: &PgPool,
    prompt_count: i32,
    provider_count: i32,
    repeats: i32,
) -> Result<Uuid, DbError> {
    let run_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO runs (run_id, started_at, prompt_count, provider_count, repeats, status) \
         VALUES ($1, NOW(), $2, $3, $4, 'running')",
    )
    .bind(run_id)
    .bind(prompt_count)
    .bind(provider_count)
    .bind(repeats)
    .execute(pool)
    .await?;

    Ok(run_id)
}

/// Marks a run `completed` and sets `finished_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is missing or not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn finish_run(pool: &PgPool, run_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE runs \
         SET status = 'completed', finished_at = NOW() \
         WHERE run_id = $1 AND status = 'running'",
    )
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            run_id,
            expected_status: "running",
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a single run.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has this id, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<RunRow, DbError> {
    let row = sqlx::query_as::<_, RunRow>(
        "SELECT run_id, started_at, finished_at, prompt_count, provider_count, repeats, status \
         FROM runs \
         WHERE run_id = $1",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recently started run, or `None` if no run exists yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_run(pool: &PgPool) -> Result<Option<RunRow>, DbError> {
    let row = sqlx::query_as::<_, RunRow>(
        "SELECT run_id, started_at, finished_at, prompt_count, provider_count, repeats, status \
         FROM runs \
         ORDER BY started_at DESC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_runs(pool: &PgPool, limit: i64) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as::<_, RunRow>(
        "SELECT run_id, started_at, finished_at, prompt_count, provider_count, repeats, status \
         FROM runs \
         ORDER BY started_at DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
