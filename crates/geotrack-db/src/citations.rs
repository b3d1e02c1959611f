//! Database operations for the `citations` table.

use geotrack_core::NormalizedCitation;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{to_i32, DbError};

/// A row from the `citations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CitationRow {
    pub citation_id: i64,
    pub response_id: Uuid,
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub cited_text: Option<String>,
    pub char_offset: Option<i32>,
    pub confidence: f64,
    pub is_owned_domain: bool,
}

/// Insert all citations for a response in a single transaction.
///
/// Either every citation is written or none are. Returns the number inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert or the commit fails.
pub async fn insert_citations(
    pool: &PgPool,
    response_id: Uuid,
    citations: &[NormalizedCitation],
) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;

    for c in citations {
        let char_offset = c
            .char_offset
            .map(|o| to_i32("char_offset", o as u64))
            .transpose()?;

        sqlx::query(
            "INSERT INTO citations \
                 (response_id, url, domain, title, cited_text, char_offset, confidence, \
                  is_owned_domain) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(response_id)
        .bind(&c.url)
        .bind(&c.domain)
        .bind(c.title.as_deref())
        .bind(c.cited_text.as_deref())
        .bind(char_offset)
        .bind(c.confidence.clamp(0.0, 1.0))
        .bind(c.is_owned_domain)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(citations.len())
}

/// Citations for one response in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_response_citations(
    pool: &PgPool,
    response_id: Uuid,
) -> Result<Vec<CitationRow>, DbError> {
    let rows = sqlx::query_as::<_, CitationRow>(
        "SELECT citation_id, response_id, url, domain, title, cited_text, char_offset, \
                confidence, is_owned_domain \
         FROM citations \
         WHERE response_id = $1 \
         ORDER BY citation_id",
    )
    .bind(response_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
