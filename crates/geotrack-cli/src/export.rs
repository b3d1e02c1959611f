//! `export` command: one CSV row per stored response.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use geotrack_db::ExportRow;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

const HEADERS: [&str; 15] = [
    "run_id",
    "prompt_id",
    "prompt_text",
    "provider",
    "model",
    "latency_ms",
    "input_tokens",
    "output_tokens",
    "repeat_num",
    "target_brands_found",
    "competitor_brands_found",
    "response_type",
    "is_primary_recommendation",
    "citation_count",
    "owned_citation_count",
];

/// Field order matches [`HEADERS`].
#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    run_id: Uuid,
    prompt_id: &'a str,
    prompt_text: &'a str,
    provider: &'a str,
    model: &'a str,
    latency_ms: i64,
    input_tokens: i64,
    output_tokens: i64,
    repeat_num: i32,
    target_brands_found: String,
    competitor_brands_found: String,
    response_type: Option<&'a str>,
    is_primary_recommendation: Option<bool>,
    citation_count: i64,
    owned_citation_count: i64,
}

impl<'a> From<&'a ExportRow> for CsvRecord<'a> {
    fn from(row: &'a ExportRow) -> Self {
        Self {
            run_id: row.run_id,
            prompt_id: &row.prompt_id,
            prompt_text: &row.prompt_text,
            provider: &row.provider,
            model: &row.model,
            latency_ms: row.latency_ms,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            repeat_num: row.repeat_num,
            target_brands_found: brand_list(row.target_brands_found.as_ref()),
            competitor_brands_found: brand_list(row.competitor_brands_found.as_ref()),
            response_type: row.response_type.as_deref(),
            is_primary_recommendation: row.is_primary_recommendation,
            citation_count: row.citation_count,
            owned_citation_count: row.owned_citation_count,
        }
    }
}

/// Semicolon-separated brand keys from a JSONB string array; empty when the
/// response has no analysis.
fn brand_list(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|brands| {
            brands
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(";")
        })
        .unwrap_or_default()
}

/// Write the header and one record per row. The header is written even when
/// `rows` is empty.
fn write_csv<W: Write>(rows: &[ExportRow], out: W) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.serialize(CsvRecord::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Export stored responses, optionally for one run, to a CSV file.
///
/// # Errors
///
/// Returns an error if the query fails or `output` cannot be written.
pub(crate) async fn run_export(
    pool: &sqlx::PgPool,
    run_id: Option<Uuid>,
    output: &Path,
) -> anyhow::Result<()> {
    let rows = geotrack_db::export_rows(pool, run_id).await?;
    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    write_csv(&rows, file).with_context(|| format!("failed to write {}", output.display()))?;

    println!("exported {} rows to {}", rows.len(), output.display());
    Ok(())
}
