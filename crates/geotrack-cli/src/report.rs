//! Read-only report handlers.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

const TOP_COMPETITORS: i64 = 10;
const TOP_DOMAINS: i64 = 10;
const WEAKEST_PROMPTS: i64 = 5;

fn fmt_position(position: Option<f64>) -> String {
    position.map_or_else(|| "\u{2014}".to_string(), |p| format!("{p:.1}"))
}

fn fmt_sentiment(counts: &std::collections::BTreeMap<String, i64>) -> String {
    if counts.is_empty() {
        return "\u{2014}".to_string();
    }
    counts
        .iter()
        .map(|(label, n)| format!("{label} {n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate a markdown visibility report for one run.
///
/// With no `run_id` the latest run is used. "No runs yet" and "run has no
/// data" are reported separately.
///
/// # Errors
///
/// Returns an error if `run_id` does not exist or a query fails.
pub(crate) async fn run_report(pool: &sqlx::PgPool, run_id: Option<Uuid>) -> anyhow::Result<()> {
    let run = match run_id {
        Some(id) => match geotrack_db::get_run(pool, id).await {
            Ok(run) => run,
            Err(geotrack_db::DbError::NotFound) => anyhow::bail!("run {id} not found"),
            Err(e) => return Err(e.into()),
        },
        None => match geotrack_db::latest_run(pool).await? {
            Some(run) => run,
            None => {
                println!("no runs yet; run `geotrack run` first");
                return Ok(());
            }
        },
    };

    let overview = geotrack_db::engine_overview(pool, Some(run.run_id)).await?;
    if overview.is_empty() {
        println!(
            "run {} ({}) has no stored responses; every task may have failed",
            run.run_id, run.status
        );
        return Ok(());
    }

    let competitors = geotrack_db::top_competitors(pool, Some(run.run_id), TOP_COMPETITORS).await?;
    let domains = geotrack_db::top_cited_domains(pool, Some(run.run_id), TOP_DOMAINS).await?;
    let weakest = geotrack_db::weakest_prompts(pool, Some(run.run_id), WEAKEST_PROMPTS).await?;

    let now = Utc::now().format("%Y-%m-%d %H:%M UTC");
    let finished = run.finished_at.map_or_else(
        || "\u{2014}".to_string(),
        |t| t.format("%Y-%m-%d %H:%M UTC").to_string(),
    );

    println!("# Visibility Report");
    println!();
    println!("**Generated**: {now}");
    println!("**Run**: {} ({})", run.run_id, run.status);
    println!(
        "**Started**: {}  **Finished**: {finished}",
        run.started_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "**Scope**: {} prompts x {} providers x {} repeats",
        run.prompt_count, run.provider_count, run.repeats
    );
    println!();
    println!("---");
    println!();

    println!("## Engines");
    println!();
    println!(
        "| Provider | Responses | Visibility % | Share of Voice % | Recommended % | \
         Avg Position | Cited % | Owned Citations % | Sentiment | Avg Latency ms |"
    );
    println!("|---|---|---|---|---|---|---|---|---|---|");
    for e in &overview {
        println!(
            "| {} | {} | {:.1} | {:.1} | {:.1} | {} | {:.1} | {:.1} | {} | {} |",
            e.provider,
            e.total_responses,
            e.visibility_score,
            e.share_of_voice,
            e.recommendation_rate,
            fmt_position(e.avg_target_position),
            e.citation_rate,
            e.owned_citation_rate,
            fmt_sentiment(&e.sentiment),
            e.avg_latency_ms,
        );
    }
    println!();

    println!("## Top Competitors");
    println!();
    if competitors.is_empty() {
        println!("No competitor mentions recorded.");
    } else {
        println!("| Brand | Mentions | Avg Position | Sentiment | Recommended |");
        println!("|---|---|---|---|---|");
        for c in &competitors {
            println!(
                "| {} | {} | {:.1} | {} | {} |",
                c.brand, c.mention_count, c.avg_position, c.sentiment_mode, c.recommendation_count
            );
        }
    }
    println!();

    println!("## Most Cited Domains");
    println!();
    if domains.is_empty() {
        println!("No citations recorded.");
    } else {
        println!("| Domain | Citations | Owned |");
        println!("|---|---|---|");
        for d in &domains {
            let owned = if d.is_owned_domain { "yes" } else { "no" };
            println!("| {} | {} | {owned} |", d.domain, d.citation_count);
        }
    }
    println!();

    println!("## Weakest Prompts");
    println!();
    if weakest.is_empty() {
        println!("No analysed responses recorded.");
    } else {
        println!("| Prompt | Analysed | Visibility % | Recommended % | Text |");
        println!("|---|---|---|---|---|");
        for p in &weakest {
            println!(
                "| {} | {} | {:.1} | {:.1} | {} |",
                p.prompt_id,
                p.analysed_responses,
                p.visibility(),
                p.recommendation(),
                p.prompt_text
            );
        }
    }

    Ok(())
}

/// Print estimated API spend per provider/model.
///
/// # Errors
///
/// Returns an error if the usage query fails.
pub(crate) async fn run_costs(pool: &sqlx::PgPool, run_id: Option<Uuid>) -> anyhow::Result<()> {
    let usage = geotrack_db::usage_by_model(pool, run_id).await?;
    if usage.is_empty() {
        println!(
            "no token usage recorded{}",
            run_id.map(|id| format!(" for run {id}")).unwrap_or_default()
        );
        return Ok(());
    }

    let costs = geotrack_core::compute_costs(&usage);
    let total: Decimal = costs.iter().map(|c| c.total_cost).sum();

    println!(
        "{:<12}{:<26}{:>9}{:>14}{:>14}{:>12}",
        "PROVIDER", "MODEL", "QUERIES", "INPUT TOK", "OUTPUT TOK", "COST USD"
    );
    for c in &costs {
        println!(
            "{:<12}{:<26}{:>9}{:>14}{:>14}{:>12}",
            c.provider,
            c.model,
            c.queries,
            c.input_tokens,
            c.output_tokens,
            c.total_cost.round_dp(4)
        );
    }
    println!("{:>87}", format!("total ${}", total.round_dp(4)));

    Ok(())
}

/// Print row counts for every table.
///
/// # Errors
///
/// Returns an error if a count query fails.
pub(crate) async fn run_db_stats(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let stats = geotrack_db::db_stats(pool).await?;

    println!("runs:           {}", stats.runs);
    println!("responses:      {}", stats.responses);
    println!("citations:      {}", stats.citations);
    println!("brand_mentions: {}", stats.brand_mentions);
    println!("analyses:       {}", stats.analyses);
    for (provider, count) in &stats.responses_by_provider {
        println!("  {provider:<14}{count}");
    }

    Ok(())
}
