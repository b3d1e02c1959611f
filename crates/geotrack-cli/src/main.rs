mod export;
mod report;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "geotrack")]
#[command(about = "Track brand visibility in LLM web-search answers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the prompt catalog against providers and store the results
    Run {
        /// Only run prompts in this category
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated provider names (defaults to every registered provider
        /// that has an API key configured)
        #[arg(long, value_delimiter = ',')]
        providers: Vec<String>,
        /// Times each prompt is sent to each provider
        #[arg(long, default_value_t = 1)]
        repeats: u32,
        /// In-flight queries per provider (defaults to GEOTRACK_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Skip brand extraction
        #[arg(long)]
        no_analyze: bool,
    },
    /// Send one prompt and print the answer without storing it
    Query {
        prompt: String,
        /// Provider name, or `all`
        #[arg(long, default_value = "all")]
        provider: String,
        /// Run brand extraction on each answer
        #[arg(long)]
        analyze: bool,
    },
    /// Print a markdown visibility report for a run
    Report {
        /// Run to report on (defaults to the latest run)
        #[arg(long)]
        run_id: Option<Uuid>,
    },
    /// Estimate API spend from recorded token usage
    Costs {
        /// Limit to one run (defaults to all runs)
        #[arg(long)]
        run_id: Option<Uuid>,
    },
    /// Write one CSV row per stored response
    Export {
        /// Limit to one run (defaults to all runs)
        #[arg(long)]
        run_id: Option<Uuid>,
        /// Output CSV path
        #[arg(short, long, default_value = "export.csv")]
        output: PathBuf,
    },
    /// Database maintenance commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("geotrack: no command given; see `geotrack --help`");
        return Ok(());
    };

    let config = geotrack_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match command {
        Commands::Query {
            prompt,
            provider,
            analyze,
        } => run::run_query(&config, &prompt, &provider, analyze).await,
        other => {
            let pool = geotrack_db::connect_pool(
                &config.database_url,
                geotrack_db::PoolConfig::from_app_config(&config),
            )
            .await?;
            dispatch(pool, &config, other).await
        }
    }
}

async fn dispatch(
    pool: sqlx::PgPool,
    config: &geotrack_core::AppConfig,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            category,
            providers,
            repeats,
            concurrency,
            no_analyze,
        } => {
            let args = run::RunArgs {
                category,
                providers,
                repeats,
                concurrency,
                analyze: !no_analyze,
            };
            run::run_batch(pool, config, args).await
        }
        Commands::Report { run_id } => report::run_report(&pool, run_id).await,
        Commands::Costs { run_id } => report::run_costs(&pool, run_id).await,
        Commands::Export { run_id, output } => export::run_export(&pool, run_id, &output).await,
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                geotrack_db::ping(&pool).await?;
                println!("database: ok");
                Ok(())
            }
            DbCommands::Migrate => {
                let applied = geotrack_db::run_migrations(&pool).await?;
                println!("migrations: {applied} applied");
                Ok(())
            }
            DbCommands::Stats => report::run_db_stats(&pool).await,
        },
        Commands::Query { .. } => anyhow::bail!("query does not use the database"),
    }
}
