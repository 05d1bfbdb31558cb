use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aggregate;
mod classifier;
mod config;
mod forecast;
mod import;
mod models;
mod priority;
mod regions;
mod report;
mod seed;
mod store;

use config::ForecastConfig;
use forecast::ForecastPipeline;
use models::{ForecastKey, ForecastRecord};
use store::{ForecastStore, IssueRepository, JsonStore, PgStore};

#[derive(Parser)]
#[command(name = "civic-issue-forecast")]
#[command(about = "Forecasts recurring civic issues per region from citizen reports", long_about = None)]
struct Cli {
    /// Where the issue corpus and forecasts live
    #[arg(long, value_enum, default_value_t = Backend::Json, global = true)]
    store: Backend,
    #[arg(long, default_value = "all_issues.json", global = true)]
    issues: PathBuf,
    #[arg(long, default_value = "ai_predictions.json", global = true)]
    forecasts: PathBuf,
    /// TOML file overriding thresholds, horizon, messages and model settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Json,
    Postgres,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import issues from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "imported_issues")]
        owner: String,
    },
    /// Retrain on the full corpus and replace the stored forecasts
    Train,
    /// List stored forecasts
    Forecasts {
        #[arg(long)]
        region: Option<String>,
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Upvote one stored forecast
    Upvote {
        #[arg(long)]
        region: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ForecastConfig::load(cli.config.as_deref())?;

    match cli.store {
        Backend::Json => {
            let store = JsonStore::new(&cli.issues, &cli.forecasts);
            execute(&store, cli.command, config).await
        }
        Backend::Postgres => {
            let database_url = std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set to a production Postgres instance")?;
            let store = PgStore::connect(&database_url).await?;
            if matches!(cli.command, Commands::InitDb) {
                store.init_db().await?;
                println!("Schema ready.");
                return Ok(());
            }
            execute(&store, cli.command, config).await
        }
    }
}

async fn execute<S>(store: &S, command: Commands, config: ForecastConfig) -> anyhow::Result<()>
where
    S: IssueRepository + ForecastStore,
{
    match command {
        Commands::InitDb => anyhow::bail!("init-db requires --store postgres"),
        Commands::Seed => {
            let inserted = store
                .replace_owner_issues(seed::SEED_OWNER, &seed::seed_issues())
                .await?;
            println!("Seed data inserted ({inserted} issues).");
        }
        Commands::Import { csv, owner } => {
            let issues = import::read_issues_csv(&csv)?;
            let inserted = store.append_issues(&owner, &issues).await?;
            println!("Inserted {inserted} issues from {}.", csv.display());
        }
        Commands::Train => {
            let pipeline = ForecastPipeline::new(config);
            let forecasts = pipeline.run(store, store).await?;

            if forecasts.is_empty() {
                println!(
                    "No region has at least {} usable issues; forecasts cleared.",
                    pipeline.config().min_volume_threshold
                );
                return Ok(());
            }

            println!("Forecasts updated! {} predictions generated.", forecasts.len());
            print_forecasts(forecasts.iter());
        }
        Commands::Forecasts { region, limit } => {
            let forecasts = store.list_forecasts().await?;
            let selected: Vec<&ForecastRecord> = forecasts
                .iter()
                .filter(|f| region.as_deref().map_or(true, |r| f.region == r))
                .take(limit)
                .collect();

            if selected.is_empty() {
                println!("No forecasts stored for this selection.");
                return Ok(());
            }

            print_forecasts(selected.into_iter());
        }
        Commands::Report { out } => {
            let forecasts = store.list_forecasts().await?;
            let report = report::build_report(Utc::now().date_naive(), &forecasts);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write report {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Upvote {
            region,
            category,
            date,
        } => {
            let key = ForecastKey {
                region,
                category,
                expected_date: date,
            };
            if store.upvote(&key).await? {
                println!("Upvoted {key}.");
            } else {
                println!("No forecast matches {key}.");
            }
        }
    }

    Ok(())
}

fn print_forecasts<'a>(forecasts: impl Iterator<Item = &'a ForecastRecord>) {
    for forecast in forecasts {
        println!(
            "- {} on {}: {} [{}] {} ({} upvotes)",
            forecast.region,
            forecast.expected_date,
            forecast.category,
            forecast.priority,
            forecast.description,
            forecast.upvotes
        );
    }
}
