use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod allocator;
mod config;
mod error;
mod intake;
mod models;
mod pg;
mod pipeline;
mod report;
mod scoring;
mod store;

use config::{Backend, FileConfig, Overrides, Settings};
use intake::ManualEntry;
use models::data_rows;
use pg::PgStore;
use report::FrequencyTable;
use store::{CsvStore, RecordStore};

#[derive(Parser)]
#[command(name = "survey-ledger")]
#[command(about = "Bullying survey intake with predicted academic performance", long_about = None)]
struct Cli {
    /// Config file (defaults to ./survey-ledger.toml when present)
    #[arg(long, global = true, env = "SURVEY_LEDGER_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_enum, env = "SURVEY_LEDGER_BACKEND")]
    backend: Option<Backend>,
    /// Ledger file for the csv backend
    #[arg(long, global = true, env = "SURVEY_LEDGER_PATH")]
    ledger: Option<PathBuf>,
    /// Scoring model artifact (JSON weights)
    #[arg(long, global = true, env = "SURVEY_LEDGER_MODEL")]
    model: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger and its header row
    Init,
    /// Score one student entered by hand and save the result
    Submit {
        #[arg(long)]
        name: String,
        /// male/female (m, f, l, p accepted)
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        age: i64,
        #[arg(long)]
        grade: i64,
        /// Bullying severity, 1-10
        #[arg(long)]
        severity: i64,
        /// Social support, 1-10
        #[arg(long)]
        support: i64,
        /// Mental health, 1-10
        #[arg(long)]
        mental_health: i64,
        /// physical, verbal, social, cyber or sexual
        #[arg(long)]
        category: String,
    },
    /// Score and save every row of a CSV upload
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the most recent ledger rows
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Write a markdown summary of bullying types
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Download the full ledger as CSV
    Export {
        #[arg(long, default_value = "ledger-export.csv")]
        out: PathBuf,
    },
    /// Render the bullying-type bar chart as PNG
    Chart {
        #[arg(long, default_value = "bullying-types.png")]
        out: PathBuf,
        /// Also write the counts behind the chart
        #[arg(long)]
        counts: Option<PathBuf>,
    },
    /// Delete every submission, keeping only the header
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "survey_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let file = FileConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let settings = Settings::resolve(
        file,
        Overrides {
            backend: cli.backend,
            ledger: cli.ledger,
            database_url: std::env::var("DATABASE_URL").ok(),
            model: cli.model,
        },
    );

    match settings.backend {
        Backend::Csv => {
            info!(path = %settings.ledger_path.display(), "using csv ledger");
            let store = CsvStore::new(settings.ledger_path.clone());
            run(&store, cli.command, &settings).await
        }
        Backend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(settings.database_url()?)
                .await
                .context("failed to connect to Postgres")?;
            let store = PgStore::new(pool);
            if matches!(cli.command, Commands::Init) {
                store.migrate().await.context("failed to create schema")?;
            }
            run(&store, cli.command, &settings).await
        }
    }
}

async fn run<S: RecordStore>(store: &S, command: Commands, settings: &Settings) -> anyhow::Result<()> {
    store
        .ensure_header()
        .await
        .context("ledger is not reachable")?;

    match command {
        Commands::Init => {
            println!("Ledger ready.");
        }
        Commands::Submit {
            name,
            gender,
            age,
            grade,
            severity,
            support,
            mental_health,
            category,
        } => {
            let submission = ManualEntry {
                name,
                gender,
                age,
                grade_level: grade,
                bullying_severity: severity,
                social_support: support,
                mental_health,
                bullying_category: category,
            }
            .validate()?;
            let model = settings.load_model()?;
            let record = pipeline::submit_manual(store, &model, submission).await?;
            println!(
                "Predicted score for {}: {:.2}",
                record.name, record.predicted_score
            );
            println!("Saved to the ledger as No {}.", record.id);
        }
        Commands::Import { csv } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let submissions = intake::parse_batch(file, &settings.required_columns)?;
            let model = settings.load_model()?;
            let records = pipeline::submit_batch(store, &model, submissions).await?;

            for record in &records {
                println!(
                    "- No {} {} ({}, {}): {:.2}",
                    record.id,
                    record.name,
                    record.gender,
                    record.bullying_category,
                    record.predicted_score
                );
            }
            println!("Saved {} rows from {}.", records.len(), csv.display());
        }
        Commands::History { limit } => {
            let rows = store.read_all().await?;
            let data = data_rows(&rows);
            if data.is_empty() {
                println!("No submissions recorded yet.");
                return Ok(());
            }
            println!("{}", models::LEDGER_HEADER.join(" | "));
            for row in &data[data.len().saturating_sub(limit)..] {
                println!("{}", row.join(" | "));
            }
        }
        Commands::Report { out } => {
            let rows = store.read_all().await?;
            let report = report::build_report(&rows, chrono::Utc::now());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let rows = store.read_all().await?;
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_ledger_csv(&rows, file)?;
            println!("Ledger exported to {}.", out.display());
        }
        Commands::Chart { out, counts } => {
            let rows = store.read_all().await?;
            let table = FrequencyTable::from_rows(&rows);
            report::save_chart(&table, &out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Chart written to {}.", out.display());

            if let Some(path) = counts {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_frequency_csv(&table, file)?;
                println!("Counts written to {}.", path.display());
            }

            match (table.most_common(), table.least_common()) {
                (Some(most), Some(least)) => println!(
                    "{} submissions. Most common: {} ({}); least common: {} ({}).",
                    table.total(),
                    most.category,
                    most.count,
                    least.category,
                    least.count
                ),
                _ => println!("No submissions recorded yet."),
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear the ledger without --yes");
            }
            store.clear().await?;
            info!("ledger cleared");
            println!("Ledger cleared.");
        }
    }

    Ok(())
}
