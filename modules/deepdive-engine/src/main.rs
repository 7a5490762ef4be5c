use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use deepdive_common::{Config, LeadRecord};
use deepdive_engine::{DeepDive, DeepDiveJob, MemoryLeadStore, PgLeadStore};

#[derive(Parser)]
#[command(name = "deepdive", about = "Resolve a lead's public profiles and summarize them")]
struct Cli {
    /// Emit JSON logs
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dry run against a lead loaded from a JSON file; prints the result.
    Run {
        #[arg(long)]
        lead_file: PathBuf,
    },
    /// Run the deep dive job for a lead stored in Postgres (DATABASE_URL).
    Job {
        #[arg(long)]
        lead_id: Uuid,
        /// Apply migrations before running
        #[arg(long)]
        migrate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("deepdive=info,deepdive_engine=info"));
    if cli.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env()?;
    config.log_redacted();

    match cli.command {
        Command::Run { lead_file } => {
            let raw = std::fs::read_to_string(&lead_file)
                .with_context(|| format!("reading {}", lead_file.display()))?;
            let record: LeadRecord =
                serde_json::from_str(&raw).context("lead file is not a valid lead record")?;
            let lead_id = record.lead.id;

            let store = Arc::new(MemoryLeadStore::new().with_lead(record));
            let engine = DeepDive::from_config(&config, store)?;
            let data = engine.run(lead_id).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Command::Job { lead_id, migrate } => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL environment variable is required for job")?;
            let store = PgLeadStore::connect(database_url).await?;
            if migrate {
                store.migrate().await?;
                tracing::info!("Migrations complete");
            }

            let engine = DeepDive::from_config(&config, Arc::new(store))?;
            DeepDiveJob::new(engine).perform(lead_id).await?;
        }
    }

    Ok(())
}
