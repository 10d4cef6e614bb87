use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobmerge_core::JobPosting;
use jobmerge_engine::{DedupConfig, DedupEngine};
use jobmerge_intake::{load_batch, prepare, UrlPolicy};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "jobmerge-cli")]
#[command(about = "Deduplicate and merge scraped job postings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, clap::Args)]
struct BatchArgs {
    /// Scraped batch: a JSON array of postings or an object with a `jobs` array.
    file: PathBuf,
    /// YAML file with `default_threshold`, `strict_threshold` and `location_threshold`.
    #[arg(long)]
    thresholds: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Keep the best posting per distinct job.
    Dedup(BatchArgs),
    /// Merge duplicate postings into canonical records.
    Merge(BatchArgs),
    /// List duplicate clusters.
    Clusters(BatchArgs),
    /// Print dedup statistics.
    Stats(BatchArgs),
    /// Run the reporting pipeline configured through `JOBMERGE_*` variables.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Dedup(args) => {
            let (engine, jobs) = load(&args)?;
            print_json(&engine.deduplicate(&jobs))?;
        }
        Commands::Merge(args) => {
            let (engine, jobs) = load(&args)?;
            print_json(&engine.merge_duplicates(&jobs))?;
        }
        Commands::Clusters(args) => {
            let (engine, jobs) = load(&args)?;
            print_json(&engine.find_duplicate_clusters(&jobs))?;
        }
        Commands::Stats(args) => {
            let (engine, jobs) = load(&args)?;
            let unique = engine.deduplicate(&jobs);
            print_json(&engine.compute_stats(&jobs, &unique))?;
        }
        Commands::Run => {
            let summary = jobmerge_pipeline::run_once_from_env().await?;
            println!(
                "run complete: run_id={} mode={} in={} out={} removed={} reports={}",
                summary.run_id,
                summary.mode,
                summary.stats.original_count,
                summary.stats.unique_count,
                summary.stats.duplicates_removed,
                summary.reports_dir
            );
        }
    }

    Ok(())
}

fn load(args: &BatchArgs) -> Result<(DedupEngine, Vec<JobPosting>)> {
    let config = match &args.thresholds {
        Some(path) => DedupConfig::from_yaml_path(path)
            .with_context(|| format!("loading thresholds from {}", path.display()))?,
        None => DedupConfig::from_env().context("reading threshold overrides")?,
    };
    Ok((DedupEngine::new(config), read_postings(&args.file)?))
}

fn read_postings(path: &Path) -> Result<Vec<JobPosting>> {
    let batch = load_batch(path)?;
    let intake = prepare(&batch, &UrlPolicy::default());
    for rejection in &intake.rejected {
        warn!(index = rejection.index, reason = %rejection.reason, "skipping posting");
    }
    Ok(intake.accepted)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{text}");
    Ok(())
}
