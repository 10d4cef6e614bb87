//! One-shot dedup run: scraped batch in, deduplicated postings and reports out.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use jobmerge_core::{DedupStats, DuplicateCluster, JobPosting};
use jobmerge_engine::{DedupConfig, DedupEngine};
use jobmerge_intake::{parse_batch, prepare, Rejection, UrlPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobmerge-pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Best representative per distinct job.
    Dedup,
    /// Field-level merge of every duplicate cluster.
    Merge,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dedup" => Ok(RunMode::Dedup),
            "merge" => Ok(RunMode::Merge),
            other => bail!("unknown run mode `{other}` (expected `dedup` or `merge`)"),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Dedup => "dedup",
            RunMode::Merge => "merge",
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_path: PathBuf,
    pub reports_dir: PathBuf,
    pub settings_path: Option<PathBuf>,
    pub mode: RunMode,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            input_path: std::env::var("JOBMERGE_INPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./fixtures/sample-batch/jobs.json")),
            reports_dir: std::env::var("JOBMERGE_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./reports")),
            settings_path: std::env::var("JOBMERGE_CONFIG").ok().map(PathBuf::from),
            mode: match std::env::var("JOBMERGE_MODE") {
                Ok(raw) => raw.parse::<RunMode>().context("reading JOBMERGE_MODE")?,
                Err(_) => RunMode::Dedup,
            },
        })
    }
}

/// Contents of the optional YAML settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dedup: DedupConfig,
    pub urls: UrlPolicy,
}

impl Settings {
    /// Settings from `path` (or defaults), then `JOBMERGE_*_THRESHOLD` variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Like [`Settings::load`] with an explicit variable lookup.
    pub fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_yaml::from_str::<Settings>(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => Settings::default(),
        };
        settings.dedup = settings
            .dedup
            .with_overrides(lookup)
            .context("applying threshold settings")?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: RunMode,
    pub batch_id: Option<String>,
    pub stats: DedupStats,
    pub rejected: usize,
    pub repaired_urls: usize,
    pub reports_dir: String,
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifest {
    pub schema_version: u32,
    pub files: Vec<ReportManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
struct ClusterReport {
    cluster_id: Uuid,
    representative: String,
    duplicates: Vec<String>,
    platforms: Vec<String>,
}

impl From<&DuplicateCluster> for ClusterReport {
    fn from(cluster: &DuplicateCluster) -> Self {
        let mut platforms = cluster
            .members()
            .map(|job| job.source.to_string())
            .collect::<Vec<_>>();
        platforms.sort();
        platforms.dedup();
        Self {
            cluster_id: cluster.cluster_id(),
            representative: cluster.representative.id.clone(),
            duplicates: cluster.duplicates.iter().map(|job| job.id.clone()).collect(),
            platforms,
        }
    }
}

/// Engine output for one batch of accepted postings.
#[derive(Debug, Clone)]
pub struct Processed {
    pub jobs: Vec<JobPosting>,
    pub clusters: Vec<DuplicateCluster>,
    pub stats: DedupStats,
}

/// Runs the engine over `jobs` in `mode`; `now` stands in for unparseable posting dates.
pub fn process(engine: &DedupEngine, mode: RunMode, jobs: &[JobPosting], now: DateTime<Utc>) -> Processed {
    let output = match mode {
        RunMode::Dedup => engine.deduplicate(jobs),
        RunMode::Merge => engine.merge_duplicates_at(jobs, now),
    };
    let stats = engine.compute_stats(jobs, &output);
    Processed {
        jobs: output,
        clusters: engine.find_duplicate_clusters(jobs),
        stats,
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    engine: DedupEngine,
    url_policy: UrlPolicy,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, settings: Settings) -> Self {
        Self {
            config,
            engine: DedupEngine::new(settings.dedup),
            url_policy: settings.urls,
        }
    }

    pub fn from_env() -> Result<Self> {
        let config = PipelineConfig::from_env()?;
        let settings = Settings::load(config.settings_path.as_deref())?;
        Ok(Self::new(config, settings))
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, mode = %self.config.mode);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary> {
        let started_at = Utc::now();
        let input = &self.config.input_path;
        let text = fs::read_to_string(input)
            .await
            .with_context(|| format!("reading {}", input.display()))?;
        let batch = parse_batch(&text).with_context(|| format!("parsing {}", input.display()))?;

        let intake = prepare(&batch, &self.url_policy);
        for rejection in &intake.rejected {
            warn!(
                index = rejection.index,
                id = rejection.id.as_deref().unwrap_or("<none>"),
                reason = %rejection.reason,
                "rejected scraped posting"
            );
        }

        let processed = process(&self.engine, self.config.mode, &intake.accepted, started_at);
        info!(
            accepted = intake.accepted.len(),
            rejected = intake.rejected.len(),
            repaired_urls = intake.repaired_urls,
            unique = processed.stats.unique_count,
            clusters = processed.stats.duplicate_group_count,
            "batch processed"
        );

        let finished_at = Utc::now();
        let reports_dir = self.config.reports_dir.join(run_id.to_string());
        let manifest_path = write_reports(
            &reports_dir,
            &ReportInput {
                run_id,
                started_at,
                finished_at,
                mode: self.config.mode,
                batch_id: batch.batch_id.as_deref(),
                processed: &processed,
                rejected: &intake.rejected,
                repaired_urls: intake.repaired_urls,
            },
        )
        .await?;

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at,
            mode: self.config.mode,
            batch_id: batch.batch_id,
            stats: processed.stats,
            rejected: intake.rejected.len(),
            repaired_urls: intake.repaired_urls,
            reports_dir: reports_dir.display().to_string(),
            manifest: manifest_path.display().to_string(),
        })
    }
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    Pipeline::from_env()?.run_once().await
}

struct ReportInput<'a> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    mode: RunMode,
    batch_id: Option<&'a str>,
    processed: &'a Processed,
    rejected: &'a [Rejection],
    repaired_urls: usize,
}

async fn write_reports(reports_dir: &Path, input: &ReportInput<'_>) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    let jobs_path = reports_dir.join("jobs.json");
    let jobs = serde_json::to_vec_pretty(&input.processed.jobs).context("serializing jobs")?;
    fs::write(&jobs_path, jobs)
        .await
        .with_context(|| format!("writing {}", jobs_path.display()))?;

    let clusters_path = reports_dir.join("clusters.json");
    let clusters = input
        .processed
        .clusters
        .iter()
        .map(ClusterReport::from)
        .collect::<Vec<_>>();
    let clusters = serde_json::to_vec_pretty(&clusters).context("serializing clusters")?;
    fs::write(&clusters_path, clusters)
        .await
        .with_context(|| format!("writing {}", clusters_path.display()))?;

    let summary_path = reports_dir.join("summary.md");
    fs::write(&summary_path, summary_markdown(input))
        .await
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let manifest = ReportManifest {
        schema_version: 1,
        files: vec![
            manifest_entry("jobs", reports_dir, &jobs_path).await?,
            manifest_entry("clusters", reports_dir, &clusters_path).await?,
            manifest_entry("summary", reports_dir, &summary_path).await?,
        ],
    };
    let manifest_path = reports_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing report manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn summary_markdown(input: &ReportInput<'_>) -> String {
    let stats = &input.processed.stats;
    let platforms: BTreeMap<String, usize> = stats
        .platform_distribution
        .iter()
        .map(|(platform, count)| (platform.to_string(), *count))
        .collect();
    let platform_lines = platforms
        .iter()
        .map(|(platform, count)| format!("- {platform}: {count}"))
        .collect::<Vec<_>>()
        .join("\n");
    let rejection_lines = if input.rejected.is_empty() {
        "- none".to_string()
    } else {
        input
            .rejected
            .iter()
            .map(|r| format!("- #{} `{}`: {}", r.index, r.id.as_deref().unwrap_or("?"), r.reason))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "# Jobmerge Run Summary\n\n- Run ID: `{}`\n- Batch: {}\n- Mode: {}\n- Started: {}\n- Finished: {}\n- Postings in: {}\n- Postings out: {}\n- Duplicates removed: {}\n- Duplicate groups: {}\n- Deduplication rate: {:.1}%\n- Links repaired: {}\n\n## Platforms\n{}\n\n## Rejected\n{}\n",
        input.run_id,
        input.batch_id.unwrap_or("unnamed"),
        input.mode,
        input.started_at,
        input.finished_at,
        stats.original_count,
        stats.unique_count,
        stats.duplicates_removed,
        stats.duplicate_group_count,
        stats.deduplication_rate_percent,
        input.repaired_urls,
        platform_lines,
        rejection_lines,
    )
}

async fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ReportManifestFile> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ReportManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}
