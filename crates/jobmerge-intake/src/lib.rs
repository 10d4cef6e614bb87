//! Scraped batch loading, record validation and apply-link repair.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use jobmerge_core::JobPosting;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

pub const CRATE_NAME: &str = "jobmerge-intake";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("parsing {path}: expected a postings array or an object with a `jobs` array")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// One scraper run's output, records still untyped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedBatch {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Wrapped(ScrapedBatch),
    Bare(Vec<JsonValue>),
}

pub fn parse_batch(text: &str) -> Result<ScrapedBatch, IntakeError> {
    parse_batch_from(text, "batch text")
}

pub fn load_batch(path: impl AsRef<Path>) -> Result<ScrapedBatch, IntakeError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_batch_from(&text, &path.display().to_string())
}

fn parse_batch_from(text: &str, path: &str) -> Result<ScrapedBatch, IntakeError> {
    let file: BatchFile = serde_json::from_str(text).map_err(|source| IntakeError::Json {
        path: path.to_string(),
        source,
    })?;
    Ok(match file {
        BatchFile::Wrapped(batch) => batch,
        BatchFile::Bare(jobs) => ScrapedBatch {
            jobs,
            ..ScrapedBatch::default()
        },
    })
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("missing title")]
    MissingTitle,
    #[error("missing company")]
    MissingCompany,
    #[error("match score {0} outside [0, 100]")]
    ScoreOutOfRange(f64),
}

/// A record that did not make it into the engine input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub id: Option<String>,
    pub reason: RejectReason,
}

/// Title and company are mandatory; the score must be a real number within [0, 100].
pub fn validate_posting(job: &JobPosting) -> Result<(), RejectReason> {
    if job.title.trim().is_empty() {
        return Err(RejectReason::MissingTitle);
    }
    if job.company.trim().is_empty() {
        return Err(RejectReason::MissingCompany);
    }
    if !(0.0..=100.0).contains(&job.match_score) {
        return Err(RejectReason::ScoreOutOfRange(job.match_score));
    }
    Ok(())
}

/// Which apply links are kept and where broken ones are pointed instead.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UrlPolicy {
    pub dead_link_patterns: Vec<String>,
    pub search_base: String,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            dead_link_patterns: ["expired", "job-not-found", "jobs/closed", "no-longer-available"]
                .into_iter()
                .map(String::from)
                .collect(),
            search_base: "https://www.google.com/search".to_string(),
        }
    }
}

impl UrlPolicy {
    pub fn is_usable(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || url == "#" {
            return false;
        }
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let lowered = url.to_ascii_lowercase();
        !self
            .dead_link_patterns
            .iter()
            .any(|pattern| lowered.contains(&pattern.to_ascii_lowercase()))
    }

    /// Search link for a posting whose own link is unusable.
    pub fn search_url(&self, job: &JobPosting) -> Option<String> {
        let query = format!("{} {} {}", job.title, job.company, job.source)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Url::parse_with_params(&self.search_base, &[("q", query)])
            .ok()
            .map(String::from)
    }

    /// Replaces an unusable apply link with a search link. Returns whether it did.
    pub fn repair(&self, job: &mut JobPosting) -> bool {
        if job.url.as_deref().is_some_and(|url| self.is_usable(url)) {
            return false;
        }
        match self.search_url(job) {
            Some(fallback) => {
                job.url = Some(fallback);
                true
            }
            None => false,
        }
    }
}

/// Engine-ready postings plus everything that was turned away.
#[derive(Debug, Clone, Default)]
pub struct Intake {
    pub accepted: Vec<JobPosting>,
    pub rejected: Vec<Rejection>,
    pub repaired_urls: usize,
}

/// Types, validates and link-repairs every record, keeping input order.
pub fn prepare(batch: &ScrapedBatch, policy: &UrlPolicy) -> Intake {
    let mut intake = Intake::default();
    for (index, raw) in batch.jobs.iter().enumerate() {
        let id = raw.get("id").and_then(JsonValue::as_str).map(str::to_string);
        let mut job: JobPosting = match serde_json::from_value(raw.clone()) {
            Ok(job) => job,
            Err(err) => {
                intake.rejected.push(Rejection {
                    index,
                    id,
                    reason: RejectReason::Malformed(err.to_string()),
                });
                continue;
            }
        };
        if let Err(reason) = validate_posting(&job) {
            intake.rejected.push(Rejection { index, id, reason });
            continue;
        }
        if policy.repair(&mut job) {
            intake.repaired_urls += 1;
        }
        intake.accepted.push(job);
    }
    intake
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmerge_core::Platform;

    fn posting(url: Option<&str>) -> JobPosting {
        let job = JobPosting::new("x", "Rust Engineer", "Acme & Sons", "Remote", Platform::Dice);
        match url {
            Some(url) => job.with_url(url),
            None => job,
        }
    }

    #[test]
    fn parses_bare_array_and_wrapped_batch() {
        let bare = parse_batch(r#"[{"id": "1"}]"#).unwrap();
        assert_eq!(bare.jobs.len(), 1);
        assert!(bare.batch_id.is_none());

        let wrapped = parse_batch(
            r#"{"batch_id": "b-7", "scraped_at": "2026-03-01T08:00:00Z", "jobs": []}"#,
        )
        .unwrap();
        assert_eq!(wrapped.batch_id.as_deref(), Some("b-7"));
        assert!(wrapped.scraped_at.is_some());
        assert!(wrapped.jobs.is_empty());

        assert!(matches!(parse_batch("{\"nope\": 1}"), Err(IntakeError::Json { .. })));
    }

    #[test]
    fn load_batch_keeps_json_error_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[{\"id\": ").unwrap();
        let err = load_batch(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
        let source = std::error::Error::source(&err).expect("json source");
        assert!(source.downcast_ref::<serde_json::Error>().is_some());
    }

    #[test]
    fn load_batch_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_batch(dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn validation_requires_title_company_and_sane_score() {
        let ok = posting(None).with_match_score(55.0);
        assert_eq!(validate_posting(&ok), Ok(()));

        let mut no_title = ok.clone();
        no_title.title = "   ".into();
        assert_eq!(validate_posting(&no_title), Err(RejectReason::MissingTitle));

        let mut no_company = ok.clone();
        no_company.company.clear();
        assert_eq!(validate_posting(&no_company), Err(RejectReason::MissingCompany));

        let too_high = ok.clone().with_match_score(140.0);
        assert_eq!(validate_posting(&too_high), Err(RejectReason::ScoreOutOfRange(140.0)));
        assert!(validate_posting(&ok.with_match_score(f64::NAN)).is_err());
    }

    #[test]
    fn unusable_links_are_detected() {
        let policy = UrlPolicy::default();
        assert!(policy.is_usable("https://www.indeed.com/viewjob?jk=abc"));
        assert!(!policy.is_usable(""));
        assert!(!policy.is_usable("#"));
        assert!(!policy.is_usable("/jobs/view/1"));
        assert!(!policy.is_usable("javascript:void(0)"));
        assert!(!policy.is_usable("https://www.dice.com/job-detail/EXPIRED-123"));
        assert!(!policy.is_usable("https://careers.example.com/jobs/closed/55"));
    }

    #[test]
    fn repair_points_broken_links_at_search() {
        let policy = UrlPolicy::default();

        let mut good = posting(Some("https://www.dice.com/job-detail/123"));
        assert!(!policy.repair(&mut good));
        assert_eq!(good.url.as_deref(), Some("https://www.dice.com/job-detail/123"));

        for broken in [None, Some(""), Some("#"), Some("https://x.com/no-longer-available")] {
            let mut job = posting(broken);
            assert!(policy.repair(&mut job));
            assert_eq!(
                job.url.as_deref(),
                Some("https://www.google.com/search?q=Rust+Engineer+Acme+%26+Sons+Dice")
            );
        }
    }

    #[test]
    fn prepare_keeps_order_and_collects_rejections() {
        let batch = parse_batch(
            r##"[
                {"id": "a", "title": "Rust Engineer", "company": "Acme", "source": "Indeed",
                 "url": "https://www.indeed.com/viewjob?jk=1", "matchScore": 80},
                {"id": "b", "title": "Rust Engineer", "company": "Acme", "source": "Craigslist"},
                {"id": "c", "title": "", "company": "Acme", "source": "Dice"},
                {"id": "d", "title": "Designer", "company": "Globex", "source": "monster", "url": "#"}
            ]"##,
        )
        .unwrap();
        let intake = prepare(&batch, &UrlPolicy::default());

        let accepted: Vec<_> = intake.accepted.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(accepted, vec!["a", "d"]);
        assert_eq!(intake.repaired_urls, 1);
        assert_eq!(intake.rejected.len(), 2);
        assert_eq!(intake.rejected[0].index, 1);
        assert!(matches!(intake.rejected[0].reason, RejectReason::Malformed(_)));
        assert_eq!(intake.rejected[1].id.as_deref(), Some("c"));
        assert_eq!(intake.rejected[1].reason, RejectReason::MissingTitle);
    }
}
