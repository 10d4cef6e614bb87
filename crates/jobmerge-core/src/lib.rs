//! Core domain model for jobmerge: scraped postings, platforms, clusters and run statistics.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobmerge-core";

/// Namespace for deterministic cluster ids.
const CLUSTER_NAMESPACE: Uuid = Uuid::from_u128(0x6a0b_5e3c_1f2d_4c7a_9e81_3b5d_0c4f_72a1);

/// Job boards the upstream scrapers know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
    Indeed,
    LinkedIn,
    Glassdoor,
    Naukri,
    Himalayas,
    Monster,
    Dice,
    CareerBuilder,
    ZipRecruiter,
    Foundit,
}

impl Platform {
    pub const ALL: [Platform; 10] = [
        Platform::Indeed,
        Platform::LinkedIn,
        Platform::Glassdoor,
        Platform::Naukri,
        Platform::Himalayas,
        Platform::Monster,
        Platform::Dice,
        Platform::CareerBuilder,
        Platform::ZipRecruiter,
        Platform::Foundit,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Indeed => "Indeed",
            Platform::LinkedIn => "LinkedIn",
            Platform::Glassdoor => "Glassdoor",
            Platform::Naukri => "Naukri",
            Platform::Himalayas => "Himalayas",
            Platform::Monster => "Monster",
            Platform::Dice => "Dice",
            Platform::CareerBuilder => "CareerBuilder",
            Platform::ZipRecruiter => "ZipRecruiter",
            Platform::Foundit => "Foundit",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job platform `{0}`")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

impl TryFrom<String> for Platform {
    type Error = UnknownPlatform;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(value: Platform) -> Self {
        value.display_name().to_string()
    }
}

/// A single scraped posting as handed over by the scraping layer.
///
/// `job_hash` and `available_platforms` are derived by the dedup engine and are
/// normally absent on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub match_score: f64,
    #[serde(default)]
    pub posted_date: String,
    pub source: Platform,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_hash: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub available_platforms: BTreeSet<Platform>,
}

impl JobPosting {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
        source: Platform,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            company: company.into(),
            location: location.into(),
            description: String::new(),
            requirements: Vec::new(),
            match_score: 0.0,
            posted_date: String::new(),
            source,
            url: None,
            salary: None,
            job_hash: None,
            available_platforms: BTreeSet::new(),
        }
    }

    pub fn with_match_score(mut self, score: f64) -> Self {
        self.match_score = score;
        self
    }

    pub fn with_posted_date(mut self, posted_date: impl Into<String>) -> Self {
        self.posted_date = posted_date.into();
        self
    }

    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_salary(mut self, salary: impl Into<String>) -> Self {
        self.salary = Some(salary.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Platforms this record stands for; a record that absorbed nothing stands for its own source.
    pub fn platforms(&self) -> BTreeSet<Platform> {
        if self.available_platforms.is_empty() {
            BTreeSet::from([self.source])
        } else {
            self.available_platforms.clone()
        }
    }

    /// Absolute timestamp for `posted_date`, if it is written in one of the absolute formats
    /// scrapers emit. Relative strings such as "2 days ago" yield `None`.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        parse_posted_date(&self.posted_date)
    }

    pub fn salary_text(&self) -> Option<&str> {
        self.salary.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

pub fn parse_posted_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%d %b %Y", "%b %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

/// A seed posting and every later posting judged a duplicate of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub representative: JobPosting,
    pub duplicates: Vec<JobPosting>,
}

impl DuplicateCluster {
    /// Stable id derived from member ids, usable as a report key.
    pub fn cluster_id(&self) -> Uuid {
        let joined = self
            .members()
            .map(|job| job.id.as_str())
            .collect::<Vec<_>>()
            .join("|");
        Uuid::new_v5(&CLUSTER_NAMESPACE, joined.as_bytes())
    }

    pub fn members(&self) -> impl Iterator<Item = &JobPosting> {
        std::iter::once(&self.representative).chain(self.duplicates.iter())
    }

    pub fn member_count(&self) -> usize {
        1 + self.duplicates.len()
    }
}

/// Summary of one dedup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub original_count: usize,
    pub unique_count: usize,
    pub duplicates_removed: usize,
    pub duplicate_group_count: usize,
    pub deduplication_rate_percent: f64,
    #[serde(default)]
    pub platform_distribution: BTreeMap<Platform, usize>,
}
