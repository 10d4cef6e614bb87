//! Duplicate detection, collapsing and field-level merging of scraped postings.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use jobmerge_core::{DedupStats, DuplicateCluster, JobPosting, Platform};
use tracing::debug;

use crate::config::DedupConfig;
use crate::similarity::{fingerprint, similarity};

/// Stateless dedup service; it holds nothing but its thresholds.
#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    config: DedupConfig,
}

/// Seed index plus the indices of the later postings clustered with it.
type ClusterIndices = (usize, Vec<usize>);

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Duplicate predicate at the default threshold.
    pub fn are_duplicate(&self, a: &JobPosting, b: &JobPosting) -> bool {
        self.are_duplicate_at(a, b, self.config.default_threshold)
    }

    /// Duplicate predicate with a caller-chosen title/company threshold.
    pub fn are_duplicate_at(&self, a: &JobPosting, b: &JobPosting, threshold: f64) -> bool {
        self.matches(a, &fingerprint(a), b, &fingerprint(b), threshold)
    }

    fn matches(
        &self,
        a: &JobPosting,
        a_hash: &str,
        b: &JobPosting,
        b_hash: &str,
        threshold: f64,
    ) -> bool {
        if a_hash == b_hash {
            return true;
        }
        similarity(&a.title, &b.title) >= threshold
            && similarity(&a.company, &b.company) >= threshold
            && similarity(&a.location, &b.location) >= self.config.location_threshold
    }

    /// Exact-hash collapse followed by a strict fuzzy pass across the surviving representatives.
    pub fn deduplicate(&self, jobs: &[JobPosting]) -> Vec<JobPosting> {
        let representatives = self.collapse_exact(jobs);
        let collapsed = representatives.len();
        let survivors = self.drop_fuzzy_duplicates(representatives);
        debug!(
            input = jobs.len(),
            after_exact = collapsed,
            after_fuzzy = survivors.len(),
            "deduplicated postings"
        );
        survivors
    }

    fn collapse_exact(&self, jobs: &[JobPosting]) -> Vec<JobPosting> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<JobPosting>> = HashMap::new();

        for job in jobs {
            let hash = fingerprint(job);
            let mut job = job.clone();
            job.job_hash = Some(hash.clone());
            match groups.entry(hash) {
                Entry::Vacant(slot) => {
                    order.push(slot.key().clone());
                    slot.insert(vec![job]);
                }
                Entry::Occupied(mut slot) => slot.get_mut().push(job),
            }
        }

        order
            .iter()
            .filter_map(|hash| groups.remove(hash))
            .filter_map(collapse_group)
            .collect()
    }

    fn drop_fuzzy_duplicates(&self, representatives: Vec<JobPosting>) -> Vec<JobPosting> {
        let threshold = self.config.strict_threshold;
        let mut accepted: Vec<JobPosting> = Vec::with_capacity(representatives.len());

        for candidate in representatives {
            let candidate_hash = candidate.job_hash.clone().unwrap_or_else(|| fingerprint(&candidate));
            if let Some(kept) = accepted.iter().find(|kept| {
                let kept_hash = kept.job_hash.as_deref().unwrap_or_default();
                self.matches(kept, kept_hash, &candidate, &candidate_hash, threshold)
            }) {
                debug!(kept = %kept.id, dropped = %candidate.id, "fuzzy duplicate");
                continue;
            }
            accepted.push(candidate);
        }
        accepted
    }

    /// Clusters of postings duplicating an earlier seed, at the default threshold.
    pub fn find_duplicate_clusters(&self, jobs: &[JobPosting]) -> Vec<DuplicateCluster> {
        self.cluster_indices(jobs)
            .into_iter()
            .map(|(seed, duplicates)| DuplicateCluster {
                representative: jobs[seed].clone(),
                duplicates: duplicates.into_iter().map(|i| jobs[i].clone()).collect(),
            })
            .collect()
    }

    fn cluster_indices(&self, jobs: &[JobPosting]) -> Vec<ClusterIndices> {
        let hashes: Vec<String> = jobs.iter().map(fingerprint).collect();
        let threshold = self.config.default_threshold;
        let mut placed = vec![false; jobs.len()];
        let mut clusters = Vec::new();

        for seed in 0..jobs.len() {
            if placed[seed] {
                continue;
            }
            let mut duplicates = Vec::new();
            for other in (seed + 1)..jobs.len() {
                if placed[other] {
                    continue;
                }
                if self.matches(&jobs[seed], &hashes[seed], &jobs[other], &hashes[other], threshold) {
                    placed[other] = true;
                    duplicates.push(other);
                }
            }
            if !duplicates.is_empty() {
                placed[seed] = true;
                clusters.push((seed, duplicates));
            }
        }
        clusters
    }

    /// Collapses every duplicate cluster into one canonical record, using the current time
    /// for postings whose date cannot be parsed.
    pub fn merge_duplicates(&self, jobs: &[JobPosting]) -> Vec<JobPosting> {
        self.merge_duplicates_at(jobs, Utc::now())
    }

    /// Same as [`DedupEngine::merge_duplicates`] with an explicit "now".
    ///
    /// Output holds the merged clusters in seed order followed by untouched singletons in
    /// input order.
    pub fn merge_duplicates_at(&self, jobs: &[JobPosting], now: DateTime<Utc>) -> Vec<JobPosting> {
        let clusters = self.cluster_indices(jobs);
        let mut clustered = vec![false; jobs.len()];
        let mut merged = Vec::with_capacity(jobs.len());

        for (seed, duplicates) in &clusters {
            let members: Vec<&JobPosting> = std::iter::once(*seed)
                .chain(duplicates.iter().copied())
                .map(|i| {
                    clustered[i] = true;
                    &jobs[i]
                })
                .collect();
            merged.push(merge_cluster(&members, now));
        }

        merged.extend(
            jobs.iter()
                .zip(&clustered)
                .filter(|(_, in_cluster)| !**in_cluster)
                .map(|(job, _)| job.clone()),
        );
        debug!(
            input = jobs.len(),
            clusters = clusters.len(),
            output = merged.len(),
            "merged duplicate clusters"
        );
        merged
    }

    pub fn compute_stats(&self, original: &[JobPosting], deduplicated: &[JobPosting]) -> DedupStats {
        let original_count = original.len();
        let unique_count = deduplicated.len();
        let duplicates_removed = original_count.saturating_sub(unique_count);
        let deduplication_rate_percent = if original_count == 0 {
            0.0
        } else {
            (duplicates_removed as f64 * 100.0) / original_count as f64
        };

        let mut platform_distribution: BTreeMap<Platform, usize> = BTreeMap::new();
        for job in deduplicated {
            *platform_distribution.entry(job.source).or_default() += 1;
        }

        DedupStats {
            original_count,
            unique_count,
            duplicates_removed,
            duplicate_group_count: self.cluster_indices(original).len(),
            deduplication_rate_percent,
            platform_distribution,
        }
    }
}

/// Highest-scoring member wins; ties keep the earliest.
fn best_scoring<'a>(members: impl IntoIterator<Item = &'a JobPosting>) -> Option<&'a JobPosting> {
    members.into_iter().fold(None, |best, job| match best {
        Some(current) if job.match_score <= current.match_score => Some(current),
        Some(current) if job.match_score.is_nan() => Some(current),
        _ => Some(job),
    })
}

fn collapse_group(group: Vec<JobPosting>) -> Option<JobPosting> {
    if group.len() == 1 {
        return group.into_iter().next();
    }
    let platforms: BTreeSet<Platform> = group.iter().map(|job| job.source).collect();
    let mut representative = best_scoring(&group)?.clone();
    representative.available_platforms = platforms;
    Some(representative)
}

fn merge_cluster(members: &[&JobPosting], now: DateTime<Utc>) -> JobPosting {
    let base = best_scoring(members.iter().copied()).unwrap_or(members[0]);
    let mut canonical = base.clone();

    canonical.available_platforms = members.iter().map(|job| job.source).collect();

    if let Some(latest) = most_recent_date(members, now) {
        canonical.posted_date = latest.to_string();
    }

    let mut seen = HashSet::new();
    canonical.requirements = std::iter::once(base)
        .chain(members.iter().copied())
        .flat_map(|job| job.requirements.iter())
        .filter(|req| seen.insert(req.as_str()))
        .cloned()
        .collect();

    canonical.salary = members
        .iter()
        .find_map(|job| job.salary_text())
        .map(str::to_string)
        .or_else(|| base.salary.clone());

    canonical
}

/// Raw date string of the most recent member. Unparseable strings compete as `now`;
/// blank strings do not compete at all.
fn most_recent_date<'a>(members: &[&'a JobPosting], now: DateTime<Utc>) -> Option<&'a str> {
    let mut latest: Option<(DateTime<Utc>, &'a str)> = None;
    for &job in members {
        let raw = job.posted_date.trim();
        if raw.is_empty() {
            continue;
        }
        let when = job.posted_at().unwrap_or_else(|| {
            debug!(job = %job.id, posted_date = raw, "unparseable posted date treated as now");
            now
        });
        if latest.map_or(true, |(best, _)| when > best) {
            latest = Some((when, job.posted_date.as_str()));
        }
    }
    latest.map(|(_, raw)| raw)
}
