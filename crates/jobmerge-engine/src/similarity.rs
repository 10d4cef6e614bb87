//! Pairwise text similarity and exact-match fingerprints.

use jobmerge_core::JobPosting;
use sha2::{Digest, Sha256};

use crate::normalize::normalize;

/// Levenshtein distance over Unicode scalar values.
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Similarity in `[0, 1]` between the normalized forms of `a` and `b`.
///
/// Identical normalized forms score 1.0; an empty side scores 0.0 against anything else.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    1.0 - edit_distance(&a, &b) as f64 / longest as f64
}

/// Joined normalized `title-company-location` triple that the fingerprint hashes.
pub fn fingerprint_key(title: &str, company: &str, location: &str) -> String {
    format!("{}-{}-{}", normalize(title), normalize(company), normalize(location))
}

/// Exact-match grouping key for a posting: hex SHA-256 of its normalized triple.
pub fn fingerprint(job: &JobPosting) -> String {
    let key = fingerprint_key(&job.title, &job.company, &job.location);
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmerge_core::Platform;

    #[test]
    fn edit_distance_counts_code_points() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("zürich", "zurich"), 1);
        assert_eq!(edit_distance("東京", "京都"), 2);
    }

    #[test]
    fn identical_and_empty_edges() {
        assert_eq!(similarity("Rust Engineer", "rust engineer!"), 1.0);
        assert_eq!(similarity("", "x"), 0.0);
        assert_eq!(similarity("x", ""), 0.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("Inc", "x"), 0.0);
    }

    #[test]
    fn bounded_and_symmetric() {
        let pairs = [
            ("Backend Engineer", "Frontend Engineer"),
            ("New York, NY", "New York"),
            ("NYC", "New York City"),
            ("a", "completely different"),
        ];
        for (a, b) in pairs {
            let ab = similarity(a, b);
            let ba = similarity(b, a);
            assert_eq!(ab, ba, "{a:?} vs {b:?}");
            assert!((0.0..=1.0).contains(&ab));
            assert!(ab < 1.0);
        }
    }

    #[test]
    fn scores_follow_normalized_edit_distance() {
        // "backend engineer" -> "frontend engineer": 5 edits over 17 chars.
        let score = similarity("Backend Engineer", "Frontend Engineer");
        assert!((score - (1.0 - 5.0 / 17.0)).abs() < 1e-12);
        assert!(similarity("New York, NY", "New York") >= 0.6);
        assert!(similarity("NYC", "New York City") < 0.6);
    }

    #[test]
    fn fingerprint_ignores_formatting_noise() {
        let a = JobPosting::new("1", "Senior Developer", "Acme Inc.", "Remote", Platform::Indeed);
        let b = JobPosting::new("2", "senior  developer", "ACME", "remote!", Platform::LinkedIn);
        let c = JobPosting::new("3", "Senior Developer", "Acme", "Berlin", Platform::Indeed);

        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
        assert_eq!(fingerprint(&a).len(), 64);
        assert!(fingerprint(&a).chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn fingerprint_key_keeps_fields_apart() {
        assert_eq!(fingerprint_key("Dev", "Acme Corp", "NYC"), "dev-acme-nyc");
        assert_ne!(fingerprint_key("a b", "c", ""), fingerprint_key("a", "b c", ""));
    }
}
