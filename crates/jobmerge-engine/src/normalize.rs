//! Text canonicalization applied before any comparison.

/// Legal-entity tokens dropped when they stand as whole words.
const LEGAL_SUFFIXES: [&str; 7] = ["inc", "llc", "ltd", "corp", "corporation", "company", "co"];

/// Canonical comparable form of a free-text field.
///
/// Lower-cases, keeps only alphanumerics and whitespace, collapses whitespace and drops
/// legal-entity suffix words. Suffixes are matched after punctuation is gone, so `Corp.`
/// and `Corp` normalize identically.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .filter(|token| !LEGAL_SUFFIXES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}
