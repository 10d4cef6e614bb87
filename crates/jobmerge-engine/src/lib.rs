//! Deduplication and merge engine for scraped job postings.
//!
//! Three layers, leaves first: [`normalize`] canonicalizes free text, [`similarity`] and
//! [`fingerprint`] compare it, and [`DedupEngine`] groups, filters and merges postings.
//! Everything here is synchronous and pure over its input.

pub mod config;
pub mod dedup;
pub mod normalize;
pub mod similarity;

pub use config::{ConfigError, DedupConfig};
pub use dedup::DedupEngine;
pub use normalize::normalize;
pub use similarity::{edit_distance, fingerprint, fingerprint_key, similarity};

pub const CRATE_NAME: &str = "jobmerge-engine";
