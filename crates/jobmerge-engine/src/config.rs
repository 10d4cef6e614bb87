//! Threshold configuration for the dedup engine.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub const ENV_DEFAULT_THRESHOLD: &str = "JOBMERGE_DEFAULT_THRESHOLD";
pub const ENV_STRICT_THRESHOLD: &str = "JOBMERGE_STRICT_THRESHOLD";
pub const ENV_LOCATION_THRESHOLD: &str = "JOBMERGE_LOCATION_THRESHOLD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing dedup config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{name} must be a number, got `{value}`")]
    NotANumber { name: &'static str, value: String },
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },
}

/// Similarity thresholds used by the duplicate predicate.
///
/// `default_threshold` applies to clustering and merging, `strict_threshold` to the fuzzy
/// pass of plain deduplication. Both gate title and company; location always uses
/// `location_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub default_threshold: f64,
    pub strict_threshold: f64,
    pub location_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.8,
            strict_threshold: 0.85,
            location_threshold: 0.6,
        }
    }
}

impl DedupConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DedupConfig = serde_yaml::from_str(text)?;
        config.validate()
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overridden by any `JOBMERGE_*_THRESHOLD` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let slots = [
            (ENV_DEFAULT_THRESHOLD, &mut self.default_threshold),
            (ENV_STRICT_THRESHOLD, &mut self.strict_threshold),
            (ENV_LOCATION_THRESHOLD, &mut self.location_threshold),
        ];
        for (name, slot) in slots {
            if let Some(raw) = lookup(name) {
                *slot = raw.trim().parse().map_err(|_| ConfigError::NotANumber {
                    name,
                    value: raw.clone(),
                })?;
            }
        }
        self.validate()
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        for (name, value) in [
            ("default_threshold", self.default_threshold),
            ("strict_threshold", self.strict_threshold),
            ("location_threshold", self.location_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_keep_the_two_title_thresholds_distinct() {
        let config = DedupConfig::default();
        assert_eq!(config.default_threshold, 0.8);
        assert_eq!(config.strict_threshold, 0.85);
        assert_eq!(config.location_threshold, 0.6);
    }

    #[test]
    fn yaml_fields_are_optional() {
        let config = DedupConfig::from_yaml_str("strict_threshold: 0.9\n").unwrap();
        assert_eq!(config.strict_threshold, 0.9);
        assert_eq!(config.default_threshold, 0.8);
    }

    #[test]
    fn yaml_rejects_out_of_range_threshold() {
        let err = DedupConfig::from_yaml_str("location_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "location_threshold", .. }));
    }

    #[test]
    fn yaml_file_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dedup.yaml");
        std::fs::write(&path, "default_threshold: 0.75\nlocation_threshold: 0.5\n").unwrap();
        let config = DedupConfig::from_yaml_path(&path).unwrap();
        assert_eq!(config.default_threshold, 0.75);
        assert_eq!(config.location_threshold, 0.5);

        let missing = DedupConfig::from_yaml_path(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn overrides_parse_and_validate() {
        let vars = HashMap::from([
            (ENV_STRICT_THRESHOLD, "0.9".to_string()),
            (ENV_LOCATION_THRESHOLD, " 0.55 ".to_string()),
        ]);
        let config = DedupConfig::default()
            .with_overrides(|name| vars.get(name).cloned())
            .unwrap();
        assert_eq!(config.strict_threshold, 0.9);
        assert_eq!(config.location_threshold, 0.55);
        assert_eq!(config.default_threshold, 0.8);

        let bad = DedupConfig::default()
            .with_overrides(|name| (name == ENV_DEFAULT_THRESHOLD).then(|| "high".to_string()))
            .unwrap_err();
        assert!(matches!(bad, ConfigError::NotANumber { .. }));
    }
}
