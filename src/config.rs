use crate::constants::{DEFAULT_COMPLEXITY_BUCKETS, DEFAULT_LIMITER_CAPACITY};
use crate::error::{Result, TelemetryError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level configuration file layout.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Feature switches and sizing for the telemetry observer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Master switch; when off the GraphQL extension is not installed.
    pub enabled: bool,
    pub resolver_timing: bool,
    pub query_signature: bool,
    pub query_complexity: bool,
    pub outcome_tags: bool,
    pub data_loader_timing: bool,
    /// Distinct values admitted per limited tag key.
    pub limiter_capacity: usize,
    /// Ascending complexity thresholds.
    pub complexity_buckets: Vec<u32>,
    pub signature_cache_max_entries: Option<usize>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolver_timing: true,
            query_signature: true,
            query_complexity: true,
            outcome_tags: true,
            data_loader_timing: true,
            limiter_capacity: DEFAULT_LIMITER_CAPACITY,
            complexity_buckets: DEFAULT_COMPLEXITY_BUCKETS.to_vec(),
            signature_cache_max_entries: None,
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.limiter_capacity == 0 {
            return Err(TelemetryError::Config(
                "limiter_capacity must be greater than zero".to_string(),
            ));
        }
        if self.complexity_buckets.is_empty() {
            return Err(TelemetryError::Config(
                "complexity_buckets must not be empty".to_string(),
            ));
        }
        if self.complexity_buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TelemetryError::Config(format!(
                "complexity_buckets must be strictly ascending: {:?}",
                self.complexity_buckets
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.telemetry.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_table_missing() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.telemetry, TelemetryConfig::default());
        assert_eq!(config.telemetry.limiter_capacity, 100);
    }

    #[test]
    fn test_partial_table_overrides() {
        let config = Config::from_toml_str(
            r#"
            [telemetry]
            resolver_timing = false
            limiter_capacity = 5
            complexity_buckets = [1, 2, 3]
            "#,
        )
        .unwrap();
        assert!(!config.telemetry.resolver_timing);
        assert!(config.telemetry.query_signature);
        assert_eq!(config.telemetry.limiter_capacity, 5);
        assert_eq!(config.telemetry.complexity_buckets, vec![1, 2, 3]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for bad in [
            "[telemetry]\nlimiter_capacity = 0",
            "[telemetry]\ncomplexity_buckets = []",
            "[telemetry]\ncomplexity_buckets = [10, 5]",
        ] {
            assert!(matches!(
                Config::from_toml_str(bad),
                Err(TelemetryError::Config(_))
            ));
        }
        assert!(matches!(
            Config::from_toml_str("[telemetry]\nenabled = \"yes\""),
            Err(TelemetryError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\nquery_complexity = false").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert!(!config.telemetry.query_complexity);

        assert!(matches!(
            Config::load("/definitely/not/here.toml"),
            Err(TelemetryError::Config(_))
        ));
    }
}
