//! Configuration management for minutecount.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{CounterError, Result};

/// Smallest HyperLogLog precision accepted (16 registers).
pub const MIN_PRECISION: u8 = 4;
/// Largest HyperLogLog precision accepted (65536 registers).
pub const MAX_PRECISION: u8 = 16;

/// Main configuration for the minutecount process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinutecountConfig {
    /// Counter engine configuration
    #[serde(default)]
    pub counter: CounterConfig,

    /// Ingest loop configuration
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Construction-time options of the counter engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Number of buckets retained per series
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Width of one bucket in seconds
    #[serde(default = "default_bucket_granularity_secs")]
    pub bucket_granularity_secs: u64,

    /// HyperLogLog precision; the dense sketch holds `2^precision` registers
    #[serde(default = "default_precision")]
    pub precision: u8,

    /// Distinct tokens tracked exactly before a sketch goes dense
    #[serde(default = "default_exact_threshold")]
    pub exact_threshold: usize,

    /// Interval of the background sweep, disabled when unset
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            bucket_granularity_secs: default_bucket_granularity_secs(),
            precision: default_precision(),
            exact_threshold: default_exact_threshold(),
            sweep_interval_secs: None,
        }
    }
}

fn default_window_minutes() -> u32 {
    15
}

fn default_bucket_granularity_secs() -> u64 {
    60
}

fn default_precision() -> u8 {
    12
}

fn default_exact_threshold() -> usize {
    64
}

impl CounterConfig {
    /// Check the options for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window_minutes == 0 {
            return Err(CounterError::Config(
                "window_minutes must be at least 1".to_string(),
            ));
        }
        if self.bucket_granularity_secs == 0 {
            return Err(CounterError::Config(
                "bucket_granularity_secs must be at least 1".to_string(),
            ));
        }
        if i64::try_from(self.bucket_granularity_secs).is_err() {
            return Err(CounterError::Config(format!(
                "bucket_granularity_secs is too large: {}",
                self.bucket_granularity_secs
            )));
        }
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&self.precision) {
            return Err(CounterError::Config(format!(
                "precision must be within {}..={}, got {}",
                MIN_PRECISION, MAX_PRECISION, self.precision
            )));
        }
        if self.sweep_interval_secs == Some(0) {
            return Err(CounterError::Config(
                "sweep_interval_secs must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// The background sweep interval, if enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

/// Ingest loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Seconds between periodic report log lines
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Window, in minutes, used for reports
    #[serde(default)]
    pub report_minutes: Option<i64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
            report_minutes: None,
        }
    }
}

fn default_report_interval() -> u64 {
    30
}

impl IngestConfig {
    /// Check the options for values the ingest loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if let Some(minutes) = self.report_minutes {
            if minutes <= 0 {
                return Err(CounterError::Config(format!(
                    "report_minutes must be positive, got {}",
                    minutes
                )));
            }
        }
        Ok(())
    }
}

impl MinutecountConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.counter.validate()?;
        self.ingest.validate()
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: MinutecountConfig =
            serde_yaml::from_str(yaml).map_err(|e| CounterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration layered from an optional file and the environment.
    ///
    /// Environment variables use the `MINUTECOUNT__` prefix with `__` between
    /// sections, e.g. `MINUTECOUNT__COUNTER__WINDOW_MINUTES=30`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("MINUTECOUNT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: MinutecountConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CounterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MinutecountConfig::default();
        assert_eq!(config.counter.window_minutes, 15);
        assert_eq!(config.counter.bucket_granularity_secs, 60);
        assert_eq!(config.counter.precision, 12);
        assert!(config.counter.sweep_interval().is_none());
        assert!(config.counter.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
counter:
  window_minutes: 5
  sweep_interval_secs: 10
"#;
        let config = MinutecountConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.counter.window_minutes, 5);
        assert_eq!(config.counter.bucket_granularity_secs, 60);
        assert_eq!(config.counter.sweep_interval(), Some(Duration::from_secs(10)));
        assert_eq!(config.ingest.report_interval_secs, 30);
    }

    #[test]
    fn test_from_yaml_rejects_zero_window() {
        let yaml = r#"
counter:
  window_minutes: 0
"#;
        let err = MinutecountConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CounterError::Config(_)));
    }

    #[test]
    fn test_validate_precision_bounds() {
        let mut config = CounterConfig::default();
        config.precision = 3;
        assert!(config.validate().is_err());
        config.precision = 17;
        assert!(config.validate().is_err());
        config.precision = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_granularity() {
        let config = CounterConfig {
            bucket_granularity_secs: u64::MAX,
            ..CounterConfig::default()
        };
        assert!(matches!(config.validate(), Err(CounterError::Config(_))));
    }

    #[test]
    fn test_from_yaml_rejects_non_positive_report_minutes() {
        for minutes in ["0", "-2"] {
            let yaml = format!("ingest:\n  report_minutes: {}\n", minutes);
            let err = MinutecountConfig::from_yaml(&yaml).unwrap_err();
            assert!(matches!(err, CounterError::Config(_)));
        }

        let mut ingest = IngestConfig::default();
        assert!(ingest.validate().is_ok());
        ingest.report_minutes = Some(5);
        assert!(ingest.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("minutecount-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "counter:\n  precision: 10\ningest:\n  report_minutes: 5\n").unwrap();

        let config = MinutecountConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.counter.precision, 10);
        assert_eq!(config.ingest.report_minutes, Some(5));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = MinutecountConfig::load(None).unwrap();
        assert_eq!(config.counter, CounterConfig::default());
    }
}
