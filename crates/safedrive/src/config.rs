//! Configuration management for safedrive.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::client::RetryPolicy;
use crate::detection::Thresholds;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "safedrive";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "telemetry.db";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://safedrive-backend-4h5k.onrender.com";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SAFEDRIVE_`, sections split on `__`)
/// 2. TOML config file at `~/.config/safedrive/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API configuration.
    pub api: ApiConfig,
    /// Local storage configuration.
    pub storage: StorageConfig,
    /// Danger and accident thresholds.
    pub detection: DetectionConfig,
    /// Report output configuration.
    pub report: ReportConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the telemetry API.
    pub base_url: String,
    /// Per-attempt timeout for report fetches in milliseconds.
    pub timeout_ms: u64,
    /// Extra attempts after a failed report fetch.
    pub retries: u32,
    /// Per-attempt timeout for polling fetches in milliseconds.
    pub poll_timeout_ms: u64,
    /// Interval between latest-reading polls in milliseconds.
    pub sensor_poll_interval_ms: u64,
    /// Interval between accident-list polls in milliseconds.
    pub accident_poll_interval_ms: u64,
    /// Serve demo data when the health check fails.
    pub demo_fallback: bool,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/safedrive/telemetry.db`
    pub database_path: Option<PathBuf>,
    /// Maximum number of readings to retain.
    /// Set to 0 for unlimited.
    pub max_readings: usize,
    /// Maximum age of readings to retain in days.
    /// Set to 0 for unlimited.
    pub max_age_days: u32,
}

/// Threshold configuration for danger assessment and accident detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Alcohol level above which the driver is over the limit.
    pub alcohol_limit: f64,
    /// Obstacle distance below which the vehicle is too close.
    pub min_distance: f64,
    /// Vibration above which the ride is flagged.
    pub max_vibration: f64,
    /// Impact above which the reading is hazardous.
    pub max_impact: f64,
    /// Impact at which an accident is raised.
    pub impact_low: f64,
    /// Impact at which an accident is severe.
    pub impact_high: f64,
    /// Minimum seconds between two accident events.
    pub accident_cooldown_secs: u64,
}

/// Report output configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory evidence packages are written to.
    /// Defaults to the current directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 10_000,
            retries: 2,
            poll_timeout_ms: 5_000,
            sensor_poll_interval_ms: 2_000,
            accident_poll_interval_ms: 3_000,
            demo_fallback: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            max_readings: 500_000,
            max_age_days: 90,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            alcohol_limit: t.alcohol_limit,
            min_distance: t.min_distance,
            max_vibration: t.max_vibration,
            max_impact: t.max_impact,
            impact_low: t.impact_low,
            impact_high: t.impact_high,
            accident_cooldown_secs: t.accident_cooldown.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SAFEDRIVE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(Error::ConfigValidation {
                message: "api.base_url must not be empty".to_string(),
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::ConfigValidation {
                message: format!("api.base_url must be an http(s) URL: {base_url}"),
            });
        }

        for (name, value) in [
            ("timeout_ms", self.api.timeout_ms),
            ("poll_timeout_ms", self.api.poll_timeout_ms),
            ("sensor_poll_interval_ms", self.api.sensor_poll_interval_ms),
            ("accident_poll_interval_ms", self.api.accident_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        let d = &self.detection;
        if d.impact_low > d.impact_high {
            return Err(Error::ConfigValidation {
                message: format!(
                    "impact_low ({}) cannot be greater than impact_high ({})",
                    d.impact_low, d.impact_high
                ),
            });
        }
        if d.alcohol_limit < 0.0 || d.min_distance < 0.0 || d.max_vibration < 0.0 {
            return Err(Error::ConfigValidation {
                message: "detection thresholds must not be negative".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the report output directory, resolving defaults if not set.
    #[must_use]
    pub fn report_dir(&self) -> PathBuf {
        self.report
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the max age as a Duration.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        if self.storage.max_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.storage.max_age_days) * 24 * 60 * 60,
            ))
        }
    }

    /// Get the reading count limit, `None` when unlimited.
    #[must_use]
    pub fn max_readings(&self) -> Option<usize> {
        (self.storage.max_readings > 0).then_some(self.storage.max_readings)
    }

    /// Retry policy for one-off report fetches.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.api.timeout_ms),
            retries: self.api.retries,
        }
    }

    /// Retry policy for polling fetches; the next tick is the retry.
    #[must_use]
    pub fn poll_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.api.poll_timeout_ms),
            retries: 0,
        }
    }

    /// Interval between latest-reading polls.
    #[must_use]
    pub fn sensor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.api.sensor_poll_interval_ms)
    }

    /// Interval between accident-list polls.
    #[must_use]
    pub fn accident_poll_interval(&self) -> Duration {
        Duration::from_millis(self.api.accident_poll_interval_ms)
    }

    /// Detection thresholds as used by the detector.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        let d = &self.detection;
        Thresholds {
            alcohol_limit: d.alcohol_limit,
            min_distance: d.min_distance,
            max_vibration: d.max_vibration,
            max_impact: d.max_impact,
            impact_low: d.impact_low,
            impact_high: d.impact_high,
            accident_cooldown: Duration::from_secs(d.accident_cooldown_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_api_config() {
        let api = ApiConfig::default();

        assert_eq!(api.base_url, DEFAULT_BASE_URL);
        assert_eq!(api.timeout_ms, 10_000);
        assert_eq!(api.retries, 2);
        assert_eq!(api.sensor_poll_interval_ms, 2_000);
        assert_eq!(api.accident_poll_interval_ms, 3_000);
        assert!(api.demo_fallback);
    }

    #[test]
    fn test_default_storage_config() {
        let storage = StorageConfig::default();

        assert!(storage.database_path.is_none());
        assert_eq!(storage.max_readings, 500_000);
        assert_eq!(storage.max_age_days, 90);
    }

    #[test]
    fn test_default_detection_matches_thresholds() {
        let config = Config::default();
        assert_eq!(config.thresholds(), Thresholds::default());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_base_url() {
        let mut config = Config::default();
        config.api.base_url = "  ".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("base_url"));
    }

    #[test]
    fn test_validate_non_http_base_url() {
        let mut config = Config::default();
        config.api.base_url = "ftp://example.com".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("http(s)"));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.api.sensor_poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sensor_poll_interval_ms"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.api.timeout_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_ms"));
    }

    #[test]
    fn test_validate_inverted_impact_thresholds() {
        let mut config = Config::default();
        config.detection.impact_low = 8.0;
        config.detection.impact_high = 4.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("impact_low"));
    }

    #[test]
    fn test_validate_negative_threshold() {
        let mut config = Config::default();
        config.detection.min_distance = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("telemetry.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_report_dir_default() {
        assert_eq!(Config::default().report_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_max_age() {
        let mut config = Config::default();
        assert_eq!(
            config.max_age(),
            Some(Duration::from_secs(90 * 24 * 60 * 60))
        );

        config.storage.max_age_days = 0;
        assert!(config.max_age().is_none());
    }

    #[test]
    fn test_max_readings() {
        let mut config = Config::default();
        assert_eq!(config.max_readings(), Some(500_000));

        config.storage.max_readings = 0;
        assert!(config.max_readings().is_none());
    }

    #[test]
    fn test_policies() {
        let config = Config::default();

        let report = config.retry_policy();
        assert_eq!(report.timeout, Duration::from_secs(10));
        assert_eq!(report.retries, 2);

        let poll = config.poll_policy();
        assert_eq!(poll.timeout, Duration::from_secs(5));
        assert_eq!(poll.retries, 0);
    }

    #[test]
    fn test_poll_intervals() {
        let config = Config::default();
        assert_eq!(config.sensor_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.accident_poll_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("safedrive"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "safedrive_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[api]\nbase_url = \"http://localhost:5000\"\nretries = 4\n\n[detection]\nimpact_high = 8.0\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:5000");
        assert_eq!(config.api.retries, 4);
        assert!((config.detection.impact_high - 8.0).abs() < f64::EPSILON);
        assert_eq!(config.api.timeout_ms, 10_000);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join(format!(
            "safedrive_config_invalid_{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[api]\nbase_url = \"\"\n").unwrap();

        let result = Config::load_from(Some(path.clone()));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("base_url"));
        assert!(json.contains("impact_high"));
    }
}
