//! Configuration management for the rota engine
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every section has defaults, so a file only
//! needs to name the values it overrides.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Horizons and windows used by the periodic jobs
    pub scheduling: SchedulingConfig,

    /// Fairness score weights
    pub fairness: FairnessConfig,

    /// Periodic job timing
    pub jobs: JobsConfig,

    /// Empty-slot notification delivery
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/oncall.db"),
        }
    }
}

/// Scheduling horizons
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Days ahead covered by the daily generation job (today included)
    pub generation_days_ahead: i64,

    /// First day of the post-membership-change recalculation, relative to today
    pub recalculation_start_offset_days: i64,

    /// Length of the recalculation window after its start day, in days
    pub recalculation_days: i64,

    /// How far ahead the coverage monitor looks
    pub coverage_window_hours: i64,

    /// How far back revalidation starts
    pub revalidation_days_back: i64,

    /// Unassigned slots older than this are deleted by the daily job
    pub cleanup_after_days: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            generation_days_ahead: 7,
            recalculation_start_offset_days: 1,
            recalculation_days: 6,
            coverage_window_hours: 72,
            revalidation_days_back: 7,
            cleanup_after_days: 30,
        }
    }
}

/// Weights of the fairness score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessConfig {
    /// Weight of assignments in the 7 days before the slot date
    pub recent_weight: f64,

    /// Weight of assignments from 30 days before the slot date onward
    pub monthly_weight: f64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            recent_weight: 3.0,
            monthly_weight: 0.5,
        }
    }
}

/// Periodic job timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Local wall-clock time of the daily generation job (HH:MM)
    pub generation_time: String,

    /// Interval of the coverage scan in seconds
    pub coverage_scan_interval_secs: u64,

    /// Interval of the assignment revalidation in seconds
    pub revalidation_interval_secs: u64,

    /// Run every job once when the daemon starts
    pub run_on_startup: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            generation_time: String::from("02:00"),
            coverage_scan_interval_secs: 60,
            revalidation_interval_secs: 3600,
            run_on_startup: true,
        }
    }
}

/// Empty-slot notification delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// How long a pending notification is kept, and its dedup window
    pub ttl_hours: i64,

    /// Delivery attempts after the first failure
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay_secs: u64,

    /// Upper bound on the retry delay
    pub max_delay_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            max_retries: 3,
            base_delay_secs: 60,
            max_delay_secs: 600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let sqlite_path = std::env::var("ONCALL_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database.sqlite_path);

        let generation_time = std::env::var("ONCALL_GENERATION_TIME")
            .unwrap_or(defaults.jobs.generation_time);

        let log_level =
            std::env::var("ONCALL_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("ONCALL_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        let s = defaults.scheduling;
        let n = defaults.notifications;

        Ok(Self {
            database: DatabaseConfig { sqlite_path },
            scheduling: SchedulingConfig {
                generation_days_ahead: env_or("ONCALL_GENERATION_DAYS", s.generation_days_ahead),
                coverage_window_hours: env_or(
                    "ONCALL_COVERAGE_WINDOW_HOURS",
                    s.coverage_window_hours,
                ),
                cleanup_after_days: env_or("ONCALL_CLEANUP_AFTER_DAYS", s.cleanup_after_days),
                ..s
            },
            fairness: defaults.fairness,
            jobs: JobsConfig {
                generation_time,
                coverage_scan_interval_secs: env_or(
                    "ONCALL_COVERAGE_SCAN_INTERVAL",
                    defaults.jobs.coverage_scan_interval_secs,
                ),
                revalidation_interval_secs: env_or(
                    "ONCALL_REVALIDATION_INTERVAL",
                    defaults.jobs.revalidation_interval_secs,
                ),
                run_on_startup: env_or("ONCALL_RUN_ON_STARTUP", defaults.jobs.run_on_startup),
            },
            notifications: NotificationConfig {
                ttl_hours: env_or("ONCALL_NOTIFICATION_TTL_HOURS", n.ttl_hours),
                max_retries: env_or("ONCALL_NOTIFICATION_RETRIES", n.max_retries),
                ..n
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduling;
        if s.generation_days_ahead <= 0 {
            anyhow::bail!("generation_days_ahead must be greater than 0");
        }
        if s.recalculation_start_offset_days < 0 {
            anyhow::bail!("recalculation_start_offset_days cannot be negative");
        }
        if s.recalculation_days <= 0 {
            anyhow::bail!("recalculation_days must be greater than 0");
        }
        if s.coverage_window_hours <= 0 {
            anyhow::bail!("coverage_window_hours must be greater than 0");
        }
        if s.revalidation_days_back < 0 {
            anyhow::bail!("revalidation_days_back cannot be negative");
        }
        if s.cleanup_after_days <= 0 {
            anyhow::bail!("cleanup_after_days must be greater than 0");
        }

        if self.fairness.recent_weight < 0.0 || self.fairness.monthly_weight < 0.0 {
            anyhow::bail!("fairness weights cannot be negative");
        }

        self.generation_time()?;
        if self.jobs.coverage_scan_interval_secs == 0 {
            anyhow::bail!("coverage_scan_interval_secs must be greater than 0");
        }
        if self.jobs.revalidation_interval_secs == 0 {
            anyhow::bail!("revalidation_interval_secs must be greater than 0");
        }

        if self.notifications.ttl_hours <= 0 {
            anyhow::bail!("notification ttl_hours must be greater than 0");
        }
        if self.notifications.base_delay_secs > self.notifications.max_delay_secs {
            anyhow::bail!("notification base_delay_secs cannot exceed max_delay_secs");
        }

        Ok(())
    }

    /// Parsed daily generation time
    pub fn generation_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.jobs.generation_time, "%H:%M").with_context(|| {
            format!(
                "generation_time must be HH:MM, got '{}'",
                self.jobs.generation_time
            )
        })
    }

    #[must_use]
    pub fn coverage_scan_interval(&self) -> Duration {
        Duration::from_secs(self.jobs.coverage_scan_interval_secs)
    }

    #[must_use]
    pub fn revalidation_interval(&self) -> Duration {
        Duration::from_secs(self.jobs.revalidation_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduling.generation_days_ahead, 7);
        assert_eq!(config.notifications.ttl_hours, 24);
    }

    #[test]
    fn test_invalid_generation_time() {
        let mut config = Config::default();
        config.jobs.generation_time = "2am".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generation_time_parse() {
        let config = Config::default();
        assert_eq!(
            config.generation_time().unwrap(),
            NaiveTime::from_hms_opt(2, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_windows() {
        let mut config = Config::default();
        config.scheduling.coverage_window_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.notifications.base_delay_secs = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_recalculation_window() {
        let mut config = Config::default();
        config.scheduling.recalculation_days = 0;
        assert!(config.validate().is_err());

        config.scheduling.recalculation_days = 1;
        config.scheduling.recalculation_start_offset_days = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_conversion() {
        let config = Config::default();
        assert_eq!(config.coverage_scan_interval(), Duration::from_secs(60));
        assert_eq!(config.revalidation_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scheduling]\ngeneration_days_ahead = 14\n\n[fairness]\nrecent_weight = 5.0"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.scheduling.generation_days_ahead, 14);
        assert_eq!(config.scheduling.coverage_window_hours, 72);
        assert_eq!(config.fairness.recent_weight, 5.0);
        assert_eq!(config.fairness.monthly_weight, 0.5);
        assert_eq!(config.jobs.generation_time, "02:00");
    }
}
