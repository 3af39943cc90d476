//! Service configuration for eventshape.
//!
//! One YAML file configures storage, flush scheduling, tracking bounds, the
//! API listener, and logging. Environment references (`${VAR}`) in the raw
//! file are expanded before parsing. The two tracking values that can change
//! at runtime live in [`Tunables`], a shared handle with validating setters.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

pub mod tunables;
pub use tunables::Tunables;

/// A rejected configuration value. The previous value stays in force.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("counter limit must be at least 1, got {0}")]
    InvalidLimit(usize),

    #[error("reporting threshold must be inside (0, 1), got {0}")]
    InvalidThreshold(f64),

    #[error("flatten depth must be at least 1, got {0}")]
    InvalidDepth(usize),

    #[error("{field} must be at least 1 second, got {value}")]
    InvalidDuration { field: &'static str, value: u64 },
}

// ============================================================================
// Config Sections
// ============================================================================

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub tracking: TrackingConfig,
    pub flush: FlushConfig,
    pub log: LogConfig,
}

/// Backing store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Log `EXPLAIN QUERY PLAN` output for each statement before running it.
    #[serde(default)]
    pub log_query_plans: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            log_query_plans: false,
        }
    }
}

/// Shape-tracking bounds. `counter_limit` and `reporting_threshold` seed the
/// runtime [`Tunables`]; `max_depth` is fixed for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Maximum distinct field counters kept per schema hash.
    #[serde(default = "default_counter_limit")]
    pub counter_limit: usize,

    /// Minimum share of observations for a value to be reported.
    #[serde(default = "default_reporting_threshold")]
    pub reporting_threshold: f64,

    /// Maximum payload nesting depth accepted by the flattener.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            counter_limit: default_counter_limit(),
            reporting_threshold: default_reporting_threshold(),
            max_depth: default_max_depth(),
        }
    }
}

/// Flush loop scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Interval between scheduled flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub interval_secs: u64,

    /// Deadline for a single flush attempt against the store.
    #[serde(default = "default_flush_deadline_secs")]
    pub deadline_secs: u64,

    /// Flush early once this many observations are unflushed.
    #[serde(default = "default_pending_threshold")]
    pub pending_threshold: u64,

    /// Attempts per flush cycle before giving the batch back to the next
    /// cycle.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_flush_interval_secs(),
            deadline_secs: default_flush_deadline_secs(),
            pending_threshold: default_pending_threshold(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl FlushConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Logging settings, handed to the o11y initializer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter when `RUST_LOG` is unset, e.g. "info" or
    /// "eventshape=debug".
    pub level: Option<String>,

    /// Emit JSON lines instead of the human format.
    pub json: bool,
}

// Default value functions
fn default_db_path() -> String {
    "./data/eventshape.db".to_string()
}

fn default_counter_limit() -> usize {
    128
}

fn default_reporting_threshold() -> f64 {
    0.01
}

fn default_max_depth() -> usize {
    10
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_flush_deadline_secs() -> u64 {
    10
}

fn default_pending_threshold() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

// ============================================================================
// Validation & Loading
// ============================================================================

impl ServiceConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.tracking.counter_limit == 0 {
            return Err(ConfigError::InvalidLimit(self.tracking.counter_limit));
        }
        let threshold = self.tracking.reporting_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.tracking.max_depth == 0 {
            return Err(ConfigError::InvalidDepth(self.tracking.max_depth));
        }
        if self.flush.interval_secs == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "flush.interval_secs",
                value: self.flush.interval_secs,
            });
        }
        if self.flush.deadline_secs == 0 {
            return Err(ConfigError::InvalidDuration {
                field: "flush.deadline_secs",
                value: self.flush.deadline_secs,
            });
        }
        Ok(())
    }
}

pub fn load_from_path(file_path: &str) -> Result<ServiceConfig> {
    let raw = fs::read_to_string(file_path)
        .with_context(|| format!("reading config {file_path}"))?;
    let with_env = shellexpand::env(&raw)
        .with_context(|| "expanding environment references")?
        .to_string();
    let cfg: ServiceConfig =
        serde_yaml::from_str(&with_env).with_context(|| "parsing yaml")?;
    cfg.validate()
        .with_context(|| format!("validating config {file_path}"))?;

    Ok(cfg)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg: ServiceConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.storage.path, "./data/eventshape.db");
        assert!(!cfg.storage.log_query_plans);
        assert_eq!(cfg.tracking.counter_limit, 128);
        assert_eq!(cfg.tracking.reporting_threshold, 0.01);
        assert_eq!(cfg.tracking.max_depth, 10);
        assert_eq!(cfg.flush.interval_secs, 30);
        assert_eq!(cfg.flush.pending_threshold, 10_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn full_yaml_parses_every_section() {
        let yaml = r#"
storage:
  path: /var/lib/eventshape/db.sqlite
  log_query_plans: true
tracking:
  counter_limit: 16
  reporting_threshold: 0.05
  max_depth: 4
flush:
  interval_secs: 5
  deadline_secs: 2
  pending_threshold: 100
  max_attempts: 1
log:
  level: debug
  json: true
"#;
        let cfg: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.storage.path, "/var/lib/eventshape/db.sqlite");
        assert!(cfg.storage.log_query_plans);
        assert_eq!(cfg.tracking.counter_limit, 16);
        assert_eq!(cfg.tracking.reporting_threshold, 0.05);
        assert_eq!(cfg.flush.interval(), Duration::from_secs(5));
        assert_eq!(cfg.flush.deadline(), Duration::from_secs(2));
        assert_eq!(cfg.flush.max_attempts, 1);
        assert_eq!(cfg.log.level.as_deref(), Some("debug"));
        assert!(cfg.log.json);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let cfg: ServiceConfig =
            serde_yaml::from_str("tracking:\n  counter_limit: 0\n").unwrap();
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidLimit(0)));
    }

    #[test]
    fn threshold_must_be_strictly_inside_unit_interval() {
        for bad in ["0.0", "1.0", "1.5", "-0.2"] {
            let yaml = format!("tracking:\n  reporting_threshold: {bad}\n");
            let cfg: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
            assert!(
                matches!(cfg.validate(), Err(ConfigError::InvalidThreshold(_))),
                "threshold {bad} should be rejected"
            );
        }
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        let cfg: ServiceConfig =
            serde_yaml::from_str("flush:\n  interval_secs: 0\n").unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidDuration {
                field: "flush.interval_secs",
                ..
            })
        ));
    }

    #[test]
    fn load_expands_environment_references() {
        // SAFETY: test-local variable name, nothing else reads it.
        unsafe {
            std::env::set_var("EVENTSHAPE_TEST_DB_DIR", "/tmp/es-test")
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "storage:\n  path: ${{EVENTSHAPE_TEST_DB_DIR}}/events.db"
        )
        .unwrap();

        let cfg = load_from_path(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.storage.path, "/tmp/es-test/events.db");
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tracking:\n  counter_limit: 0").unwrap();

        let err = load_from_path(file.path().to_str().unwrap());
        assert!(err.is_err());
    }
}
