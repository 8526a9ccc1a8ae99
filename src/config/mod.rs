//! Configuration for the maintenance job.
//!
//! The job is configured via a single TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax. Interpolation happens once
//! at load time; nothing downstream reads the process environment.
//!
//! # Example
//!
//! ```toml
//! [store]
//! type = "redis"
//! url = "redis://:${REDIS_PASSWORD}@localhost:6379"
//!
//! [retention.periods]
//! transcripts_days = 30
//!
//! [reporting.github]
//! token = "${GITHUB_TOKEN}"
//! repo = "talkflow/talkflow"
//! ```

mod database;
mod health;
mod observability;
mod reporting;
mod retention;
mod rotation;
mod store;

use std::{path::Path, time::Duration};

pub use database::*;
pub use health::*;
pub use observability::*;
pub use reporting::*;
pub use retention::*;
pub use rotation::*;
use serde::{Deserialize, Serialize};
pub use store::*;

/// Root configuration for one maintenance run.
///
/// Every section is optional; an empty file sweeps a local Redis with the
/// default retention table and reports nowhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JanitorConfig {
    /// Key-value store holding the ephemeral records.
    #[serde(default)]
    pub store: StoreConfig,

    /// Persistent store probed for the health snapshot.
    /// If omitted, the database section of the snapshot is absent.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Retention periods and sweep safety settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Run-level limits.
    #[serde(default)]
    pub run: RunConfig,

    /// Health snapshot probes.
    #[serde(default)]
    pub health: HealthConfig,

    /// Weekly key rotation.
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Report delivery (issue tracker and email).
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl JanitorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        // Detect backends that aren't compiled in before typed deserialization,
        // so the user gets a feature hint instead of an "unknown variant" error.
        let raw: toml::Value = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        check_disabled_features(&raw)?;

        let config: JanitorConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.database.validate()?;
        self.retention.validate()?;
        self.health.validate()?;
        self.rotation.validate()?;
        self.reporting.validate()?;
        Ok(())
    }
}

/// Run-level limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Wall-clock budget for the sweep stage, in seconds.
    /// When it elapses, in-flight key operations finish but no new ones start
    /// and the report is flagged as truncated. Set to 0 for no deadline.
    ///
    /// Only the sweep is cut short. The health snapshot and report delivery
    /// still run afterwards, bounded by `health.probe_timeout_secs` and
    /// `reporting.timeout_secs`.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Timeout for the initial store reachability check, in seconds.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

impl RunConfig {
    /// The sweep deadline, or `None` if unbounded.
    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs.max(1))
    }
}

fn default_deadline_secs() -> u64 {
    900 // 15 minutes
}

fn default_ping_timeout_secs() -> u64 {
    5
}

pub(crate) fn default_true() -> bool {
    true
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Check for feature-gated configuration values before typed deserialization.
fn check_disabled_features(raw: &toml::Value) -> Result<(), ConfigError> {
    let mut issues: Vec<(String, &str)> = Vec::new();

    if let Some(type_val) = raw
        .get("store")
        .and_then(|v| v.get("type"))
        .and_then(|v| v.as_str())
    {
        check_store_feature(type_val, &mut issues);
    }

    if let Some(type_val) = raw
        .get("database")
        .and_then(|v| v.get("type"))
        .and_then(|v| v.as_str())
    {
        check_database_feature(type_val, &mut issues);
    }

    if issues.is_empty() {
        return Ok(());
    }

    let details = issues
        .iter()
        .map(|(msg, _)| msg.as_str())
        .collect::<Vec<_>>()
        .join("\n  - ");
    let features = issues
        .iter()
        .map(|(_, feat)| *feat)
        .collect::<Vec<_>>()
        .join(",");

    Err(ConfigError::Validation(format!(
        "Configuration requires features not compiled in this build:\n  \
         - {details}\n\n\
         Rebuild with: cargo build --features {features}\n\
         Or use the 'full' profile: cargo build --features full"
    )))
}

fn check_store_feature(type_val: &str, _issues: &mut Vec<(String, &str)>) {
    match type_val {
        #[cfg(not(feature = "redis"))]
        "redis" => _issues.push((
            "store type 'redis' requires the 'redis' feature".into(),
            "redis",
        )),
        _ => {}
    }
}

fn check_database_feature(type_val: &str, _issues: &mut Vec<(String, &str)>) {
    match type_val {
        #[cfg(not(feature = "database-postgres"))]
        "postgres" => _issues.push((
            "database type 'postgres' requires the 'database-postgres' feature".into(),
            "database-postgres",
        )),
        _ => {}
    }
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid interpolation pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
