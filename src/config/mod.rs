//! Configuration module for rollcall.
//!
//! Jobs are configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax, or entirely from the
//! environment with [`RollcallConfig::from_env`].
//!
//! # Example
//!
//! ```toml
//! [store]
//! type = "dynamodb"
//! table_name = "${DYNAMODB_TABLE_NAME}"
//! region = "us-east-1"
//!
//! [reconcile]
//! roster = "${SLACK_USER_IDS}"
//!
//! [retention]
//! days = 90
//! ```

mod observability;
mod reconcile;
mod retention;
mod scan;
mod store;

use std::path::{Path, PathBuf};

use chrono::Duration;
pub use observability::*;
pub use reconcile::*;
pub use retention::*;
pub use scan::*;
use serde::{Deserialize, Serialize};
pub use store::*;

use crate::models::{AttendanceStatus, Roster};

/// Environment variables read by [`RollcallConfig::from_env`].
pub mod env {
    pub const TABLE_NAME: &str = "DYNAMODB_TABLE_NAME";
    pub const REGION: &str = "AWS_REGION";
    pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    pub const ENDPOINT_URL: &str = "DYNAMODB_ENDPOINT_URL";
    pub const STORE_DIR: &str = "ROLLCALL_STORE_DIR";
    pub const ROSTER: &str = "SLACK_USER_IDS";
    pub const RETENTION_DAYS: &str = "RETENTION_DAYS";
    pub const DEFAULT_STATUS: &str = "DEFAULT_STATUS";
    pub const CUTOFF_HOUR: &str = "ABSENCE_CUTOFF_HOUR";
}

/// Root configuration.
///
/// Only `[store]` is required. Job-specific settings are checked by
/// [`require_roster`](Self::require_roster) and
/// [`require_retention`](Self::require_retention) before a job touches the
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollcallConfig {
    /// Record store backend.
    pub store: StoreConfig,

    /// Daily reconciliation settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Retention purge settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Full-scan settings shared by both jobs.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RollcallConfig {
    /// A configuration with defaults for every optional section.
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            reconcile: ReconcileConfig::default(),
            retention: RetentionConfig::default(),
            scan: ScanConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: RollcallConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from environment variables alone.
    ///
    /// `ROLLCALL_STORE_DIR` selects the file store; otherwise
    /// `DYNAMODB_TABLE_NAME` and `AWS_REGION` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = match env_var(env::STORE_DIR) {
            Some(dir) => StoreConfig::File(FileStoreConfig {
                path: PathBuf::from(dir),
                page_size: store::default_page_size(),
            }),
            None => StoreConfig::Dynamodb(DynamoDbStoreConfig {
                table_name: require_env(env::TABLE_NAME)?,
                region: require_env(env::REGION)?,
                endpoint_url: env_var(env::ENDPOINT_URL),
                access_key_id: env_var(env::ACCESS_KEY_ID),
                secret_access_key: env_var(env::SECRET_ACCESS_KEY),
                page_limit: None,
            }),
        };

        let mut config = Self::new(store);

        if let Some(roster) = env_var(env::ROSTER) {
            config.reconcile.roster = Roster::parse(&roster);
        }
        if let Some(status) = env_var(env::DEFAULT_STATUS) {
            config.reconcile.default_status =
                status.parse::<AttendanceStatus>().map_err(|e| {
                    ConfigError::Validation(format!("{}: {e}", env::DEFAULT_STATUS))
                })?;
        }
        if let Some(hour) = env_var(env::CUTOFF_HOUR) {
            config.reconcile.cutoff_hour = parse_env_number(env::CUTOFF_HOUR, &hour)?;
        }
        if let Some(days) = env_var(env::RETENTION_DAYS) {
            config.retention.days = Some(parse_env_number(env::RETENTION_DAYS, &days)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.reconcile.validate()?;
        self.retention.validate()?;
        self.scan.validate()?;
        Ok(())
    }

    /// The roster, or an error if none is configured.
    pub fn require_roster(&self) -> Result<&Roster, ConfigError> {
        if self.reconcile.roster.is_empty() {
            return Err(ConfigError::Validation(format!(
                "reconcile.roster is not configured (or set {})",
                env::ROSTER
            )));
        }
        Ok(&self.reconcile.roster)
    }

    /// The retention window, or an error if none is configured.
    pub fn require_retention(&self) -> Result<Duration, ConfigError> {
        self.retention.validate()?;
        self.retention.window().ok_or_else(|| {
            ConfigError::Validation(format!(
                "retention.days is not configured (or set {})",
                env::RETENTION_DAYS
            ))
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Read an environment variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    env_var(name).ok_or_else(|| ConfigError::EnvVarNotFound(name.to_string()))
}

fn parse_env_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::Validation(format!(
            "{name} must be a non-negative integer, got {value:?}"
        ))
    })
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = name.as_str();
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
