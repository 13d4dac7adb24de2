//! Data retention configuration.
//!
//! Configures purging of attendance records older than a fixed window.
//! There is no default window: purging refuses to run until one is set.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! days = 90
//! dry_run = false
//! max_deletes_per_run = 10000
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days to keep records. Records strictly older than `now - days`
    /// are deleted.
    #[serde(default)]
    pub days: Option<u32>,

    /// If true, count what would be deleted without actually deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum number of records to delete per run.
    /// Set to 0 for unlimited.
    /// Default: 0
    #[serde(default)]
    pub max_deletes_per_run: u64,

    /// Maximum concurrent deletes within a page.
    #[serde(default = "super::reconcile::default_concurrency")]
    pub concurrency: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: None,
            dry_run: false,
            max_deletes_per_run: 0,
            concurrency: super::reconcile::default_concurrency(),
        }
    }
}

impl RetentionConfig {
    /// The configured retention window, if any.
    pub fn window(&self) -> Option<Duration> {
        self.days.map(|days| Duration::days(i64::from(days)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.days == Some(0) {
            return Err(ConfigError::Validation(
                "retention.days must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "retention.concurrency must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
