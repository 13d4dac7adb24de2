//! Daily reconciliation configuration.
//!
//! # Example
//!
//! ```toml
//! [reconcile]
//! roster = "U01ABC, U02DEF"   # or an array: ["U01ABC", "U02DEF"]
//! default_status = "OnLeave"
//! cutoff_hour = 16
//! concurrency = 8
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::models::{AttendanceStatus, Roster};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Users expected to report each day.
    #[serde(default)]
    pub roster: Roster,

    /// Status written for users who never reported.
    /// Default: OnLeave
    #[serde(default = "default_status")]
    pub default_status: AttendanceStatus,

    /// UTC hour used for the timestamp of synthetic records.
    /// Default: 16 (`<date>T16:00:00Z`)
    #[serde(default = "default_cutoff_hour")]
    pub cutoff_hour: u32,

    /// Report absentees without inserting records.
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum concurrent inserts.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            roster: Roster::default(),
            default_status: default_status(),
            cutoff_hour: default_cutoff_hour(),
            dry_run: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_status() -> AttendanceStatus {
    AttendanceStatus::OnLeave
}

fn default_cutoff_hour() -> u32 {
    16
}

pub(super) fn default_concurrency() -> usize {
    8
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cutoff_hour > 23 {
            return Err(ConfigError::Validation(format!(
                "reconcile.cutoff_hour must be between 0 and 23, got {}",
                self.cutoff_hour
            )));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "reconcile.concurrency must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
