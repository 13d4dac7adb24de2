//! Daily attendance reconciliation.
//!
//! For a target UTC day, every roster user ends up with at least one record:
//! users who reported keep their latest status, users who did not get a
//! synthetic record carrying the configured default status.
//!
//! Synthetic records use a fixed time of day, so re-running for the same
//! day overwrites the same primary key and a second run sees the user as
//! present.

mod day;
mod engine;

use chrono::{DateTime, NaiveDate, Utc};
pub use day::{DayIndex, DayResponse};
pub use engine::{Outcome, ReconcileReport, Reconciler, UserOutcome};
use thiserror::Error;

use crate::{config::ReconcileConfig, models::AttendanceStatus, scan::ScanError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cutoff hour must be between 0 and 23, got {0}")]
    InvalidCutoffHour(u32),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// What to write for a user who never reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsencePolicy {
    status: AttendanceStatus,
    cutoff_hour: u32,
}

impl Default for AbsencePolicy {
    fn default() -> Self {
        Self {
            status: AttendanceStatus::OnLeave,
            cutoff_hour: 16,
        }
    }
}

impl AbsencePolicy {
    pub fn new(status: AttendanceStatus, cutoff_hour: u32) -> Result<Self, ReconcileError> {
        if cutoff_hour > 23 {
            return Err(ReconcileError::InvalidCutoffHour(cutoff_hour));
        }
        Ok(Self {
            status,
            cutoff_hour,
        })
    }

    pub fn from_config(config: &ReconcileConfig) -> Result<Self, ReconcileError> {
        Self::new(config.default_status, config.cutoff_hour)
    }

    pub fn status(&self) -> AttendanceStatus {
        self.status
    }

    pub fn cutoff_hour(&self) -> u32 {
        self.cutoff_hour
    }

    /// Timestamp given to synthetic records for `date`.
    pub fn synthetic_timestamp(&self, date: NaiveDate) -> DateTime<Utc> {
        // cutoff_hour is validated on construction
        date.and_hms_opt(self.cutoff_hour, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }
}
