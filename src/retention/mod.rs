//! Data retention module for purging old attendance records.
//!
//! The purger makes a single pass over the store and deletes every record
//! whose timestamp is strictly older than `now - window`:
//! 1. Scan one page
//! 2. Delete that page's expired records with bounded concurrency
//! 3. Continue from the page's cursor
//!
//! Per-record delete failures are counted and do not stop the run. Records
//! whose timestamp cannot be parsed are never deleted. Dry-run mode counts
//! candidates without deleting anything.

mod purger;

use chrono::{DateTime, Duration, Utc};
pub use purger::{PurgeReport, PurgeStatus, RetentionPurger};

/// How long records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow(Duration);

impl RetentionWindow {
    /// A window of `duration`, or `None` if it is not positive.
    pub fn new(duration: Duration) -> Option<Self> {
        (duration > Duration::zero()).then_some(Self(duration))
    }

    /// A window of whole days, or `None` for zero.
    pub fn days(days: u32) -> Option<Self> {
        Self::new(Duration::days(i64::from(days)))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    /// Records strictly older than this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.0
    }
}
