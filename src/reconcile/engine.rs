use std::{fmt, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{AbsencePolicy, DayIndex, ReconcileError};
use crate::{
    config::{RetryConfig, RollcallConfig},
    models::{AttendanceRecord, AttendanceStatus, Roster},
    scan::{FullScan, with_retry},
    store::AttendanceStore,
};

/// What happened to one roster user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The user has a record for the day; nothing was written.
    AlreadyResponded { status: AttendanceStatus },
    /// The user's record for the day carries a status label outside the
    /// known set. It still counts as a response; nothing was written.
    RespondedUnrecognized { status: String },
    /// A synthetic record was inserted.
    Marked {
        username: String,
        status: AttendanceStatus,
        timestamp: DateTime<Utc>,
    },
    /// Dry run: a synthetic record would have been inserted.
    WouldMark {
        username: String,
        status: AttendanceStatus,
    },
    /// Inserting the synthetic record failed.
    InsertFailed {
        username: String,
        status: AttendanceStatus,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserOutcome {
    pub user_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl fmt::Display for UserOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = &self.user_id;
        match &self.outcome {
            Outcome::AlreadyResponded { status } => {
                write!(f, "{user} already responded: {status}")
            }
            Outcome::RespondedUnrecognized { status } => {
                write!(f, "{user} already responded: {status} (unrecognized status)")
            }
            Outcome::Marked {
                username, status, ..
            } => write!(f, "{user} ({username}) marked as {status}"),
            Outcome::WouldMark { username, status } => {
                write!(f, "{user} ({username}) would be marked as {status}")
            }
            Outcome::InsertFailed { username, error, .. } => {
                write!(f, "{user} ({username}) insert failed: {error}")
            }
        }
    }
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub date: NaiveDate,
    pub dry_run: bool,
    /// Records seen by the scan.
    pub scanned: u64,
    /// Records without a user id or a parseable timestamp.
    pub skipped: u64,
    /// One entry per roster user, in roster order.
    pub outcomes: Vec<UserOutcome>,
}

impl ReconcileReport {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    pub fn responded(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                Outcome::AlreadyResponded { .. } | Outcome::RespondedUnrecognized { .. }
            )
        })
    }

    pub fn marked(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Marked { .. } | Outcome::WouldMark { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::InsertFailed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Reconciles a day's attendance against a roster.
pub struct Reconciler {
    store: Arc<dyn AttendanceStore>,
    policy: AbsencePolicy,
    retry: RetryConfig,
    concurrency: usize,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn AttendanceStore>, policy: AbsencePolicy) -> Self {
        Self {
            store,
            policy,
            retry: RetryConfig::default(),
            concurrency: 8,
            dry_run: false,
        }
    }

    pub fn from_config(
        store: Arc<dyn AttendanceStore>,
        config: &RollcallConfig,
    ) -> Result<Self, ReconcileError> {
        Ok(Self::new(store, AbsencePolicy::from_config(&config.reconcile)?)
            .with_retry(config.scan.retry.clone())
            .with_concurrency(config.reconcile.concurrency)
            .with_dry_run(config.reconcile.dry_run))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reconcile `date` for every user in `roster`.
    ///
    /// Inserts happen only after a complete scan. A failed or cancelled scan
    /// returns an error and writes nothing.
    pub async fn run(
        &self,
        date: NaiveDate,
        roster: &Roster,
        cancel: CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        if roster.is_empty() {
            tracing::info!(date = %date, "Roster is empty, nothing to reconcile");
            return Ok(ReconcileReport {
                date,
                dry_run: self.dry_run,
                scanned: 0,
                skipped: 0,
                outcomes: Vec::new(),
            });
        }

        let index = self.index_day(date, cancel).await?;
        tracing::info!(
            date = %date,
            scanned = index.scanned(),
            skipped = index.skipped(),
            reported = index.reported(),
            roster = roster.len(),
            "Scanned attendance records"
        );

        let timestamp = self.policy.synthetic_timestamp(date);
        let outcomes: Vec<UserOutcome> = stream::iter(roster.iter())
            .map(|user_id| self.resolve(user_id, &index, timestamp))
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = ReconcileReport {
            date,
            dry_run: self.dry_run,
            scanned: index.scanned(),
            skipped: index.skipped(),
            outcomes,
        };

        tracing::info!(
            date = %date,
            responded = report.responded(),
            marked = report.marked(),
            failed = report.failed(),
            dry_run = self.dry_run,
            "Reconciliation complete"
        );

        Ok(report)
    }

    async fn index_day(
        &self,
        date: NaiveDate,
        cancel: CancellationToken,
    ) -> Result<DayIndex, ReconcileError> {
        let scan = FullScan::new(Arc::clone(&self.store), self.retry.clone())
            .with_cancellation(cancel);

        let index = scan
            .into_stream()
            .try_fold(DayIndex::new(date), |mut index, record| async move {
                index.observe(&record);
                Ok(index)
            })
            .await?;

        Ok(index)
    }

    async fn resolve(
        &self,
        user_id: &str,
        index: &DayIndex,
        timestamp: DateTime<Utc>,
    ) -> UserOutcome {
        let outcome = match index.latest(user_id) {
            Some(response) => match response.status {
                Some(status) => Outcome::AlreadyResponded { status },
                None => Outcome::RespondedUnrecognized {
                    status: response.raw_status.clone(),
                },
            },
            None => self.mark_absent(user_id, index, timestamp).await,
        };

        UserOutcome {
            user_id: user_id.to_string(),
            outcome,
        }
    }

    async fn mark_absent(
        &self,
        user_id: &str,
        index: &DayIndex,
        timestamp: DateTime<Utc>,
    ) -> Outcome {
        let username = index.username_for(user_id).to_string();
        let status = self.policy.status();

        if self.dry_run {
            tracing::info!(user_id, username = %username, status = %status, "DRY RUN: Would mark user");
            return Outcome::WouldMark { username, status };
        }

        let record = AttendanceRecord::new(user_id, Some(username.clone()), status, timestamp).encode();
        let store = self.store.as_ref();
        let result = with_retry(&self.retry, "insert", || store.insert(&record)).await;

        match result {
            Ok(()) => {
                tracing::info!(user_id, username = %username, status = %status, "Marked absent user");
                Outcome::Marked {
                    username,
                    status,
                    timestamp,
                }
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to insert synthetic record");
                Outcome::InsertFailed {
                    username,
                    status,
                    error: e.to_string(),
                }
            }
        }
    }
}
