//! Retention purger: one scan, page-by-page deletes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::RetentionWindow;
use crate::{
    config::{ConfigError, RetryConfig, RollcallConfig},
    models::{RecordKey, StoredRecord},
    scan::{FullScan, ScanError, with_retry},
    store::AttendanceStore,
};

/// Overall outcome of a purge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeStatus {
    /// Every candidate was deleted (or counted, in dry-run mode).
    Completed,
    /// The scan finished but some deletes failed.
    CompletedWithErrors,
    /// Stopped at a page boundary on request.
    Cancelled,
    /// The scan itself failed.
    Aborted,
}

/// Results from a single purge run.
#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub status: PurgeStatus,
    pub cutoff: DateTime<Utc>,
    pub dry_run: bool,
    /// Pages fetched.
    pub pages: u64,
    /// Records seen.
    pub scanned: u64,
    /// Records older than the cutoff.
    pub candidates: u64,
    /// Records deleted.
    pub deleted: u64,
    /// Deletes that failed.
    pub failed: u64,
    /// Records whose timestamp could not be parsed.
    pub skipped: u64,
    /// The per-run delete limit stopped the run early.
    pub limit_reached: bool,
    /// Scan-level failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PurgeReport {
    fn new(cutoff: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            status: PurgeStatus::Completed,
            cutoff,
            dry_run,
            pages: 0,
            scanned: 0,
            candidates: 0,
            deleted: 0,
            failed: 0,
            skipped: 0,
            limit_reached: false,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PurgeStatus::Completed
    }

    /// Whether the run stopped before covering the whole store.
    pub fn is_fatal(&self) -> bool {
        matches!(self.status, PurgeStatus::Aborted | PurgeStatus::Cancelled)
    }

    /// Machine-readable run result.
    pub fn summary(&self) -> serde_json::Value {
        let mut summary = json!({
            "status": if self.is_success() { "success" } else { "failure" },
            "outcome": self.status,
            "deleted_records": self.deleted,
            "cutoff": self.cutoff,
            "scanned": self.scanned,
            "candidates": self.candidates,
            "skipped": self.skipped,
            "dry_run": self.dry_run,
            "limit_reached": self.limit_reached,
        });

        if self.failed > 0 {
            summary["failed_deletes"] = json!(self.failed);
        }
        if let Some(error) = &self.error {
            summary["error"] = json!(error);
        }

        summary
    }

    fn finish(&mut self) {
        if self.failed > 0 {
            self.status = PurgeStatus::CompletedWithErrors;
        }
    }

    fn abort(&mut self, err: &ScanError) {
        self.status = if err.is_cancelled() {
            PurgeStatus::Cancelled
        } else {
            PurgeStatus::Aborted
        };
        self.error = Some(err.to_string());
    }
}

/// Deletes records older than a retention window.
pub struct RetentionPurger {
    store: Arc<dyn AttendanceStore>,
    window: RetentionWindow,
    retry: RetryConfig,
    concurrency: usize,
    dry_run: bool,
    max_deletes_per_run: u64,
}

impl RetentionPurger {
    pub fn new(store: Arc<dyn AttendanceStore>, window: RetentionWindow) -> Self {
        Self {
            store,
            window,
            retry: RetryConfig::default(),
            concurrency: 8,
            dry_run: false,
            max_deletes_per_run: 0,
        }
    }

    /// Build a purger from configuration. Fails if no retention window is set.
    pub fn from_config(
        store: Arc<dyn AttendanceStore>,
        config: &RollcallConfig,
    ) -> Result<Self, ConfigError> {
        let window = RetentionWindow::new(config.require_retention()?).ok_or_else(|| {
            ConfigError::Validation("retention window must be positive".into())
        })?;

        Ok(Self::new(store, window)
            .with_retry(config.scan.retry.clone())
            .with_concurrency(config.retention.concurrency)
            .with_dry_run(config.retention.dry_run)
            .with_max_deletes(config.retention.max_deletes_per_run))
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

    /// Stop after issuing this many deletes. 0 means unlimited.
    pub fn with_max_deletes(mut self, max_deletes_per_run: u64) -> Self {
        self.max_deletes_per_run = max_deletes_per_run;
        self
    }

    /// Run a single purge pass relative to `now`.
    pub async fn run(&self, now: DateTime<Utc>, cancel: CancellationToken) -> PurgeReport {
        let cutoff = self.window.cutoff(now);
        let mut report = PurgeReport::new(cutoff, self.dry_run);

        let dry_run_msg = if self.dry_run { " (DRY RUN)" } else { "" };
        tracing::info!(
            cutoff = %cutoff,
            window_days = self.window.duration().num_days(),
            dry_run = self.dry_run,
            max_deletes_per_run = self.max_deletes_per_run,
            "Starting retention purge{}",
            dry_run_msg
        );

        let max_deletes = if self.max_deletes_per_run == 0 {
            u64::MAX
        } else {
            self.max_deletes_per_run
        };

        let mut scan =
            FullScan::new(Arc::clone(&self.store), self.retry.clone()).with_cancellation(cancel);

        loop {
            let page = match scan.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Retention scan failed");
                    report.abort(&e);
                    break;
                }
            };

            report.pages += 1;
            report.scanned += page.len() as u64;

            let expired = self.expired_keys(&page, cutoff, &mut report);
            report.candidates += expired.len() as u64;

            if self.dry_run {
                continue;
            }

            let issued = report.deleted + report.failed;
            let budget = usize::try_from(max_deletes.saturating_sub(issued)).unwrap_or(usize::MAX);
            if expired.len() > budget {
                report.limit_reached = true;
            }

            self.delete_all(expired.into_iter().take(budget), &mut report)
                .await;

            if report.limit_reached {
                tracing::warn!(
                    max_deletes_per_run = self.max_deletes_per_run,
                    "Delete limit reached, stopping retention purge"
                );
                break;
            }
        }

        if !report.is_fatal() {
            report.finish();
        }

        tracing::info!(
            status = ?report.status,
            cutoff = %cutoff,
            pages = report.pages,
            scanned = report.scanned,
            candidates = report.candidates,
            deleted = report.deleted,
            failed = report.failed,
            skipped = report.skipped,
            limit_reached = report.limit_reached,
            dry_run = self.dry_run,
            "Retention purge complete{}",
            dry_run_msg
        );

        report
    }

    /// Keys on `page` strictly older than `cutoff`.
    fn expired_keys(
        &self,
        page: &[StoredRecord],
        cutoff: DateTime<Utc>,
        report: &mut PurgeReport,
    ) -> Vec<RecordKey> {
        page.iter()
            .filter_map(|record| match record.instant() {
                Ok(instant) => (instant < cutoff).then(|| record.key()),
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(key = %record.key(), error = %e, "Skipping record with unparseable timestamp");
                    None
                }
            })
            .collect()
    }

    async fn delete_all(
        &self,
        keys: impl Iterator<Item = RecordKey>,
        report: &mut PurgeReport,
    ) {
        let store = self.store.as_ref();
        let retry = &self.retry;

        let results: Vec<_> = stream::iter(keys)
            .map(|key| async move {
                let result = with_retry(retry, "delete", || store.delete(&key)).await;
                (key, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (key, result) in results {
            match result {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(key = %key, error = %e, "Failed to delete expired record");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        models::format_timestamp,
        store::{
            MemoryStore,
            test_utils::{FlakyStore, stored},
        },
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: 0.0,
            ..RetryConfig::default()
        }
    }

    fn purger(store: Arc<dyn AttendanceStore>, days: u32) -> RetentionPurger {
        RetentionPurger::new(store, RetentionWindow::days(days).unwrap()).with_retry(fast_retry())
    }

    fn at(offset: Duration) -> String {
        format_timestamp(now() - offset)
    }

    #[tokio::test]
    async fn test_cutoff_boundary_is_strict() {
        let window = Duration::days(30);
        let store = Arc::new(MemoryStore::with_records(
            2,
            vec![
                stored("U1", "OnLeave", &at(window)),
                stored("U2", "OnLeave", &at(window + Duration::milliseconds(1))),
                stored("U3", "OnLeave", &at(Duration::days(1))),
            ],
        ));

        let report = purger(store.clone(), 30)
            .run(now(), CancellationToken::new())
            .await;

        assert_eq!(report.status, PurgeStatus::Completed);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.deleted, 1);
        let remaining: Vec<_> = store.snapshot().await.into_iter().map(|r| r.user_id).collect();
        assert_eq!(remaining, vec!["U1", "U3"]);
    }

    #[tokio::test]
    async fn test_comparison_uses_instants_not_strings() {
        // Lexically "2024-05-31T13:00:00+02:00" sorts after the cutoff
        // "2024-05-31T12:00:00Z", but the instant is 11:00 UTC.
        let store = Arc::new(MemoryStore::with_records(
            10,
            vec![
                stored("U1", "OnLeave", "2024-05-31T13:00:00+02:00"),
                stored("U2", "OnLeave", "2024-05-31T12:30:00"),
            ],
        ));

        let report = purger(store.clone(), 30)
            .run(now(), CancellationToken::new())
            .await;

        assert_eq!(report.deleted, 1);
        assert_eq!(store.snapshot().await[0].user_id, "U2");
    }

    #[tokio::test]
    async fn test_compact_offsets_and_minute_precision_are_purged() {
        let store = Arc::new(MemoryStore::with_records(
            10,
            vec![
                stored("U1", "OnLeave", "2024-01-01T10:00:00+0000"),
                stored("U2", "OnLeave", "2024-01-01T10:00Z"),
                stored("U3", "OnLeave", "2024-06-29T10:00+0000"),
            ],
        ));

        let report = purger(store.clone(), 30)
            .run(now(), CancellationToken::new())
            .await;

        assert_eq!(report.skipped, 0);
        assert_eq!(report.deleted, 2);
        assert_eq!(store.snapshot().await[0].user_id, "U3");
    }

    #[tokio::test]
    async fn test_deletes_across_many_pages() {
        let records: Vec<_> = (0..25)
            .map(|i| {
                let age = if i % 2 == 0 { Duration::days(100) } else { Duration::days(1) };
                stored(&format!("U{i:02}"), "WorkFromHome", &at(age))
            })
            .collect();
        let store = Arc::new(MemoryStore::with_records(3, records));

        let report = purger(store.clone(), 90)
            .with_concurrency(2)
            .run(now(), CancellationToken::new())
            .await;

        assert_eq!(report.scanned, 25);
        assert_eq!(report.deleted, 13);
        assert_eq!(store.len().await, 12);
        assert_eq!(report.pages, 9);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_the_run() {
        let old = at(Duration::days(200));
        let inner = Arc::new(MemoryStore::with_records(
            2,
            vec![
                stored("U1", "OnLeave", &old),
                stored("U2", "OnLeave", &old),
                stored("U3", "OnLeave", &old),
                stored("U4", "OnLeave", &old),
            ],
        ));
        let failing = RecordKey::new("U2", old.clone());
        let flaky = Arc::new(FlakyStore::new(inner).fail_delete(failing.clone()));

        let report = purger(flaky.clone(), 90)
            .run(now(), CancellationToken::new())
            .await;

        assert_eq!(report.status, PurgeStatus::CompletedWithErrors);
        assert_eq!(report.candidates, 4);
        assert_eq!(report.deleted, 3);
        assert_eq!(report.failed, 1);

        let remaining = flaky.inner().snapshot().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key(), failing);

        // A permanent failure is not retried.
        let attempted = flaky.deletes_attempted().await;
        assert_eq!(attempted.len(), 4);
        assert_eq!(attempted.iter().filter(|k| **k == failing).count(), 1);

        let summary = report.summary();
        assert_eq!(summary["status"], "failure");
        assert_eq!(summary["deleted_records"], 3);
        assert_eq!(summary["failed_deletes"], 1);
        assert!(!report.is_fatal());
    }

    #[tokio::test]
    async fn test_unparseable_timestamps_are_never_deleted() {
        let store = Arc::new(MemoryStore::with_records(
            10,
            vec![
                stored("U1", "OnLeave", "last tuesday"),
                stored("U2", "Sabbatical", &at(Duration::days(400))),
            ],
        ));

        let report = purger(store.clone(), 30)
            .run(now(), CancellationToken::new())
            .await;

        assert_eq!(report.skipped, 1);
        // Status text is irrelevant to expiry.
        assert_eq!(report.deleted, 1);
        assert_eq!(store.snapshot().await[0].user_id, "U1");
    }

    #[tokio::test]
    async fn test_scan_failure_aborts_with_partial_progress() {
        let old = at(Duration::days(200));
        let inner = Arc::new(MemoryStore::with_records(
            2,
            (0..6).map(|i| stored(&format!("U{i}"), "OnLeave", &old)),
        ));
        let flaky = Arc::new(FlakyStore::new(inner).fail_scan_after(1));

        let report = purger(flaky.clone(), 90)
            .run(now(), CancellationToken::new())
            .await;

        assert_eq!(report.status, PurgeStatus::Aborted);
        assert!(report.is_fatal());
        assert_eq!(report.deleted, 2);
        assert_eq!(flaky.inner().len().await, 4);

        let summary = report.summary();
        assert_eq!(summary["status"], "failure");
        assert!(summary["error"].as_str().unwrap().contains("injected scan failure"));
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let store = Arc::new(MemoryStore::with_records(
            1,
            vec![
                stored("U1", "OnLeave", &at(Duration::days(200))),
                stored("U2", "OnLeave", &at(Duration::days(200))),
            ],
        ));

        let report = purger(store.clone(), 90)
            .with_dry_run(true)
            .run(now(), CancellationToken::new())
            .await;

        assert!(report.is_success());
        assert_eq!(report.candidates, 2);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.len().await, 2);
        assert_eq!(report.summary()["dry_run"], true);
    }

    #[tokio::test]
    async fn test_max_deletes_per_run() {
        let old = at(Duration::days(200));
        let store = Arc::new(MemoryStore::with_records(
            2,
            (0..5).map(|i| stored(&format!("U{i}"), "OnLeave", &old)),
        ));

        let report = purger(store.clone(), 90)
            .with_max_deletes(3)
            .run(now(), CancellationToken::new())
            .await;

        assert!(report.limit_reached);
        assert_eq!(report.deleted, 3);
        assert_eq!(store.len().await, 2);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_pages() {
        let old = at(Duration::days(200));
        let store = Arc::new(MemoryStore::with_records(
            2,
            (0..4).map(|i| stored(&format!("U{i}"), "OnLeave", &old)),
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = purger(store.clone(), 90).run(now(), cancel).await;

        assert_eq!(report.status, PurgeStatus::Cancelled);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_success_summary_shape() {
        let store = Arc::new(MemoryStore::new(10));
        let report = purger(store, 173).run(now(), CancellationToken::new()).await;

        let summary = report.summary();
        assert_eq!(summary["status"], "success");
        assert_eq!(summary["outcome"], "completed");
        assert_eq!(summary["deleted_records"], 0);
        assert!(summary.get("failed_deletes").is_none());
        assert!(summary.get("error").is_none());
    }

    #[tokio::test]
    async fn test_from_config_requires_window() {
        let config = RollcallConfig::from_str("[store]\ntype = \"memory\"").unwrap();
        let store: Arc<dyn AttendanceStore> = Arc::new(MemoryStore::new(10));
        assert!(RetentionPurger::from_config(store, &config).is_err());
    }
}
