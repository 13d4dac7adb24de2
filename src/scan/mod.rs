//! Full-table scans over a cursor-paginated store.
//!
//! [`FullScan`] hides page-boundary bookkeeping: it starts from the first
//! page, follows continuation cursors until the backend reports none, retries
//! transient page failures from the same cursor and stops at page
//! boundaries when cancelled.

mod retry;

use std::sync::Arc;

use futures::{Stream, TryStreamExt, stream};
pub use retry::with_retry;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    config::RetryConfig,
    models::StoredRecord,
    store::{AttendanceStore, ScanCursor, StoreError},
};

/// How far a scan got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    /// Pages fetched.
    pub pages: u64,
    /// Records returned across those pages.
    pub records: u64,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan cancelled after {} pages ({} records)", progress.pages, progress.records)]
    Cancelled { progress: ScanProgress },

    #[error("scan failed after {} pages: {source}", progress.pages)]
    Store {
        progress: ScanProgress,
        #[source]
        source: StoreError,
    },

    #[error("store returned the same cursor twice after {} pages", progress.pages)]
    CursorStalled { progress: ScanProgress },
}

impl ScanError {
    pub fn progress(&self) -> ScanProgress {
        match self {
            ScanError::Cancelled { progress }
            | ScanError::Store { progress, .. }
            | ScanError::CursorStalled { progress } => *progress,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled { .. })
    }
}

/// A single pass over every record in a store.
///
/// There is no snapshot isolation: records written or deleted while the scan
/// runs may or may not be observed.
pub struct FullScan {
    store: Arc<dyn AttendanceStore>,
    retry: RetryConfig,
    cancel: CancellationToken,
    cursor: Option<ScanCursor>,
    finished: bool,
    progress: ScanProgress,
}

impl FullScan {
    pub fn new(store: Arc<dyn AttendanceStore>, retry: RetryConfig) -> Self {
        Self {
            store,
            retry,
            cancel: CancellationToken::new(),
            cursor: None,
            finished: false,
            progress: ScanProgress::default(),
        }
    }

    /// Stop the scan at the next page boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn progress(&self) -> ScanProgress {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fetch the next page of records.
    ///
    /// Returns `Ok(None)` once the store is exhausted. Pages may be empty
    /// without the scan being finished.
    pub async fn next_page(&mut self) -> Result<Option<Vec<StoredRecord>>, ScanError> {
        if self.finished {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled {
                progress: self.progress,
            });
        }

        let result = {
            let store = self.store.as_ref();
            let cursor = self.cursor.as_ref();
            with_retry(&self.retry, "scan_page", move || store.scan_page(cursor)).await
        };
        let page = result.map_err(|source| ScanError::Store {
            progress: self.progress,
            source,
        })?;

        self.progress.pages += 1;
        self.progress.records += page.records.len() as u64;

        match page.next {
            Some(next) if self.cursor.as_ref() == Some(&next) => {
                return Err(ScanError::CursorStalled {
                    progress: self.progress,
                });
            }
            Some(next) => self.cursor = Some(next),
            None => {
                self.cursor = None;
                self.finished = true;
            }
        }

        tracing::debug!(
            backend = self.store.backend_name(),
            pages = self.progress.pages,
            records = self.progress.records,
            finished = self.finished,
            "Fetched scan page"
        );

        Ok(Some(page.records))
    }

    /// Flatten the scan into a stream of records.
    pub fn into_stream(self) -> impl Stream<Item = Result<StoredRecord, ScanError>> + Send {
        stream::try_unfold(self, |mut scan| async move {
            let page = scan.next_page().await?;
            Ok(page.map(|records| (stream::iter(records.into_iter().map(Ok)), scan)))
        })
        .try_flatten()
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use rstest::rstest;

    use super::*;
    use crate::store::{
        MemoryStore,
        test_utils::{FlakyStore, stored},
    };

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: 0.0,
            ..RetryConfig::default()
        }
    }

    fn store_with(count: usize, page_size: usize) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_records(
            page_size,
            (0..count).map(|i| stored(&format!("U{i:03}"), "WorkFromHome", "2024-01-01T09:00:00Z")),
        ))
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(5, 1)]
    #[case(6, 2)]
    #[case(7, 3)]
    #[case(10, 100)]
    #[tokio::test]
    async fn test_scan_visits_every_record_once(#[case] count: usize, #[case] page_size: usize) {
        let store = store_with(count, page_size);
        let scan = FullScan::new(store, fast_retry());

        let records: Vec<StoredRecord> = scan.into_stream().try_collect().await.unwrap();

        assert_eq!(records.len(), count);
        let mut ids: Vec<_> = records.iter().map(|r| r.user_id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[tokio::test]
    async fn test_page_api_reports_progress_and_terminates() {
        let store = store_with(5, 2);
        let mut scan = FullScan::new(store, fast_retry());

        let mut sizes = Vec::new();
        while let Some(page) = scan.next_page().await.unwrap() {
            sizes.push(page.len());
        }

        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(scan.is_finished());
        assert_eq!(scan.progress(), ScanProgress { pages: 3, records: 5 });
        assert!(scan.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_page_failure_is_retried_from_same_cursor() {
        let flaky = Arc::new(FlakyStore::new(store_with(4, 2)).transient_scan_failures(2));
        let scan = FullScan::new(flaky.clone(), fast_retry());

        let records: Vec<StoredRecord> = scan.into_stream().try_collect().await.unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(flaky.scan_calls(), 4);
    }

    #[tokio::test]
    async fn test_permanent_failure_reports_progress() {
        let flaky = Arc::new(FlakyStore::new(store_with(6, 2)).fail_scan_after(1));
        let mut scan = FullScan::new(flaky, fast_retry());

        assert_eq!(scan.next_page().await.unwrap().unwrap().len(), 2);
        let err = scan.next_page().await.unwrap_err();

        assert!(matches!(err, ScanError::Store { .. }));
        assert_eq!(err.progress(), ScanProgress { pages: 1, records: 2 });
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_page_boundary() {
        let cancel = CancellationToken::new();
        let mut scan = FullScan::new(store_with(6, 2), fast_retry()).with_cancellation(cancel.clone());

        assert!(scan.next_page().await.unwrap().is_some());
        cancel.cancel();

        let err = scan.next_page().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.progress(), ScanProgress { pages: 1, records: 2 });
    }

    #[tokio::test]
    async fn test_stalled_cursor_fails_instead_of_looping() {
        let flaky = Arc::new(FlakyStore::new(store_with(6, 2)).stall_cursor());
        let scan = FullScan::new(flaky.clone(), fast_retry());

        let err = scan
            .into_stream()
            .try_collect::<Vec<StoredRecord>>()
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::CursorStalled { .. }));
        assert_eq!(err.progress(), ScanProgress { pages: 2, records: 4 });
        assert_eq!(flaky.scan_calls(), 2);
    }

    #[tokio::test]
    async fn test_fresh_scan_starts_from_first_page() {
        let store = store_with(3, 1);
        let mut first = FullScan::new(store.clone(), fast_retry());
        first.next_page().await.unwrap();
        first.next_page().await.unwrap();

        let records: Vec<StoredRecord> = FullScan::new(store, fast_retry())
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(records[0].user_id, "U000");
        assert_eq!(records.len(), 3);
    }
}
