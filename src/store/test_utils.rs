//! Fault-injecting store wrapper for tests.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AttendanceStore, MemoryStore, ScanCursor, ScanPage, StoreError, StoreResult};
use crate::models::{RecordKey, StoredRecord};

/// Wraps a [`MemoryStore`] and fails selected operations.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    failing_deletes: HashSet<RecordKey>,
    failing_insert_users: HashSet<String>,
    /// Fail every scan call once this many pages have been served.
    fail_scan_after_pages: Option<usize>,
    /// Echo the request cursor back as `next` instead of advancing.
    stall_cursor: bool,
    /// Number of leading scan calls that fail with a transient error.
    transient_scan_failures: AtomicUsize,
    pages_served: AtomicUsize,
    scan_calls: AtomicUsize,
    deletes_attempted: Mutex<Vec<RecordKey>>,
    inserts_attempted: Mutex<Vec<StoredRecord>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing_deletes: HashSet::new(),
            failing_insert_users: HashSet::new(),
            fail_scan_after_pages: None,
            stall_cursor: false,
            transient_scan_failures: AtomicUsize::new(0),
            pages_served: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            deletes_attempted: Mutex::new(Vec::new()),
            inserts_attempted: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_delete(mut self, key: RecordKey) -> Self {
        self.failing_deletes.insert(key);
        self
    }

    pub fn fail_insert_for(mut self, user_id: &str) -> Self {
        self.failing_insert_users.insert(user_id.to_string());
        self
    }

    pub fn fail_scan_after(mut self, pages: usize) -> Self {
        self.fail_scan_after_pages = Some(pages);
        self
    }

    pub fn stall_cursor(mut self) -> Self {
        self.stall_cursor = true;
        self
    }

    pub fn transient_scan_failures(self, count: usize) -> Self {
        self.transient_scan_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub async fn deletes_attempted(&self) -> Vec<RecordKey> {
        self.deletes_attempted.lock().await.clone()
    }

    pub async fn inserts_attempted(&self) -> Vec<StoredRecord> {
        self.inserts_attempted.lock().await.clone()
    }
}

#[async_trait]
impl AttendanceStore for FlakyStore {
    async fn insert(&self, record: &StoredRecord) -> StoreResult<()> {
        self.inserts_attempted.lock().await.push(record.clone());
        if self.failing_insert_users.contains(&record.user_id) {
            return Err(StoreError::Backend(format!(
                "injected insert failure for {}",
                record.user_id
            )));
        }
        self.inner.insert(record).await
    }

    async fn delete(&self, key: &RecordKey) -> StoreResult<()> {
        self.deletes_attempted.lock().await.push(key.clone());
        if self.failing_deletes.contains(key) {
            return Err(StoreError::Backend(format!(
                "injected delete failure for {key}"
            )));
        }
        self.inner.delete(key).await
    }

    async fn scan_page(&self, cursor: Option<&ScanCursor>) -> StoreResult<ScanPage> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.transient_scan_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_scan_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected throttling".to_string()));
        }

        if let Some(limit) = self.fail_scan_after_pages
            && self.pages_served.load(Ordering::SeqCst) >= limit
        {
            return Err(StoreError::Backend("injected scan failure".to_string()));
        }

        let mut page = self.inner.scan_page(cursor).await?;
        self.pages_served.fetch_add(1, Ordering::SeqCst);
        if self.stall_cursor
            && let Some(cursor) = cursor
        {
            page.next = Some(cursor.clone());
        }
        Ok(page)
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Build a stored record with a username derived from the user id.
pub fn stored(user_id: &str, status: &str, timestamp: &str) -> StoredRecord {
    StoredRecord {
        user_id: user_id.to_string(),
        username: Some(format!("{}-name", user_id.to_lowercase())),
        status: status.to_string(),
        timestamp: timestamp.to_string(),
    }
}
