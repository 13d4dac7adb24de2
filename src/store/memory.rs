use std::{collections::BTreeMap, ops::Bound};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AttendanceStore, ScanCursor, ScanPage, StoreResult};
use crate::models::{RecordKey, StoredRecord};

/// In-memory record store.
///
/// Records are kept ordered by primary key and scanned with keyset
/// pagination, `page_size` records at a time.
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, StoredRecord>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Create a store pre-populated with `records`.
    pub fn with_records(page_size: usize, records: impl IntoIterator<Item = StoredRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.key(), r)).collect();
        Self {
            records: RwLock::new(map),
            page_size: page_size.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, key: &RecordKey) -> Option<StoredRecord> {
        self.records.read().await.get(key).cloned()
    }

    /// All records in key order.
    pub async fn snapshot(&self) -> Vec<StoredRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

/// Cut one page out of an ordered index, resuming strictly after `cursor`.
pub(super) fn page_after(
    index: &BTreeMap<RecordKey, StoredRecord>,
    cursor: Option<&ScanCursor>,
    page_size: usize,
) -> ScanPage {
    let lower = match cursor {
        Some(cursor) => Bound::Excluded(cursor.last_key().clone()),
        None => Bound::Unbounded,
    };

    // Fetch one extra record to learn whether another page exists.
    let mut records: Vec<StoredRecord> = index
        .range((lower, Bound::Unbounded))
        .take(page_size + 1)
        .map(|(_, record)| record.clone())
        .collect();

    let has_more = records.len() > page_size;
    if has_more {
        records.pop();
    }

    let next = if has_more {
        records.last().map(|r| ScanCursor::after(r.key()))
    } else {
        None
    };

    ScanPage { records, next }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn insert(&self, record: &StoredRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> StoreResult<()> {
        let mut records = self.records.write().await;
        records.remove(key);
        Ok(())
    }

    async fn scan_page(&self, cursor: Option<&ScanCursor>) -> StoreResult<ScanPage> {
        let records = self.records.read().await;
        Ok(page_after(&records, cursor, self.page_size))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
