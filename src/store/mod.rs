//! Record store adapters.
//!
//! Every backend exposes the same three operations: insert (overwrite by
//! primary key), delete by key (deleting an absent key is not an error) and
//! scan one page from an optional cursor. Adapters never retry; callers own
//! the retry policy (see [`crate::scan`]).

mod cursor;
#[cfg(feature = "dynamodb")]
mod dynamodb;
mod error;
mod file;
mod memory;
#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

use async_trait::async_trait;
pub use cursor::{CursorError, ScanCursor};
#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbStore;
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::{
    config::StoreConfig,
    models::{RecordKey, StoredRecord},
};

/// One page of a full-table scan.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    /// Records on this page, in backend order.
    pub records: Vec<StoredRecord>,
    /// Where to resume, or `None` once the table is exhausted.
    pub next: Option<ScanCursor>,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Abstract attendance record collection.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Write a record, overwriting any record with the same primary key.
    async fn insert(&self, record: &StoredRecord) -> StoreResult<()>;

    /// Delete the record with this key. Succeeds if the key is absent.
    async fn delete(&self, key: &RecordKey) -> StoreResult<()>;

    /// Fetch the page that follows `cursor`, or the first page if `None`.
    async fn scan_page(&self, cursor: Option<&ScanCursor>) -> StoreResult<ScanPage>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Create a record store from configuration.
pub async fn create_store(config: &StoreConfig) -> StoreResult<Arc<dyn AttendanceStore>> {
    let store: Arc<dyn AttendanceStore> = match config {
        StoreConfig::Memory(c) => Arc::new(MemoryStore::new(c.page_size)),

        StoreConfig::File(c) => Arc::new(FileStore::new(&c.path, c.page_size).await?),

        #[cfg(feature = "dynamodb")]
        StoreConfig::Dynamodb(c) => Arc::new(DynamoDbStore::new(c).await?),
        #[cfg(not(feature = "dynamodb"))]
        StoreConfig::Dynamodb(_) => {
            return Err(StoreError::NotConfigured(
                "DynamoDB store configured but the 'dynamodb' feature is not enabled. \
                Rebuild with: cargo build --features dynamodb"
                    .to_string(),
            ));
        }
    };

    tracing::debug!(backend = store.backend_name(), "Record store ready");
    Ok(store)
}
