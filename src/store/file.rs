use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tokio::sync::RwLock;

use super::{AttendanceStore, ScanCursor, ScanPage, StoreError, StoreResult, memory::page_after};
use crate::models::{RecordKey, StoredRecord};

/// File-based record store.
///
/// Stores each record as a JSON file in a single directory. Uses an
/// in-memory index, ordered by primary key, for scans.
pub struct FileStore {
    /// Directory holding record files.
    path: PathBuf,
    /// Records returned per scan page.
    page_size: usize,
    /// In-memory index of records (key -> record).
    index: Arc<RwLock<BTreeMap<RecordKey, StoredRecord>>>,
}

impl FileStore {
    /// Open a file-based store, creating the directory if needed.
    pub async fn new(path: impl AsRef<Path>, page_size: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        tokio::fs::create_dir_all(&path).await?;

        let store = Self {
            path,
            page_size: page_size.max(1),
            index: Arc::new(RwLock::new(BTreeMap::new())),
        };

        store.load_from_disk().await?;

        Ok(store)
    }

    /// Load existing records from disk into the index.
    async fn load_from_disk(&self) -> StoreResult<()> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut index = self.index.write().await;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match self.load_record_file(&path).await {
                    Ok(record) => {
                        index.insert(record.key(), record);
                    }
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Failed to load record file");
                    }
                }
            }
        }

        tracing::info!(
            path = ?self.path,
            records = index.len(),
            "Loaded attendance records from disk"
        );

        Ok(())
    }

    async fn load_record_file(&self, path: &Path) -> StoreResult<StoredRecord> {
        let contents = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&contents).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    /// File name for a key. User ids and timestamps may contain characters
    /// that are not valid in file names, so the key is base64 encoded.
    fn record_path(&self, key: &RecordKey) -> PathBuf {
        let name = URL_SAFE_NO_PAD.encode(format!("{}\n{}", key.user_id, key.timestamp));
        self.path.join(format!("{name}.json"))
    }

    async fn write_record(&self, record: &StoredRecord) -> StoreResult<()> {
        let path = self.record_path(&record.key());
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    async fn delete_record_file(&self, key: &RecordKey) -> StoreResult<bool> {
        let path = self.record_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AttendanceStore for FileStore {
    async fn insert(&self, record: &StoredRecord) -> StoreResult<()> {
        // Write to disk first
        self.write_record(record).await?;

        let mut index = self.index.write().await;
        index.insert(record.key(), record.clone());

        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> StoreResult<()> {
        let existed = self.delete_record_file(key).await?;

        let mut index = self.index.write().await;
        index.remove(key);

        if !existed {
            tracing::debug!(key = %key, "Record file already absent");
        }
        Ok(())
    }

    async fn scan_page(&self, cursor: Option<&ScanCursor>) -> StoreResult<ScanPage> {
        let index = self.index.read().await;
        Ok(page_after(&index, cursor, self.page_size))
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
