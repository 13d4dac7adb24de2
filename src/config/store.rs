//! Record store configuration.
//!
//! # Example
//!
//! ```toml
//! [store]
//! type = "dynamodb"
//! table_name = "attendance"
//! region = "us-east-1"
//! endpoint_url = "http://localhost:8000"  # optional, for DynamoDB Local
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Where attendance records live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Amazon DynamoDB table keyed by `user_id` / `timestamp`.
    Dynamodb(DynamoDbStoreConfig),
    /// One JSON file per record under a directory.
    File(FileStoreConfig),
    /// Process-local map. Contents are lost on exit.
    Memory(MemoryStoreConfig),
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StoreConfig::Dynamodb(c) => c.validate(),
            StoreConfig::File(c) => c.validate(),
            StoreConfig::Memory(c) => c.validate(),
        }
    }

    /// Short backend name for logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            StoreConfig::Dynamodb(_) => "dynamodb",
            StoreConfig::File(_) => "file",
            StoreConfig::Memory(_) => "memory",
        }
    }
}

/// DynamoDB table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamoDbStoreConfig {
    /// Table name.
    pub table_name: String,

    /// AWS region (e.g., "us-east-1").
    pub region: String,

    /// Custom endpoint URL (DynamoDB Local, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Static access key. When omitted the default AWS credential chain is used.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret key. Must be set together with `access_key_id`.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Maximum items evaluated per Scan call. DynamoDB's own 1 MB page
    /// limit applies when unset.
    #[serde(default)]
    pub page_limit: Option<u32>,
}

impl DynamoDbStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.table_name cannot be empty".into(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.region cannot be empty".into(),
            ));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigError::Validation(
                "store.access_key_id and store.secret_access_key must be set together".into(),
            ));
        }
        if self.page_limit == Some(0) {
            return Err(ConfigError::Validation(
                "store.page_limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Directory-backed store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileStoreConfig {
    /// Directory holding one JSON file per record.
    pub path: PathBuf,

    /// Records per scan page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl FileStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("store.path cannot be empty".into()));
        }
        validate_page_size(self.page_size)
    }
}

/// In-memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryStoreConfig {
    /// Records per scan page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl MemoryStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_page_size(self.page_size)
    }
}

pub(super) fn default_page_size() -> usize {
    100
}

fn validate_page_size(page_size: usize) -> Result<(), ConfigError> {
    if page_size == 0 {
        return Err(ConfigError::Validation(
            "store.page_size must be greater than 0".into(),
        ));
    }
    Ok(())
}
