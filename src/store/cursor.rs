//! Opaque continuation cursors for full-table scans.
//!
//! A cursor records the primary key of the last record on a page. Backends
//! resume the scan strictly after that key, which keeps pagination stable
//! while records at or before the cursor are being deleted by the caller.
//!
//! Cursors are encoded as URL-safe base64 of a small JSON document so that
//! user ids and timestamps containing `:` or `/` survive unchanged.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::RecordKey;

/// Error type for cursor operations.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("invalid cursor format")]
    InvalidFormat,
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Position in a full scan: the key of the last record already returned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanCursor {
    last_key: RecordKey,
}

impl ScanCursor {
    /// Create a cursor that resumes after `last_key`.
    pub fn after(last_key: RecordKey) -> Self {
        Self { last_key }
    }

    pub fn last_key(&self) -> &RecordKey {
        &self.last_key
    }

    /// Encode the cursor as a URL-safe base64 string.
    pub fn encode(&self) -> String {
        // Serializing two strings cannot fail.
        let raw = serde_json::to_vec(&self.last_key).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Decode a cursor from a base64 string.
    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
        let last_key: RecordKey =
            serde_json::from_slice(&bytes).map_err(|_| CursorError::InvalidFormat)?;
        Ok(Self { last_key })
    }
}

impl std::fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl Serialize for ScanCursor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for ScanCursor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ScanCursor::decode(&s).map_err(serde::de::Error::custom)
    }
}
