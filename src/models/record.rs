use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AttendanceStatus;

/// Username written when no label has ever been seen for a user.
pub const UNKNOWN_USERNAME: &str = "unknown";

/// Offset layouts accepted in addition to RFC 3339: `+0000` style offsets
/// and times without seconds.
const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"];

/// Naive layouts. Values without an offset are interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Error decoding a stored record into its typed form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has no user_id")]
    MissingUserId,

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("unknown attendance status: {0:?}")]
    UnknownStatus(String),
}

/// Primary key of a record: `(user_id, timestamp)`.
///
/// The timestamp is the exact text that was persisted. Two keys whose
/// timestamps denote the same instant but are spelled differently are
/// distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub user_id: String,
    pub timestamp: String,
}

impl RecordKey {
    pub fn new(user_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: timestamp.into(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.timestamp)
    }
}

/// A record as persisted in the store.
///
/// Fields are kept as text so that a malformed record can still be listed,
/// keyed and deleted. Use [`StoredRecord::decode`] to obtain the typed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub status: String,
    pub timestamp: String,
}

impl StoredRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.user_id.clone(), self.timestamp.clone())
    }

    /// The record's timestamp as a UTC instant.
    pub fn instant(&self) -> Result<DateTime<Utc>, RecordError> {
        parse_timestamp(&self.timestamp)
    }

    pub fn decode(&self) -> Result<AttendanceRecord, RecordError> {
        if self.user_id.trim().is_empty() {
            return Err(RecordError::MissingUserId);
        }
        let timestamp = self.instant()?;
        let status = self.status.parse()?;

        Ok(AttendanceRecord {
            user_id: self.user_id.clone(),
            username: self.username.clone().filter(|u| !u.trim().is_empty()),
            status,
            timestamp,
        })
    }
}

/// A decoded attendance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub user_id: String,
    pub username: Option<String>,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(
        user_id: impl Into<String>,
        username: Option<String>,
        status: AttendanceStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username,
            status,
            timestamp,
        }
    }

    /// UTC calendar day of the record.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Encode for persistence, using the canonical timestamp layout.
    pub fn encode(&self) -> StoredRecord {
        StoredRecord {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            status: self.status.as_str().to_string(),
            timestamp: format_timestamp(self.timestamp),
        }
    }
}

/// Parse a stored timestamp into a UTC instant.
///
/// Accepts RFC 3339 with any offset, naive date-times (treated as UTC) and
/// bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RecordError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc());
    }

    Err(RecordError::InvalidTimestamp(raw.to_string()))
}

/// Canonical timestamp layout: RFC 3339 in UTC with a `Z` suffix and only as
/// many fractional digits as needed.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
