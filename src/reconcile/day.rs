use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{AttendanceStatus, RecordError, StoredRecord, UNKNOWN_USERNAME};

/// A user's winning record for the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayResponse {
    pub timestamp: DateTime<Utc>,
    /// Decoded status, or `None` when the stored label is not recognized.
    pub status: Option<AttendanceStatus>,
    /// Status text exactly as stored.
    pub raw_status: String,
}

/// Latest record per user for one UTC calendar day, built in scan order.
///
/// Day membership and ordering depend only on `user_id` and the parsed
/// instant. A record with an unrecognized status still counts as a response.
#[derive(Debug)]
pub struct DayIndex {
    date: NaiveDate,
    latest: HashMap<String, DayResponse>,
    usernames: HashMap<String, String>,
    scanned: u64,
    skipped: u64,
}

impl DayIndex {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            latest: HashMap::new(),
            usernames: HashMap::new(),
            scanned: 0,
            skipped: 0,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Fold one scanned record into the index.
    ///
    /// Records without a user id or a parseable timestamp are counted and
    /// logged, never fatal.
    pub fn observe(&mut self, raw: &StoredRecord) {
        self.scanned += 1;

        // Labels are learned from every record, whatever its date or status.
        if let Some(label) = raw.username.as_deref().map(str::trim)
            && !label.is_empty()
            && label != UNKNOWN_USERNAME
            && !raw.user_id.is_empty()
        {
            self.usernames
                .insert(raw.user_id.clone(), label.to_string());
        }

        let instant = if raw.user_id.trim().is_empty() {
            Err(RecordError::MissingUserId)
        } else {
            raw.instant()
        };
        let timestamp = match instant {
            Ok(timestamp) => timestamp,
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(key = %raw.key(), error = %e, "Skipping undecodable record");
                return;
            }
        };

        if timestamp.date_naive() != self.date {
            return;
        }

        if let Some(existing) = self.latest.get(&raw.user_id)
            && timestamp < existing.timestamp
        {
            return;
        }

        // Equal instants: the record seen later wins.
        let status = raw.status.parse::<AttendanceStatus>().ok();
        if status.is_none() {
            tracing::warn!(
                key = %raw.key(),
                status = %raw.status,
                "Record has an unrecognized status, counting it as a response"
            );
        }
        self.latest.insert(
            raw.user_id.clone(),
            DayResponse {
                timestamp,
                status,
                raw_status: raw.status.clone(),
            },
        );
    }

    /// The authoritative response for `user_id` on this day, if any.
    pub fn latest(&self, user_id: &str) -> Option<&DayResponse> {
        self.latest.get(user_id)
    }

    /// Last non-empty display label seen for `user_id`, or the sentinel.
    pub fn username_for(&self, user_id: &str) -> &str {
        self.usernames
            .get(user_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_USERNAME)
    }

    /// Users with at least one record on this day.
    pub fn reported(&self) -> usize {
        self.latest.len()
    }

    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
