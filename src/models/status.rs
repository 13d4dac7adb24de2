use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::RecordError;

/// Self-reported work status for a single day.
///
/// Serialized in its canonical form (`"OnLeave"`). Parsing also accepts the
/// free-text labels written by older producers, e.g. `"On Leave"`,
/// `"Work from Home"`, `"wfo"` or `"leave"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum AttendanceStatus {
    WorkFromOffice,
    WorkFromHome,
    OnLeave,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [
        AttendanceStatus::WorkFromOffice,
        AttendanceStatus::WorkFromHome,
        AttendanceStatus::OnLeave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::WorkFromOffice => "WorkFromOffice",
            AttendanceStatus::WorkFromHome => "WorkFromHome",
            AttendanceStatus::OnLeave => "OnLeave",
        }
    }

    /// Parse a status label, ignoring case, whitespace and punctuation.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "workfromoffice" | "wfo" | "office" => Some(AttendanceStatus::WorkFromOffice),
            "workfromhome" | "wfh" | "home" | "remote" => Some(AttendanceStatus::WorkFromHome),
            "onleave" | "leave" | "absent" => Some(AttendanceStatus::OnLeave),
            _ => None,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| RecordError::UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for AttendanceStatus {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
