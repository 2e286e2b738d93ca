use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One tracked temporary folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    /// Idle-timeout policy as typed by the user, e.g. `4h`.
    pub deadtime: String,
    pub expires_at: DateTime<Local>,
}

impl Entry {
    pub fn new(path: PathBuf, created_at: DateTime<Local>, deadtime: &str, lifetime: TimeDelta) -> Self {
        Entry {
            path,
            created_at,
            deadtime: deadtime.to_string(),
            expires_at: created_at + lifetime,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        now > self.expires_at
    }

    /// Negative once the entry has expired.
    #[must_use]
    pub fn time_remaining(&self, now: DateTime<Local>) -> TimeDelta {
        self.expires_at.signed_duration_since(now)
    }
}
