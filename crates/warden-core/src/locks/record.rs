//! Lock records.

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Milliseconds in one hour.
const MS_PER_HOUR: f64 = 3_600_000.0;

/// Who created a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockedBy {
    /// Created by the moderation pipeline from a classifier verdict.
    Ai,
    /// Created by a manual moderation action.
    Admin,
}

impl LockedBy {
    /// Returns the origin as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Admin => "admin",
        }
    }

    /// Parses the string form produced by [`LockedBy::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ai" => Some(Self::Ai),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for LockedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An active restriction on a subject.
///
/// `expires_at_ms` is immutable once set; unlocking removes the record
/// rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Opaque id generated at creation.
    pub id: String,
    /// Subject the lock applies to. Unique key: at most one active record
    /// per subject.
    pub subject_id: String,
    /// Creation time, epoch milliseconds.
    pub locked_at_ms: i64,
    /// Lock duration in hours.
    pub duration_hours: f64,
    /// Why the subject was locked.
    pub reason: String,
    /// Who created the lock.
    pub locked_by: LockedBy,
    /// Administrator id when `locked_by` is admin.
    pub admin_id: Option<String>,
    /// Expiry time, epoch milliseconds.
    pub expires_at_ms: i64,
}

impl LockRecord {
    /// Creates a record starting now.
    pub fn new(
        subject_id: impl Into<String>,
        duration_hours: f64,
        reason: impl Into<String>,
        locked_by: LockedBy,
        admin_id: Option<String>,
    ) -> Self {
        let locked_at_ms = Utc::now().timestamp_millis();
        Self {
            id: generate_lock_id(),
            subject_id: subject_id.into(),
            locked_at_ms,
            duration_hours,
            reason: reason.into(),
            locked_by,
            admin_id,
            expires_at_ms: locked_at_ms + (duration_hours * MS_PER_HOUR) as i64,
        }
    }

    /// True once the expiry time has been reached.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// True once the expiry time has been reached (wall clock).
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Remaining lock time in milliseconds; zero once expired.
    pub fn remaining_ms_at(&self, now_ms: i64) -> i64 {
        (self.expires_at_ms - now_ms).max(0)
    }

    /// Remaining lock time in milliseconds (wall clock).
    pub fn remaining_ms(&self) -> i64 {
        self.remaining_ms_at(Utc::now().timestamp_millis())
    }
}

/// A lock record annotated with remaining time, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// The underlying record.
    pub record: LockRecord,
    /// Milliseconds until expiry at the time of the query.
    pub remaining_ms: i64,
}

/// Generates an opaque 32-hex-character lock id.
fn generate_lock_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
