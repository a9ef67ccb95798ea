//! Timestamp utilities
//!
//! All wall-clock values exchanged between participants are milliseconds
//! since the Unix epoch.

use chrono::Utc;

/// Current wall-clock time in milliseconds since the epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
