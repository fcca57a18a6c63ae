//! Quota row model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-user execution budget
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuotaRow {
    /// Owning user
    pub user_id: String,
    /// Daily allowance
    pub limit_per_day: i64,
    /// Runs admitted since the last reset
    pub used_today: i64,
    /// Next reset instant, UTC RFC3339
    pub resets_at: String,
    /// User-local offset recorded at registration
    pub utc_offset_minutes: i64,
}

impl QuotaRow {
    /// Remaining budget
    pub fn remaining(&self) -> i64 {
        (self.limit_per_day - self.used_today).max(0)
    }
}

/// Next user-local midnight after `now`, expressed in UTC
///
/// The offset is minutes east of UTC as recorded at registration.
pub fn next_reset(now: DateTime<Utc>, utc_offset_minutes: i64) -> DateTime<Utc> {
    let offset = Duration::minutes(utc_offset_minutes);
    let local = now + offset;
    let next_local_midnight = (local + Duration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| local.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default());
    DateTime::from_naive_utc_and_offset(next_local_midnight, Utc) - offset
}
