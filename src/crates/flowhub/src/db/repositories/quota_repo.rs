//! Quota repository
//!
//! Admission is a single guarded UPDATE so two concurrent admissions
//! with one remaining slot leave exactly one winner. The reset rolls
//! the window forward before the decrement is attempted.

use chrono::Utc;

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use crate::db::models::quota::{next_reset, QuotaRow};

/// Quota database operations
pub struct QuotaRepository;

impl QuotaRepository {
    /// Fetch the user's quota row, creating it with defaults when absent
    pub async fn get_or_create(
        pool: &DatabasePool,
        user_id: &str,
        default_limit: i64,
        utc_offset_minutes: i64,
    ) -> Result<QuotaRow, DatabaseError> {
        sqlx::query(
            "INSERT OR IGNORE INTO quotas (user_id, limit_per_day, used_today, resets_at,
                                           utc_offset_minutes)
             VALUES (?, ?, 0, ?, ?)",
        )
        .bind(user_id)
        .bind(default_limit)
        .bind(next_reset(Utc::now(), utc_offset_minutes).to_rfc3339())
        .bind(utc_offset_minutes)
        .execute(pool)
        .await?;

        Self::roll_window(pool, user_id).await?;

        Ok(
            sqlx::query_as::<_, QuotaRow>("SELECT * FROM quotas WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(pool)
                .await?,
        )
    }

    /// Reset the counter when the window elapsed
    async fn roll_window(pool: &DatabasePool, user_id: &str) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, QuotaRow>("SELECT * FROM quotas WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        let Some(row) = row else { return Ok(()) };

        if row.resets_at.as_str() <= now.to_rfc3339().as_str() {
            sqlx::query(
                "UPDATE quotas SET used_today = 0, resets_at = ?
                 WHERE user_id = ? AND resets_at = ?",
            )
            .bind(next_reset(now, row.utc_offset_minutes).to_rfc3339())
            .bind(user_id)
            .bind(&row.resets_at)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Atomically consume one slot; `Ok(true)` means admitted
    pub async fn try_consume(pool: &DatabasePool, user_id: &str) -> Result<bool, DatabaseError> {
        Self::roll_window(pool, user_id).await?;
        let result = sqlx::query(
            "UPDATE quotas SET used_today = used_today + 1
             WHERE user_id = ? AND used_today < limit_per_day",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
