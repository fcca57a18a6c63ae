//! Execution repository
//!
//! Executions are append-only: a row is inserted at admission and
//! finalized exactly once with the terminal record and full step log.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use flowhub_engine::{ExecutionRecord, ExecutionStatus, StepEvent};

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use crate::db::models::ExecutionRow;

/// Execution database operations
pub struct ExecutionRepository;

impl ExecutionRepository {
    /// Insert the row for a freshly admitted run
    pub async fn create_pending(
        pool: &DatabasePool,
        id: Uuid,
        workflow_id: Uuid,
        workflow_version: u32,
        user_id: &str,
        input_envelope: &Value,
    ) -> Result<(), DatabaseError> {
        let row = ExecutionRow::pending(id, workflow_id, workflow_version, user_id, input_envelope)?;
        sqlx::query(
            "INSERT INTO executions (id, workflow_id, workflow_version, user_id, status,
                                     input_envelope, step_log, started_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.workflow_id)
        .bind(row.workflow_version)
        .bind(&row.user_id)
        .bind(&row.status)
        .bind(&row.input_envelope)
        .bind(&row.step_log)
        .bind(&row.started_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fetch an execution row by id
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<ExecutionRow>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?,
        )
    }

    /// Update only the live status of a non-terminal run
    pub async fn update_status(
        pool: &DatabasePool,
        id: &str,
        status: ExecutionStatus,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE executions SET status = ? WHERE id = ?
             AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Finalize the row with the terminal record and full step log
    pub async fn finalize(
        pool: &DatabasePool,
        record: &ExecutionRecord,
        step_log: &[StepEvent],
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE executions
             SET status = ?, step_log = ?, final_output = ?, error = ?, token_usage = ?,
                 finished_at = ?
             WHERE id = ?",
        )
        .bind(record.status.as_str())
        .bind(serde_json::to_string(step_log)?)
        .bind(
            record
                .final_output
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(record.error.as_ref().map(serde_json::to_string).transpose()?)
        .bind(
            record
                .token_usage
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(
            record
                .finished_at
                .unwrap_or_else(Utc::now)
                .to_rfc3339(),
        )
        .bind(record.id.to_string())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List a user's executions, newest first, optional status filter
    pub async fn list_for_user(
        pool: &DatabasePool,
        user_id: &str,
        status: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionRow>, DatabaseError> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, ExecutionRow>(
                    "SELECT * FROM executions WHERE user_id = ? AND status = ?
                     ORDER BY started_at DESC LIMIT ? OFFSET ?",
                )
                .bind(user_id)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ExecutionRow>(
                    "SELECT * FROM executions WHERE user_id = ?
                     ORDER BY started_at DESC LIMIT ? OFFSET ?",
                )
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// List executions of one workflow, newest first
    pub async fn list_for_workflow(
        pool: &DatabasePool,
        workflow_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM executions WHERE workflow_id = ?
             ORDER BY started_at DESC LIMIT ? OFFSET ?",
        )
        .bind(workflow_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?)
    }
}
