//! SQLite checkpoint store
//!
//! Implements the engine's [`CheckpointStore`] over the checkpoints
//! table, plus the retention sweep removing checkpoints of terminal
//! executions past the horizon.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use flowhub_engine::{Checkpoint, CheckpointStore, EngineError};

use crate::db::connection::DatabasePool;

#[derive(Debug, Clone, FromRow)]
struct CheckpointRow {
    execution_id: String,
    number: i64,
    after_node_id: String,
    node_outputs: String,
    frontier: String,
    last_seq: i64,
    at: String,
}

impl CheckpointRow {
    fn into_checkpoint(self) -> Result<Checkpoint, EngineError> {
        let node_outputs: HashMap<String, serde_json::Value> =
            serde_json::from_str(&self.node_outputs)
                .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        let frontier: BTreeSet<String> = serde_json::from_str(&self.frontier)
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        Ok(Checkpoint {
            execution_id: Uuid::parse_str(&self.execution_id).unwrap_or_else(|_| Uuid::nil()),
            number: self.number as u64,
            after_node_id: self.after_node_id,
            node_outputs,
            frontier,
            last_seq: self.last_seq as u64,
            at: DateTime::parse_from_rfc3339(&self.at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

/// Checkpoint persistence over SQLite
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    /// Create a store over the shared pool
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Delete checkpoints of terminal executions finished before the
    /// horizon; returns the number of deleted rows
    pub async fn gc_terminal_older_than(
        &self,
        horizon: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let result = sqlx::query(
            "DELETE FROM checkpoints WHERE execution_id IN (
                 SELECT id FROM executions
                 WHERE status IN ('completed', 'failed', 'cancelled')
                   AND finished_at IS NOT NULL AND finished_at < ?
             )",
        )
        .bind(horizon.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO checkpoints (execution_id, number, after_node_id, node_outputs,
                                      frontier, last_seq, at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(checkpoint.execution_id.to_string())
        .bind(checkpoint.number as i64)
        .bind(&checkpoint.after_node_id)
        .bind(
            serde_json::to_string(&checkpoint.node_outputs)
                .map_err(|e| EngineError::Checkpoint(e.to_string()))?,
        )
        .bind(
            serde_json::to_string(&checkpoint.frontier)
                .map_err(|e| EngineError::Checkpoint(e.to_string()))?,
        )
        .bind(checkpoint.last_seq as i64)
        .bind(checkpoint.at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        Ok(())
    }

    async fn load_latest(&self, execution_id: Uuid) -> Result<Option<Checkpoint>, EngineError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            "SELECT * FROM checkpoints WHERE execution_id = ?
             ORDER BY number DESC LIMIT 1",
        )
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    async fn delete_all(&self, execution_id: Uuid) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM checkpoints WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Checkpoint(e.to_string()))?;
        Ok(())
    }
}
