//! Checkpoint persistence for resumable executions
//!
//! A checkpoint records the node outputs accumulated so far and the
//! frontier of nodes ready to dispatch. Only the latest checkpoint is
//! needed for resume; stores may retain older ones for audit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Persisted intermediate state of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Execution this checkpoint belongs to
    pub execution_id: Uuid,
    /// Monotonic checkpoint number within the execution
    pub number: u64,
    /// Node whose completion triggered this checkpoint
    pub after_node_id: String,
    /// Outputs of all completed nodes, keyed by node id
    pub node_outputs: HashMap<String, Value>,
    /// Nodes ready to dispatch (or in flight) at checkpoint time
    pub frontier: BTreeSet<String>,
    /// Highest event sequence number emitted before the checkpoint;
    /// a resumed run continues numbering after it
    pub last_seq: u64,
    /// When the checkpoint was taken
    pub at: DateTime<Utc>,
}

/// Storage backend for checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load the latest checkpoint of an execution
    async fn load_latest(&self, execution_id: Uuid) -> Result<Option<Checkpoint>>;

    /// Delete all checkpoints of an execution
    async fn delete_all(&self, execution_id: Uuid) -> Result<()>;
}

/// In-memory store used by tests and single-process deployments
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<Uuid, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints retained for an execution
    pub fn count(&self, execution_id: Uuid) -> usize {
        self.checkpoints
            .lock()
            .get(&execution_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut store = self.checkpoints.lock();
        let entries = store.entry(checkpoint.execution_id).or_default();
        if let Some(last) = entries.last() {
            if checkpoint.number <= last.number {
                return Err(EngineError::Checkpoint(format!(
                    "checkpoint number {} not monotonic (last {})",
                    checkpoint.number, last.number
                )));
            }
        }
        entries.push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, execution_id: Uuid) -> Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .get(&execution_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn delete_all(&self, execution_id: Uuid) -> Result<()> {
        self.checkpoints.lock().remove(&execution_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checkpoint(execution_id: Uuid, number: u64) -> Checkpoint {
        Checkpoint {
            execution_id,
            number,
            after_node_id: "n".to_string(),
            node_outputs: HashMap::from([("n".to_string(), json!(1))]),
            frontier: BTreeSet::from(["next".to_string()]),
            last_seq: number * 2,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_latest_wins() {
        let store = InMemoryCheckpointStore::new();
        let id = Uuid::new_v4();
        store.save(checkpoint(id, 1)).await.unwrap();
        store.save(checkpoint(id, 2)).await.unwrap();

        let latest = store.load_latest(id).await.unwrap().unwrap();
        assert_eq!(latest.number, 2);
        assert_eq!(store.count(id), 2);
    }

    #[tokio::test]
    async fn test_non_monotonic_rejected() {
        let store = InMemoryCheckpointStore::new();
        let id = Uuid::new_v4();
        store.save(checkpoint(id, 2)).await.unwrap();
        assert!(store.save(checkpoint(id, 2)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = InMemoryCheckpointStore::new();
        let id = Uuid::new_v4();
        store.save(checkpoint(id, 1)).await.unwrap();
        store.delete_all(id).await.unwrap();
        assert!(store.load_latest(id).await.unwrap().is_none());
    }
}
