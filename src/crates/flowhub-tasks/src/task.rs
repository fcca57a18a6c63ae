//! Task specification and handler trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalogue::CatalogueStore;
use crate::error::Result;
use crate::queue::Broker;

/// Logical queue names
pub mod queues {
    /// Discovery crawlers
    pub const CRAWLERS: &str = "crawlers";
    /// LLM enrichment
    pub const ENRICHMENT: &str = "enrichment";
    /// Search index synchronization
    pub const INDEXING: &str = "indexing";
}

/// One enqueued unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique task id
    pub id: Uuid,
    /// Handler name this task resolves to
    pub kind: String,
    /// Queue the task is routed to
    pub queue: String,
    /// Handler-specific payload
    pub payload: Value,
    /// Attempts made so far
    pub attempt: u32,
    /// Attempts allowed in total
    pub max_attempts: u32,
    /// When the task was first enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the task may be leased
    pub not_before: Option<DateTime<Utc>>,
}

impl TaskSpec {
    /// Create a task for the given kind, routed to `queue`
    pub fn new(kind: impl Into<String>, queue: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            queue: queue.into(),
            payload,
            attempt: 0,
            max_attempts: 3,
            enqueued_at: Utc::now(),
            not_before: None,
        }
    }

    /// Set the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether the task may still be retried after a failure
    pub fn retries_left(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }
}

/// Collaborators available to every handler
#[derive(Clone)]
pub struct TaskContext {
    /// Broker for enqueueing follow-up tasks
    pub broker: Arc<dyn Broker>,
    /// Catalogue persistence
    pub catalogue: Arc<dyn CatalogueStore>,
}

/// A named task handler
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handler name; tasks reference it by `kind`
    fn kind(&self) -> &str;

    /// Queue this handler's tasks route to
    fn queue(&self) -> &str;

    /// Attempt budget for this kind (network/LLM default 3,
    /// pure-compute kinds override with 1)
    fn max_attempts(&self) -> u32 {
        3
    }

    /// Execute one task
    async fn run(&self, ctx: &TaskContext, payload: Value) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retries_left() {
        let mut task = TaskSpec::new("k", queues::CRAWLERS, json!({}));
        assert!(task.retries_left());
        task.attempt = 2;
        assert!(!task.retries_left());
    }

    #[test]
    fn test_spec_round_trip() {
        let task = TaskSpec::new("discover.producthunt", queues::CRAWLERS, json!({"a": 1}));
        let text = serde_json::to_string(&task).unwrap();
        let back: TaskSpec = serde_json::from_str(&text).unwrap();
        assert_eq!(task, back);
    }
}
