//! Execution status machine and final record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::NodeFailure;
use flowhub_llm::TokenUsage;

/// Lifecycle of one execution
///
/// ```text
/// pending → running → (streaming ↔ running) → completed
///                 \→ failed
///                 \→ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// String form stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Streaming => "streaming",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "streaming" => Some(ExecutionStatus::Streaming),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            "cancelled" => Some(ExecutionStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Whether `self → next` is an allowed transition
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Streaming) | (Streaming, Running) => true,
            (Running | Streaming, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

/// Final record of one run, persisted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution id
    pub id: Uuid,
    /// Workflow that ran
    pub workflow_id: Uuid,
    /// The version that was executed
    pub workflow_version: u32,
    /// Invoking user
    pub user_id: String,
    /// Terminal status
    pub status: ExecutionStatus,
    /// The run's input envelope
    pub input_envelope: Value,
    /// Values of completed Output nodes keyed by node envelope key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    /// Terminal error when `status` is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,
    /// Accumulated LLM token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Run start time
    pub started_at: DateTime<Utc>,
    /// Run end time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of step events emitted
    pub step_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Streaming.is_terminal());
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        assert!(!ExecutionStatus::Completed.can_transition_to(ExecutionStatus::Running));
        assert!(!ExecutionStatus::Cancelled.can_transition_to(ExecutionStatus::Failed));
    }

    #[test]
    fn test_streaming_bounce() {
        assert!(ExecutionStatus::Running.can_transition_to(ExecutionStatus::Streaming));
        assert!(ExecutionStatus::Streaming.can_transition_to(ExecutionStatus::Running));
        assert!(ExecutionStatus::Streaming.can_transition_to(ExecutionStatus::Cancelled));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Streaming,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
    }
}
