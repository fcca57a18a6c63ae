//! Engine errors and the structured node failure value

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use flowhub_llm::LlmError;
use flowhub_skills::SkillError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by plan compilation and run management
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph failed model-level validation
    #[error(transparent)]
    Graph(#[from] flowhub_graph::GraphError),

    /// The graph is valid as a document but not executable
    #[error("Plan compilation failed: {0}")]
    Plan(String),

    /// Run-level failure outside any single node
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Checkpoint persistence failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Unknown execution id
    #[error("Execution not found: {0}")]
    NotFound(String),
}

/// Structured failure produced by a node evaluation
///
/// When the failing node has an outgoing error edge, this value is
/// wrapped as `{"error": {...}}` and flows along the edge; otherwise it
/// becomes the execution's terminal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFailure {
    /// Stable kind string, e.g. `SkillHttpError`, `LLMFormatError`,
    /// `TransformError`, `LoopBudgetExceeded`, `Cancelled`
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Upstream HTTP status when relevant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Additional structured context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl NodeFailure {
    /// Create a failure with just a kind and message
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    /// Failure for a pure transform
    pub fn transform(message: impl Into<String>) -> Self {
        Self::new("TransformError", message)
    }

    /// Failure for an exhausted loop budget
    pub fn loop_budget(node: &str, cap: u32) -> Self {
        Self::new(
            "LoopBudgetExceeded",
            format!("node '{}' re-entered more than {} times", node, cap),
        )
    }

    /// Failure recorded when evaluation observed cancellation
    pub fn cancelled() -> Self {
        Self::new("Cancelled", "execution cancelled")
    }

    /// The value placed on an outgoing error edge
    pub fn as_edge_value(&self) -> Value {
        json!({ "error": self })
    }
}

impl From<SkillError> for NodeFailure {
    fn from(err: SkillError) -> Self {
        Self {
            kind: err.kind().to_string(),
            status: err.status(),
            message: err.to_string(),
            payload: None,
        }
    }
}

impl From<LlmError> for NodeFailure {
    fn from(err: LlmError) -> Self {
        Self {
            kind: err.kind().to_string(),
            status: match &err {
                LlmError::Status { status, .. } => Some(*status),
                _ => None,
            },
            message: err.to_string(),
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_value_shape() {
        let failure = NodeFailure {
            kind: "SkillHttpError".to_string(),
            message: "upstream 500".to_string(),
            status: Some(500),
            payload: None,
        };
        let value = failure.as_edge_value();
        assert_eq!(value["error"]["kind"], "SkillHttpError");
        assert_eq!(value["error"]["status"], 500);
    }

    #[test]
    fn test_skill_error_conversion() {
        let err = SkillError::Http {
            skill: "s".to_string(),
            status: 502,
            body: String::new(),
        };
        let failure = NodeFailure::from(err);
        assert_eq!(failure.kind, "SkillHttpError");
        assert_eq!(failure.status, Some(502));
    }

    #[test]
    fn test_llm_format_error_conversion() {
        let failure = NodeFailure::from(LlmError::Format("not json".to_string()));
        assert_eq!(failure.kind, "LLMFormatError");
    }
}
