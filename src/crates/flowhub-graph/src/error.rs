//! Error types for graph construction, validation and versioning
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//! Validation failures carry the id of the offending node or edge so the
//! editor can localize the problem on the canvas.

use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors produced by the graph model
#[derive(Debug, Error)]
pub enum GraphError {
    /// Graph structure validation failed, localized to a node
    #[error("Invalid node '{node}': {reason}")]
    InvalidNode {
        /// Id of the offending node
        node: String,
        /// What is wrong with it
        reason: String,
    },

    /// Graph structure validation failed, localized to an edge
    #[error("Invalid edge '{edge}': {reason}")]
    InvalidEdge {
        /// Id of the offending edge
        edge: String,
        /// What is wrong with it
        reason: String,
    },

    /// Graph-level structural violation (cycles without control edges, etc)
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A version number that is neither current nor in history
    #[error("Unknown version {version} for workflow {workflow_id}")]
    UnknownVersion {
        /// Workflow the lookup ran against
        workflow_id: String,
        /// The missing version number
        version: u32,
    },

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Build a node-localized validation error
    pub fn invalid_node(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Build an edge-localized validation error
    pub fn invalid_edge(edge: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEdge {
            edge: edge.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_node_display() {
        let err = GraphError::invalid_node("llm-1", "temperature out of range");
        assert_eq!(
            err.to_string(),
            "Invalid node 'llm-1': temperature out of range"
        );
    }

    #[test]
    fn test_unknown_version_display() {
        let err = GraphError::UnknownVersion {
            workflow_id: "wf-1".to_string(),
            version: 7,
        };
        assert!(err.to_string().contains("version 7"));
    }
}
