//! Edges of the workflow graph
//!
//! Edges carry a kind: `data` edges move values forward, `control` edges
//! gate re-entry (loops), and `error` edges route a node's failure value
//! to a recovery path instead of failing the whole execution.

use serde::{Deserialize, Serialize};

/// How an edge participates in scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Value dependency; target waits for source output
    #[default]
    Data,
    /// Scheduling trigger; may close a loop back to an upstream node
    Control,
    /// Taken only when the source node fails
    Error,
}

impl EdgeKind {
    /// String form used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Data => "data",
            EdgeKind::Control => "control",
            EdgeKind::Error => "error",
        }
    }
}

/// A directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Id unique within the graph
    pub id: String,

    /// Source node id
    pub source: String,

    /// Target node id
    pub target: String,

    /// Optional output handle on the source node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,

    /// Optional input handle on the target node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,

    /// Edge kind; defaults to `data`
    #[serde(default)]
    pub kind: EdgeKind,
}

impl Edge {
    /// Create a data edge between two nodes
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            kind: EdgeKind::Data,
        }
    }

    /// Builder method to set the edge kind
    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder method to set source/target handles
    pub fn with_handles(
        mut self,
        source_handle: Option<String>,
        target_handle: Option<String>,
    ) -> Self {
        self.source_handle = source_handle;
        self.target_handle = target_handle;
        self
    }

    /// Handle pair used to distinguish parallel edges between one node pair
    pub fn handle_pair(&self) -> (Option<&str>, Option<&str>) {
        (self.source_handle.as_deref(), self.target_handle.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_defaults_to_data() {
        let edge: Edge = serde_json::from_str(
            r#"{"id": "e1", "source": "a", "target": "b"}"#,
        )
        .unwrap();
        assert_eq!(edge.kind, EdgeKind::Data);
    }

    #[test]
    fn test_edge_kind_serialization() {
        let edge = Edge::new("e1", "a", "b").with_kind(EdgeKind::Error);
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["kind"], "error");
    }
}
