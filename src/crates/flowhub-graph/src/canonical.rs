//! Canonical serialization of graph elements
//!
//! Canonical form is a deterministic, field-sorted JSON rendering with
//! purely visual attributes removed. Two nodes (or edges, or graphs)
//! are semantically equal iff their canonical strings are byte-equal.
//! Diff and revert comparisons run over canonical form so that moving a
//! node on the canvas never shows up as a modification.

use serde_json::{Map, Value};

use crate::edge::Edge;
use crate::graph::Graph;
use crate::node::Node;

/// Attributes stripped before canonicalization. These only affect
/// rendering, never execution.
const VISUAL_ATTRIBUTES: &[&str] = &["position", "extra"];

/// Recursively sort object keys to produce a deterministic value
pub fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonical_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

fn strip_visual(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            for attr in VISUAL_ATTRIBUTES {
                map.remove(*attr);
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Canonical string for a node, visual attributes excluded
pub fn canonical_node(node: &Node) -> String {
    let value = serde_json::to_value(node).unwrap_or(Value::Null);
    canonical_value(&strip_visual(value)).to_string()
}

/// Canonical string for an edge
pub fn canonical_edge(edge: &Edge) -> String {
    let value = serde_json::to_value(edge).unwrap_or(Value::Null);
    canonical_value(&strip_visual(value)).to_string()
}

/// Canonical string for a whole graph: nodes and edges sorted by id,
/// each in canonical element form
pub fn canonical_graph(graph: &Graph) -> String {
    let mut nodes: Vec<&Node> = graph.nodes.iter().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    let mut edges: Vec<&Edge> = graph.edges.iter().collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));

    let rendered_nodes: Vec<Value> = nodes
        .iter()
        .map(|n| {
            serde_json::from_str(&canonical_node(n)).unwrap_or(Value::Null)
        })
        .collect();
    let rendered_edges: Vec<Value> = edges
        .iter()
        .map(|e| {
            serde_json::from_str(&canonical_edge(e)).unwrap_or(Value::Null)
        })
        .collect();

    let mut top = Map::new();
    top.insert("edges".to_string(), Value::Array(rendered_edges));
    top.insert("nodes".to_string(), Value::Array(rendered_nodes));
    Value::Object(top).to_string()
}
