//! The workflow graph and its structural invariants
//!
//! A graph is valid when:
//! - node ids are unique and non-empty
//! - edge ids are unique, endpoints reference existing nodes
//! - no edge is a self-loop
//! - parallel edges between the same node pair differ in handles
//! - every cycle contains at least one `control` edge (equivalently,
//!   the subgraph of non-control edges is acyclic)
//! - each node passes its kind-specific validation

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::edge::{Edge, EdgeKind};
use crate::error::{GraphError, Result};
use crate::node::Node;

/// A directed workflow graph as composed in the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Graph {
    /// Nodes, keyed by unique string ids
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Directed edges between nodes
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge
    pub fn add_edge(&mut self, edge: Edge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Look up an edge by id
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Edges entering the given node
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Edges leaving the given node
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Validate all structural invariants
    pub fn validate(&self) -> Result<()> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            node.validate()?;
            if !node_ids.insert(node.id.as_str()) {
                return Err(GraphError::invalid_node(&node.id, "duplicate node id"));
            }
        }

        let mut edge_ids = HashSet::new();
        let mut pairs: HashMap<(&str, &str), Vec<&Edge>> = HashMap::new();

        for edge in &self.edges {
            if edge.id.trim().is_empty() {
                return Err(GraphError::invalid_edge(&edge.id, "edge id must not be empty"));
            }
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(GraphError::invalid_edge(&edge.id, "duplicate edge id"));
            }
            if !node_ids.contains(edge.source.as_str()) {
                return Err(GraphError::invalid_edge(
                    &edge.id,
                    format!("source '{}' does not exist", edge.source),
                ));
            }
            if !node_ids.contains(edge.target.as_str()) {
                return Err(GraphError::invalid_edge(
                    &edge.id,
                    format!("target '{}' does not exist", edge.target),
                ));
            }
            if edge.source == edge.target {
                return Err(GraphError::invalid_edge(&edge.id, "self-loops are not allowed"));
            }

            let siblings = pairs
                .entry((edge.source.as_str(), edge.target.as_str()))
                .or_default();
            if siblings.iter().any(|e| e.handle_pair() == edge.handle_pair()) {
                return Err(GraphError::invalid_edge(
                    &edge.id,
                    "parallel edge with identical handles",
                ));
            }
            siblings.push(edge);
        }

        self.check_cycles_have_control()?;

        Ok(())
    }

    /// Every cycle must contain at least one control edge. Equivalent
    /// formulation checked here: the subgraph of non-control edges must
    /// be acyclic (Kahn's algorithm; leftover nodes sit on a cycle).
    fn check_cycles_have_control(&self) -> Result<()> {
        let mut indegree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

        for edge in &self.edges {
            if edge.kind == EdgeKind::Control {
                continue;
            }
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
            *indegree.entry(edge.target.as_str()).or_insert(0) += 1;
        }

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(next) = adjacency.get(id) {
                for target in next {
                    if let Some(d) = indegree.get_mut(target) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(target);
                        }
                    }
                }
            }
        }

        if visited != self.nodes.len() {
            let mut stuck: Vec<&str> = indegree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(id, _)| *id)
                .collect();
            stuck.sort_unstable();
            return Err(GraphError::Validation(format!(
                "cycle without a control edge through nodes [{}]",
                stuck.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InputType, NodeKind, OutputFormat};
    use serde_json::json;

    fn input_node(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::Input {
                input_type: InputType::Text,
                default: Some(json!("x")),
            },
        )
    }

    fn output_node(id: &str) -> Node {
        Node::new(id, NodeKind::Output { format: OutputFormat::Auto })
    }

    #[test]
    fn test_valid_linear_graph() {
        let mut graph = Graph::new();
        graph.add_node(input_node("in"));
        graph.add_node(output_node("out"));
        graph.add_edge(Edge::new("e1", "in", "out"));

        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let mut graph = Graph::new();
        graph.add_node(input_node("a"));
        graph.add_node(input_node("a"));

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate node id"));
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = Graph::new();
        graph.add_node(input_node("a"));
        graph.add_edge(Edge::new("e1", "a", "a"));

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("self-loops"));
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let mut graph = Graph::new();
        graph.add_node(input_node("a"));
        graph.add_edge(Edge::new("e1", "a", "ghost"));

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_parallel_edges_need_distinct_handles() {
        let mut graph = Graph::new();
        graph.add_node(input_node("a"));
        graph.add_node(output_node("b"));
        graph.add_edge(Edge::new("e1", "a", "b"));
        graph.add_edge(Edge::new("e2", "a", "b"));

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("identical handles"));

        // Distinct handles make the second edge legal
        let mut graph = Graph::new();
        graph.add_node(input_node("a"));
        graph.add_node(output_node("b"));
        graph.add_edge(Edge::new("e1", "a", "b"));
        graph.add_edge(
            Edge::new("e2", "a", "b").with_handles(Some("alt".to_string()), None),
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_data_cycle_rejected() {
        let mut graph = Graph::new();
        graph.add_node(input_node("a"));
        graph.add_node(output_node("b"));
        graph.add_edge(Edge::new("e1", "a", "b"));
        graph.add_edge(Edge::new("e2", "b", "a"));

        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("cycle without a control edge"));
    }

    #[test]
    fn test_cycle_with_control_edge_allowed() {
        let mut graph = Graph::new();
        graph.add_node(input_node("a"));
        graph.add_node(output_node("b"));
        graph.add_edge(Edge::new("e1", "a", "b"));
        graph.add_edge(Edge::new("e2", "b", "a").with_kind(EdgeKind::Control));

        assert!(graph.validate().is_ok());
    }
}
