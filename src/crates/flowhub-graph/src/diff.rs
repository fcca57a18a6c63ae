//! Diff computation between two graph versions
//!
//! The diff is keyed by element id: additions, removals, and elements
//! whose canonical form changed. Result ordering is deterministic
//! (ascending by id) so diffs are directly comparable in tests and
//! stable in API responses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::{canonical_edge, canonical_node};
use crate::edge::Edge;
use crate::graph::Graph;
use crate::node::Node;

/// A node whose attributes changed between two versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeChange {
    /// The node as of the older version
    pub before: Node,
    /// The node as of the newer version
    pub after: Node,
}

/// An edge whose attributes changed between two versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeChange {
    /// The edge as of the older version
    pub before: Edge,
    /// The edge as of the newer version
    pub after: Edge,
}

/// Differences between two graph snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GraphDiff {
    /// Nodes present only in the newer version, ascending by id
    pub nodes_added: Vec<Node>,
    /// Nodes present only in the older version, ascending by id
    pub nodes_removed: Vec<Node>,
    /// Nodes whose canonical form changed, ascending by id
    pub nodes_modified: Vec<NodeChange>,
    /// Edges present only in the newer version, ascending by id
    pub edges_added: Vec<Edge>,
    /// Edges present only in the older version, ascending by id
    pub edges_removed: Vec<Edge>,
    /// Edges whose canonical form changed, ascending by id
    pub edges_modified: Vec<EdgeChange>,
}

impl GraphDiff {
    /// True when the two versions are canonically identical
    pub fn is_empty(&self) -> bool {
        self.nodes_added.is_empty()
            && self.nodes_removed.is_empty()
            && self.nodes_modified.is_empty()
            && self.edges_added.is_empty()
            && self.edges_removed.is_empty()
            && self.edges_modified.is_empty()
    }

    /// Compute the diff from `older` to `newer`
    pub fn between(older: &Graph, newer: &Graph) -> Self {
        let old_nodes: BTreeMap<&str, &Node> =
            older.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let new_nodes: BTreeMap<&str, &Node> =
            newer.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let old_edges: BTreeMap<&str, &Edge> =
            older.edges.iter().map(|e| (e.id.as_str(), e)).collect();
        let new_edges: BTreeMap<&str, &Edge> =
            newer.edges.iter().map(|e| (e.id.as_str(), e)).collect();

        let mut diff = GraphDiff::default();

        for (id, node) in &new_nodes {
            match old_nodes.get(id) {
                None => diff.nodes_added.push((*node).clone()),
                Some(old) if canonical_node(old) != canonical_node(node) => {
                    diff.nodes_modified.push(NodeChange {
                        before: (*old).clone(),
                        after: (*node).clone(),
                    });
                }
                Some(_) => {}
            }
        }
        for (id, node) in &old_nodes {
            if !new_nodes.contains_key(id) {
                diff.nodes_removed.push((*node).clone());
            }
        }

        for (id, edge) in &new_edges {
            match old_edges.get(id) {
                None => diff.edges_added.push((*edge).clone()),
                Some(old) if canonical_edge(old) != canonical_edge(edge) => {
                    diff.edges_modified.push(EdgeChange {
                        before: (*old).clone(),
                        after: (*edge).clone(),
                    });
                }
                Some(_) => {}
            }
        }
        for (id, edge) in &old_edges {
            if !new_edges.contains_key(id) {
                diff.edges_removed.push((*edge).clone());
            }
        }

        // BTreeMap iteration already yields ascending ids; the pushes
        // above preserve that order.
        diff
    }
}
