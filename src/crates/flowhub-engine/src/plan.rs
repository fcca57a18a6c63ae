//! Plan compilation
//!
//! Classifies the graph's edges and validates executability:
//! - data and control edges form the forward dependency structure
//! - error edges define recovery paths taken only on source failure
//! - every non-Input node needs an incoming data edge or a control
//!   trigger (or an error edge, for recovery branches)
//! - every terminal node (no outgoing edges) must be an Output

use std::collections::HashMap;

use flowhub_graph::{Edge, EdgeKind, Graph, Node, NodeKind};

use crate::error::{EngineError, Result};

/// Per-node view of the compiled plan
#[derive(Debug, Clone, Default)]
pub struct NodeLinks {
    /// Ids of incoming data edges
    pub in_data: Vec<String>,
    /// Ids of incoming control edges
    pub in_control: Vec<String>,
    /// Ids of incoming error edges
    pub in_error: Vec<String>,
    /// Ids of outgoing data edges
    pub out_data: Vec<String>,
    /// Ids of outgoing control edges
    pub out_control: Vec<String>,
    /// Ids of outgoing error edges
    pub out_error: Vec<String>,
}

/// A validated, dependency-classified view of a graph, ready to run
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    links: HashMap<String, NodeLinks>,
    entry: Vec<String>,
}

impl ExecutionPlan {
    /// Compile a graph into a plan
    ///
    /// The graph must already satisfy the model-level invariants; this
    /// re-validates them and adds executability checks.
    pub fn compile(graph: &Graph) -> Result<Self> {
        graph.validate()?;

        let nodes: HashMap<String, Node> = graph
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect();
        let edges: HashMap<String, Edge> = graph
            .edges
            .iter()
            .map(|e| (e.id.clone(), e.clone()))
            .collect();

        let mut links: HashMap<String, NodeLinks> = nodes
            .keys()
            .map(|id| (id.clone(), NodeLinks::default()))
            .collect();

        for edge in graph.edges.iter() {
            let source = links.entry(edge.source.clone()).or_default();
            match edge.kind {
                EdgeKind::Data => source.out_data.push(edge.id.clone()),
                EdgeKind::Control => source.out_control.push(edge.id.clone()),
                EdgeKind::Error => source.out_error.push(edge.id.clone()),
            }
            let target = links.entry(edge.target.clone()).or_default();
            match edge.kind {
                EdgeKind::Data => target.in_data.push(edge.id.clone()),
                EdgeKind::Control => target.in_control.push(edge.id.clone()),
                EdgeKind::Error => target.in_error.push(edge.id.clone()),
            }
        }

        // Deterministic edge ordering within each link list
        for link in links.values_mut() {
            link.in_data.sort();
            link.in_control.sort();
            link.in_error.sort();
            link.out_data.sort();
            link.out_control.sort();
            link.out_error.sort();
        }

        let mut entry: Vec<String> = Vec::new();
        for node in graph.nodes.iter() {
            let link = &links[&node.id];
            let has_incoming =
                !link.in_data.is_empty() || !link.in_control.is_empty() || !link.in_error.is_empty();

            // Entry set: input nodes not fed by data, and nodes with no
            // incoming edges at all. Nodes reached only by error edges
            // are recovery branches and wait for their trigger.
            match &node.kind {
                NodeKind::Input { .. } => {
                    if link.in_data.is_empty() {
                        entry.push(node.id.clone());
                    }
                }
                _ if !has_incoming => entry.push(node.id.clone()),
                _ => {}
            }

            // Terminal nodes must be outputs
            let has_outgoing = !link.out_data.is_empty()
                || !link.out_control.is_empty()
                || !link.out_error.is_empty();
            if !has_outgoing && !matches!(node.kind, NodeKind::Output { .. }) {
                return Err(EngineError::Plan(format!(
                    "terminal node '{}' is not an output",
                    node.id
                )));
            }
        }

        entry.sort();

        if entry.is_empty() {
            return Err(EngineError::Plan("graph has no entry nodes".to_string()));
        }

        Ok(Self {
            nodes,
            edges,
            links,
            entry,
        })
    }

    /// Entry nodes: inputs and nodes with no incoming edges
    pub fn entry_nodes(&self) -> &[String] {
        &self.entry
    }

    /// Node lookup
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Edge lookup
    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Link view for a node
    pub fn links(&self, id: &str) -> Option<&NodeLinks> {
        self.links.get(id)
    }

    /// All node ids, ascending
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of Output nodes
    pub fn output_nodes(&self) -> Vec<&Node> {
        let mut outputs: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Output { .. }))
            .collect();
        outputs.sort_by(|a, b| a.id.cmp(&b.id));
        outputs
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the plan has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
