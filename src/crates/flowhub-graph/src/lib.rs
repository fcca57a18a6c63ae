//! Workflow graph model for flowhub
//!
//! This crate defines the data model for user-composed agent workflows:
//! typed nodes, kinded edges, structural validation, canonical
//! serialization, immutable version snapshots, and version diffing.
//!
//! The model is deliberately free of execution concerns. Compiling a
//! graph into a runnable plan and evaluating nodes lives in
//! `flowhub-engine`; this crate only answers "is this graph well-formed"
//! and "how do two versions differ".
//!
//! # Overview
//!
//! - [`Graph`] - nodes and edges as submitted by the editor
//! - [`Node`] / [`NodeKind`] - tagged node variants (input, llm, skill,
//!   transform, output)
//! - [`Edge`] / [`EdgeKind`] - data, control and error edges
//! - [`VersionSnapshot`] / [`Workflow`] - versioned aggregate with history
//! - [`GraphDiff`] - node/edge additions, removals and modifications
//!   between two snapshots

pub mod canonical;
pub mod diff;
pub mod edge;
pub mod error;
pub mod graph;
pub mod node;
pub mod version;

pub use canonical::{canonical_edge, canonical_graph, canonical_node, canonical_value};
pub use diff::{EdgeChange, GraphDiff, NodeChange};
pub use edge::{Edge, EdgeKind};
pub use error::{GraphError, Result};
pub use graph::Graph;
pub use node::{InputType, Node, NodeKind, OutputFormat, Position, TransformKind};
pub use version::{BilingualText, TriggerType, VersionSnapshot, Workflow};
