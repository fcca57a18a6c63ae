//! Node variants of the workflow graph
//!
//! Nodes are a tagged enum over the five kinds the editor can place:
//! inputs, LLM calls, skill invocations, pure transforms and outputs.
//! Each node also carries an explicit `extra` payload map the engine
//! never interprets, so newer editors can attach attributes without a
//! server release.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{GraphError, Result};

/// Canvas position, purely visual. Excluded from canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Accepted input value types for [`NodeKind::Input`] nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Number,
    Json,
    File,
}

/// Transform operations available to [`NodeKind::Transform`] nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Pass the single input through unchanged
    Passthrough,
    /// Select a value by dotted path (`field`)
    Extract,
    /// Render a string with `{{name}}` substitutions (`template`)
    Template,
    /// Parse a string input as JSON
    JsonParse,
    /// Serialize the input to a JSON string
    JsonStringify,
    /// Join an array of values with `separator`
    ArrayJoin,
}

/// Output rendering hints for [`NodeKind::Output`] nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Auto,
    Text,
    Json,
    Markdown,
}

/// The behavior of a node, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Run input taken from the execution's input envelope
    Input {
        input_type: InputType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },

    /// A chat-completion call against the configured model provider
    Llm {
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system_prompt: Option<String>,
        prompt: String,
        #[serde(default = "default_temperature")]
        temperature: f64,
        #[serde(default)]
        json_output: bool,
    },

    /// Invocation of a registered external skill
    Skill { skill_id: String },

    /// Pure data transform
    Transform {
        kind: TransformKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
    },

    /// Branch terminal collected into the execution's final output
    Output {
        #[serde(default)]
        format: OutputFormat,
    },
}

fn default_temperature() -> f64 {
    1.0
}

impl NodeKind {
    /// Short kind name used in logs and step events
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Input { .. } => "input",
            NodeKind::Llm { .. } => "llm",
            NodeKind::Skill { .. } => "skill",
            NodeKind::Transform { .. } => "transform",
            NodeKind::Output { .. } => "output",
        }
    }
}

/// A single node of a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Id unique within the graph
    pub id: String,

    /// Optional human label; used as the input/output key when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// The node behavior
    #[serde(flatten)]
    pub kind: NodeKind,

    /// Canvas position, ignored by the backend except for round-tripping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,

    /// Forward-compatible attribute bag; not interpreted by the engine
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Node {
    /// Create a node with the given id and kind
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            kind,
            position: None,
            extra: BTreeMap::new(),
        }
    }

    /// Builder method to set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The key under which this node's value appears in input/output
    /// envelopes: the label when present, otherwise the id.
    pub fn envelope_key(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Validate kind-specific attribute constraints
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GraphError::invalid_node(&self.id, "node id must not be empty"));
        }

        match &self.kind {
            NodeKind::Llm {
                model,
                prompt,
                temperature,
                ..
            } => {
                if model.trim().is_empty() {
                    return Err(GraphError::invalid_node(&self.id, "llm model must not be empty"));
                }
                if prompt.trim().is_empty() {
                    return Err(GraphError::invalid_node(&self.id, "llm prompt must not be empty"));
                }
                if !(0.0..=2.0).contains(temperature) {
                    return Err(GraphError::invalid_node(
                        &self.id,
                        format!("temperature {} outside [0, 2]", temperature),
                    ));
                }
            }
            NodeKind::Skill { skill_id } => {
                if skill_id.trim().is_empty() {
                    return Err(GraphError::invalid_node(&self.id, "skill_id must not be empty"));
                }
            }
            NodeKind::Transform {
                kind,
                field,
                template,
                ..
            } => match kind {
                TransformKind::Extract if field.is_none() => {
                    return Err(GraphError::invalid_node(
                        &self.id,
                        "extract transform requires a field path",
                    ));
                }
                TransformKind::Template if template.is_none() => {
                    return Err(GraphError::invalid_node(
                        &self.id,
                        "template transform requires a template",
                    ));
                }
                _ => {}
            },
            NodeKind::Input { .. } | NodeKind::Output { .. } => {}
        }

        Ok(())
    }
}
