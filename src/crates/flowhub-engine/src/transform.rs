//! Pure transform evaluation
//!
//! Transforms never suspend and never retry. The binding context is an
//! object mapping upstream envelope keys to their values; templates use
//! handlebars-style `{{name}}` substitutions with dotted-path lookup.

use serde_json::{Map, Value};

use flowhub_graph::TransformKind;

use crate::error::NodeFailure;

/// Render `{{name}}` substitutions against the context
///
/// Names resolve as dotted paths (`user.name`, `s.error.kind`). Unknown
/// names render as an empty string. String values render raw; other
/// values render as compact JSON.
pub fn render_template(template: &str, context: &Value) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        rendered.push_str(&rest[..open]);
        match rest[open..].find("}}") {
            Some(close_offset) => {
                let name = rest[open + 2..open + close_offset].trim();
                if let Some(value) = lookup_path(context, name) {
                    rendered.push_str(&scalar_string(value));
                }
                rest = &rest[open + close_offset + 2..];
            }
            None => {
                rendered.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

/// Dotted-path lookup into a JSON value
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a value as a plain string: strings raw, the rest as JSON
pub fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Evaluate a transform node
///
/// `primary` is the value of the single incoming data edge, or the
/// whole binding context object when the node has several inputs.
/// `context` maps envelope keys of all completed upstream nodes.
pub fn apply(
    kind: TransformKind,
    field: Option<&str>,
    template: Option<&str>,
    separator: Option<&str>,
    primary: &Value,
    context: &Value,
) -> Result<Value, NodeFailure> {
    match kind {
        TransformKind::Passthrough => Ok(primary.clone()),

        TransformKind::Extract => {
            let path = field.ok_or_else(|| NodeFailure::transform("extract requires a field"))?;
            // Prefer the primary input; fall back to the full context so
            // paths can name sibling nodes
            lookup_path(primary, path)
                .or_else(|| lookup_path(context, path))
                .cloned()
                .ok_or_else(|| {
                    NodeFailure::transform(format!("path '{}' not found in input", path))
                })
        }

        TransformKind::Template => {
            let template =
                template.ok_or_else(|| NodeFailure::transform("template is required"))?;
            Ok(Value::String(render_template(template, context)))
        }

        TransformKind::JsonParse => {
            let text = match primary {
                Value::String(s) => s.as_str(),
                _ => {
                    return Err(NodeFailure::transform(
                        "json_parse expects a string input",
                    ))
                }
            };
            serde_json::from_str(text)
                .map_err(|e| NodeFailure::transform(format!("invalid JSON: {}", e)))
        }

        TransformKind::JsonStringify => Ok(Value::String(
            serde_json::to_string(primary)
                .map_err(|e| NodeFailure::transform(e.to_string()))?,
        )),

        TransformKind::ArrayJoin => {
            let items = primary.as_array().ok_or_else(|| {
                NodeFailure::transform("array_join expects an array input")
            })?;
            let separator = separator.unwrap_or(",");
            Ok(Value::String(
                items
                    .iter()
                    .map(scalar_string)
                    .collect::<Vec<_>>()
                    .join(separator),
            ))
        }
    }
}

/// Build the primary input for a node from its bindings: the single
/// bound value, or the whole binding object when several are present
pub fn primary_input(bindings: &Map<String, Value>) -> Value {
    if bindings.len() == 1 {
        bindings.values().next().cloned().unwrap_or(Value::Null)
    } else {
        Value::Object(bindings.clone())
    }
}
