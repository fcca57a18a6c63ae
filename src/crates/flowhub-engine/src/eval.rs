//! Node evaluation
//!
//! One evaluation observes an immutable view of its inputs taken at
//! dispatch. LLM and skill evaluations honour the run deadline and the
//! cancellation token at every suspension point; transforms are pure
//! and never suspend.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use flowhub_graph::{Node, NodeKind, OutputFormat};
use flowhub_llm::{json_repair, ChatMessage, ChatModel, ChatRequest, TokenUsage};
use flowhub_skills::{SkillInvoker, SkillRegistry};

use crate::cancel::CancelToken;
use crate::error::NodeFailure;
use crate::event::{EventBus, StepEventKind};
use crate::transform::{self, render_template, scalar_string};

/// Result of one node evaluation
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    /// The node's output value
    pub value: Value,
    /// LLM token usage, when the node consumed any
    pub usage: Option<TokenUsage>,
}

impl EvalOutcome {
    fn value(value: Value) -> Self {
        Self { value, usage: None }
    }
}

/// Evaluates single nodes against injected collaborators
pub struct NodeEvaluator {
    model: Arc<dyn ChatModel>,
    skills: Arc<dyn SkillRegistry>,
    invoker: Arc<SkillInvoker>,
}

impl NodeEvaluator {
    /// Create an evaluator
    pub fn new(
        model: Arc<dyn ChatModel>,
        skills: Arc<dyn SkillRegistry>,
        invoker: Arc<SkillInvoker>,
    ) -> Self {
        Self {
            model,
            skills,
            invoker,
        }
    }

    /// Evaluate `node` with the given bindings
    ///
    /// `bindings` maps envelope keys of satisfied incoming edges to
    /// their values; `context` is the full outputs-so-far object used
    /// for template rendering; `envelope` is the run input envelope.
    #[allow(clippy::too_many_arguments)]
    pub async fn evaluate(
        &self,
        node: &Node,
        bindings: &Map<String, Value>,
        context: &Value,
        envelope: &Value,
        deadline: Instant,
        cancel: &CancelToken,
        bus: &EventBus,
    ) -> Result<EvalOutcome, NodeFailure> {
        if cancel.is_cancelled() {
            return Err(NodeFailure::cancelled());
        }

        match &node.kind {
            NodeKind::Input { default, .. } => {
                let key = node.envelope_key();
                let value = envelope
                    .get(key)
                    .or_else(|| envelope.get(&node.id))
                    .cloned()
                    .or_else(|| default.clone())
                    .unwrap_or(Value::Null);
                Ok(EvalOutcome::value(value))
            }

            NodeKind::Llm {
                model,
                system_prompt,
                prompt,
                temperature,
                json_output,
            } => {
                self.evaluate_llm(
                    node,
                    model,
                    system_prompt.as_deref(),
                    prompt,
                    *temperature,
                    *json_output,
                    context,
                    cancel,
                    bus,
                )
                .await
            }

            NodeKind::Skill { skill_id } => {
                let skill = self
                    .skills
                    .get(skill_id)
                    .await
                    .map_err(NodeFailure::from)?;
                let bound = Value::Object(bindings.clone());
                let value = self
                    .invoker
                    .invoke(&skill, &bound, deadline)
                    .await
                    .map_err(NodeFailure::from)?;
                Ok(EvalOutcome::value(value))
            }

            NodeKind::Transform {
                kind,
                field,
                template,
                separator,
            } => {
                let primary = transform::primary_input(bindings);
                let value = transform::apply(
                    *kind,
                    field.as_deref(),
                    template.as_deref(),
                    separator.as_deref(),
                    &primary,
                    context,
                )?;
                Ok(EvalOutcome::value(value))
            }

            NodeKind::Output { format } => {
                let primary = transform::primary_input(bindings);
                let value = match format {
                    OutputFormat::Auto => primary,
                    OutputFormat::Text | OutputFormat::Markdown => {
                        Value::String(scalar_string(&primary))
                    }
                    OutputFormat::Json => match primary {
                        Value::String(ref s) => json_repair::parse_strict(s)
                            .unwrap_or(primary),
                        other => other,
                    },
                };
                Ok(EvalOutcome::value(value))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_llm(
        &self,
        node: &Node,
        model_name: &str,
        system_prompt: Option<&str>,
        prompt: &str,
        temperature: f64,
        json_output: bool,
        context: &Value,
        cancel: &CancelToken,
        bus: &EventBus,
    ) -> Result<EvalOutcome, NodeFailure> {
        let rendered_prompt = render_template(prompt, context);
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::system(render_template(system, context)));
        }
        messages.push(ChatMessage::user(rendered_prompt));

        let request = ChatRequest::new(messages)
            .with_model(model_name)
            .with_temperature(temperature)
            .with_json_output(json_output);

        debug!(node = %node.id, model = model_name, "dispatching llm node");

        let mut stream = self.model.stream(request).await.map_err(NodeFailure::from)?;

        let mut accumulated = String::new();
        let mut usage: Option<TokenUsage> = None;

        loop {
            let chunk = tokio::select! {
                chunk = futures::StreamExt::next(&mut stream) => chunk,
                _ = cancel.cancelled() => return Err(NodeFailure::cancelled()),
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(NodeFailure::from)?;

            if chunk.is_final {
                usage = chunk.usage;
                break;
            }
            if !chunk.content.is_empty() {
                accumulated.push_str(&chunk.content);
                bus.emit(
                    &node.id,
                    StepEventKind::Token,
                    json!({"content": chunk.content}),
                );
            }
        }

        let value = if json_output {
            match json_repair::parse_or_repair(&accumulated) {
                Some((value, repaired)) => {
                    if repaired {
                        debug!(node = %node.id, "llm output repaired to valid JSON");
                    }
                    value
                }
                None => {
                    return Err(NodeFailure {
                        kind: "LLMFormatError".to_string(),
                        message: "model output is not valid JSON after repair".to_string(),
                        status: None,
                        payload: Some(json!({
                            "head": accumulated.chars().take(256).collect::<String>()
                        })),
                    })
                }
            }
        } else {
            Value::String(accumulated)
        };

        Ok(EvalOutcome { value, usage })
    }
}
