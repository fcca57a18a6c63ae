//! The execution engine and its run loop
//!
//! One run is a cooperative scheduler over the compiled plan:
//!
//! - a node dispatches when all its incoming data edges are satisfied,
//!   when an error edge routes a failure to it, or when a control edge
//!   fires (re-entry, counted against the loop budget)
//! - at most `C` evaluations run concurrently; completions propagate
//!   edge satisfaction and may enqueue further nodes
//! - every completion appends to the event stream and (per the
//!   checkpoint cadence) persists a [`Checkpoint`]
//! - cancellation and the run deadline share one [`CancelToken`]
//!   observed at every suspension point

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use flowhub_graph::{Graph, NodeKind};
use flowhub_llm::TokenUsage;

use crate::cancel::{CancelCause, CancelToken};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{EngineError, NodeFailure, Result};
use crate::eval::{EvalOutcome, NodeEvaluator};
use crate::event::{EventBus, EventSubscription, StepEventKind};
use crate::plan::ExecutionPlan;
use crate::record::{ExecutionRecord, ExecutionStatus};

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent node evaluations per execution
    pub max_concurrency: usize,
    /// Maximum executions of any single node within one run
    pub reentry_cap: u32,
    /// Persist a checkpoint every this many node completions
    pub checkpoint_every: u64,
    /// Hard wall-clock bound for one run
    pub max_run_time: Duration,
    /// Replay buffer bound of the event stream
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            reentry_cap: 32,
            checkpoint_every: 1,
            max_run_time: Duration::from_secs(600),
            event_buffer: 1024,
        }
    }
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Pre-assigned execution id; a fresh one is generated when `None`
    pub execution_id: Option<Uuid>,
    /// Workflow being executed
    pub workflow_id: Uuid,
    /// Version being executed
    pub workflow_version: u32,
    /// Invoking user
    pub user_id: String,
    /// The graph snapshot of that version
    pub graph: Graph,
    /// Run inputs keyed by input-node envelope keys
    pub input_envelope: Value,
}

/// A started run: event access, cancellation, and the final record
pub struct RunHandle {
    /// Execution id of this run
    pub execution_id: Uuid,
    bus: EventBus,
    cancel: CancelToken,
    status: watch::Receiver<ExecutionStatus>,
    join: tokio::task::JoinHandle<ExecutionRecord>,
}

impl RunHandle {
    /// Subscribe to events after the given sequence number
    pub fn subscribe(&self, after_seq: u64) -> EventSubscription {
        self.bus.subscribe(after_seq)
    }

    /// The run's event bus, for callers that outlive this handle
    pub fn event_bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Current status
    pub fn status(&self) -> ExecutionStatus {
        *self.status.borrow()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel(CancelCause::Requested);
    }

    /// Token shared with the run, for wiring into shutdown handling
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Await the final record
    pub async fn wait(self) -> Result<ExecutionRecord> {
        self.join
            .await
            .map_err(|e| EngineError::Execution(format!("run task panicked: {}", e)))
    }
}

/// Compiles plans and drives runs
pub struct ExecutionEngine {
    evaluator: Arc<NodeEvaluator>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create an engine
    pub fn new(
        evaluator: Arc<NodeEvaluator>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            evaluator,
            checkpoints,
            config,
        }
    }

    /// Start a run from scratch
    pub fn start(&self, params: RunParams) -> Result<RunHandle> {
        let plan = Arc::new(ExecutionPlan::compile(&params.graph)?);
        let initial: Vec<String> = plan.entry_nodes().to_vec();
        self.spawn_run(params, plan, HashMap::new(), initial, 0, 0)
    }

    /// Resume a run from its latest checkpoint
    ///
    /// Outputs and the frontier are restored; event sequence numbers
    /// continue after the checkpointed position.
    pub async fn resume(&self, params: RunParams) -> Result<RunHandle> {
        let execution_id = params
            .execution_id
            .ok_or_else(|| EngineError::Execution("resume requires an execution id".to_string()))?;
        let checkpoint = self
            .checkpoints
            .load_latest(execution_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(execution_id.to_string()))?;

        let plan = Arc::new(ExecutionPlan::compile(&params.graph)?);
        let frontier: Vec<String> = checkpoint.frontier.iter().cloned().collect();
        info!(execution = %execution_id, frontier = frontier.len(), "resuming from checkpoint");
        self.spawn_run(
            params,
            plan,
            checkpoint.node_outputs,
            frontier,
            checkpoint.number,
            checkpoint.last_seq,
        )
    }

    fn spawn_run(
        &self,
        params: RunParams,
        plan: Arc<ExecutionPlan>,
        outputs: HashMap<String, Value>,
        initial: Vec<String>,
        checkpoint_number: u64,
        last_seq: u64,
    ) -> Result<RunHandle> {
        let execution_id = params.execution_id.unwrap_or_else(Uuid::new_v4);
        let bus = EventBus::with_start(self.config.event_buffer, last_seq + 1);
        let cancel = CancelToken::new();
        let (status_tx, status_rx) = watch::channel(ExecutionStatus::Pending);

        let run = RunLoop {
            execution_id,
            workflow_id: params.workflow_id,
            workflow_version: params.workflow_version,
            user_id: params.user_id,
            input_envelope: params.input_envelope,
            plan,
            evaluator: Arc::clone(&self.evaluator),
            checkpoints: Arc::clone(&self.checkpoints),
            config: self.config.clone(),
            bus: bus.clone(),
            cancel: cancel.clone(),
            status_tx,
            outputs,
            checkpoint_number,
        };

        let join = tokio::spawn(run.drive(initial));

        Ok(RunHandle {
            execution_id,
            bus,
            cancel,
            status: status_rx,
            join,
        })
    }
}

struct RunLoop {
    execution_id: Uuid,
    workflow_id: Uuid,
    workflow_version: u32,
    user_id: String,
    input_envelope: Value,
    plan: Arc<ExecutionPlan>,
    evaluator: Arc<NodeEvaluator>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: EngineConfig,
    bus: EventBus,
    cancel: CancelToken,
    status_tx: watch::Sender<ExecutionStatus>,
    outputs: HashMap<String, Value>,
    checkpoint_number: u64,
}

impl RunLoop {
    fn set_status(&self, status: ExecutionStatus) {
        let current = *self.status_tx.borrow();
        if current.can_transition_to(status) {
            let _ = self.status_tx.send(status);
        }
    }

    /// Binding context for templates: input envelope fields overlaid
    /// with every completed node's output keyed by envelope key
    fn context(&self) -> Value {
        let mut context = match &self.input_envelope {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for (node_id, value) in &self.outputs {
            if let Some(node) = self.plan.node(node_id) {
                context.insert(node.envelope_key().to_string(), value.clone());
            }
        }
        Value::Object(context)
    }

    /// Bindings for a node: one entry per incoming data or error edge
    /// whose source already has an output, keyed by the edge's target
    /// handle or the source's envelope key
    fn bindings_for(&self, node_id: &str) -> Map<String, Value> {
        let mut bindings = Map::new();
        let Some(links) = self.plan.links(node_id) else {
            return bindings;
        };
        for edge_id in links.in_data.iter().chain(links.in_error.iter()) {
            let Some(edge) = self.plan.edge(edge_id) else { continue };
            let Some(value) = self.outputs.get(&edge.source) else { continue };
            let key = match &edge.target_handle {
                Some(handle) => handle.clone(),
                None => self
                    .plan
                    .node(&edge.source)
                    .map(|n| n.envelope_key().to_string())
                    .unwrap_or_else(|| edge.source.clone()),
            };
            bindings.insert(key, value.clone());
        }
        bindings
    }

    async fn drive(mut self, initial: Vec<String>) -> ExecutionRecord {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.config.max_run_time;
        self.set_status(ExecutionStatus::Running);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut join_set: JoinSet<(String, std::result::Result<EvalOutcome, NodeFailure>)> =
            JoinSet::new();

        // Unsatisfied incoming data edges per node; reset on dispatch
        let mut pending_data: HashMap<String, HashSet<String>> = HashMap::new();
        for id in self.plan.node_ids() {
            let links = self.plan.links(id).cloned().unwrap_or_default();
            pending_data.insert(
                id.to_string(),
                links
                    .in_data
                    .iter()
                    .filter(|e| {
                        // Edges from already-restored outputs count satisfied
                        self.plan
                            .edge(e)
                            .map(|edge| !self.outputs.contains_key(&edge.source))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect(),
            );
        }

        let mut queue: VecDeque<String> = initial.into();
        let mut queued: HashSet<String> = queue.iter().cloned().collect();
        let mut running: HashSet<String> = HashSet::new();
        let mut dispatched: HashMap<String, u32> = HashMap::new();
        let mut streaming_nodes: HashSet<String> = HashSet::new();
        let mut completions: u64 = 0;
        let mut usage_total = TokenUsage::default();
        let mut saw_usage = false;
        let mut fatal: Option<NodeFailure> = None;
        let mut cancelled = false;

        loop {
            // Dispatch everything ready; the semaphore bounds actual
            // concurrency inside the spawned evaluations
            while let Some(node_id) = queue.pop_front() {
                if fatal.is_some() {
                    break;
                }
                queued.remove(&node_id);
                let count = dispatched.entry(node_id.clone()).or_insert(0);
                if *count >= self.config.reentry_cap {
                    let failure = NodeFailure::loop_budget(&node_id, self.config.reentry_cap);
                    self.handle_failure(
                        &node_id,
                        failure,
                        &mut queue,
                        &mut queued,
                        &mut fatal,
                    );
                    continue;
                }
                let iteration = *count;
                *count += 1;

                let Some(node) = self.plan.node(&node_id).cloned() else {
                    continue;
                };

                // Consume data-edge satisfaction so loops need fresh values
                if let Some(links) = self.plan.links(&node_id) {
                    pending_data.insert(node_id.clone(), links.in_data.iter().cloned().collect());
                }

                if matches!(node.kind, NodeKind::Llm { .. }) {
                    streaming_nodes.insert(node_id.clone());
                    self.set_status(ExecutionStatus::Streaming);
                }

                self.bus.emit(
                    &node_id,
                    StepEventKind::Started,
                    json!({"iteration": iteration, "kind": node.kind.name()}),
                );

                let bindings = self.bindings_for(&node_id);
                let context = self.context();
                let envelope = self.input_envelope.clone();
                let evaluator = Arc::clone(&self.evaluator);
                let bus = self.bus.clone();
                let cancel = self.cancel.clone();
                let semaphore = Arc::clone(&semaphore);

                running.insert(node_id.clone());
                join_set.spawn(async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return (node_id, Err(NodeFailure::cancelled())),
                    };
                    if cancel.is_cancelled() {
                        return (node_id, Err(NodeFailure::cancelled()));
                    }
                    let result = evaluator
                        .evaluate(&node, &bindings, &context, &envelope, deadline, &cancel, &bus)
                        .await;
                    (node_id, result)
                });
            }

            if fatal.is_some() {
                self.cancel.cancel(CancelCause::Requested);
                break;
            }
            if running.is_empty() && queue.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = join_set.join_next() => joined,
                _ = self.cancel.cancelled() => {
                    // Deadline exhaustion is cancellation with a
                    // distinguished cause; both end as `cancelled`
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    self.cancel.cancel(CancelCause::DeadlineElapsed);
                    cancelled = true;
                    break;
                }
            };

            let Some(joined) = joined else { continue };
            let (node_id, result) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    warn!(execution = %self.execution_id, error = %join_err, "evaluation task failed");
                    fatal = Some(NodeFailure::new(
                        "ExecutionError",
                        format!("node task aborted: {}", join_err),
                    ));
                    break;
                }
            };
            running.remove(&node_id);
            if streaming_nodes.remove(&node_id) && streaming_nodes.is_empty() {
                self.set_status(ExecutionStatus::Running);
            }

            match result {
                Ok(outcome) => {
                    if let Some(usage) = outcome.usage {
                        usage_total.add(usage);
                        saw_usage = true;
                    }
                    self.outputs.insert(node_id.clone(), outcome.value.clone());
                    self.bus.emit(
                        &node_id,
                        StepEventKind::Completed,
                        json!({"value": outcome.value}),
                    );
                    completions += 1;

                    self.propagate_success(&node_id, &mut pending_data, &mut queue, &mut queued, &running);

                    if completions % self.config.checkpoint_every == 0 {
                        self.save_checkpoint(&node_id, &queued, &running).await;
                    }
                }
                Err(failure) if failure.kind == "Cancelled" => {
                    self.bus
                        .emit(&node_id, StepEventKind::Cancelled, json!({}));
                    cancelled = true;
                }
                Err(failure) => {
                    self.handle_failure(&node_id, failure, &mut queue, &mut queued, &mut fatal);
                }
            }

            if fatal.is_some() {
                // No new dispatches; in-flight evaluations are signalled
                self.cancel.cancel(CancelCause::Requested);
                break;
            }
        }

        // Wind down in-flight work
        join_set.shutdown().await;
        for node_id in running.drain() {
            self.bus.emit(&node_id, StepEventKind::Cancelled, json!({}));
        }

        self.finalize(started_at, fatal, cancelled, usage_total, saw_usage)
            .await
    }

    fn propagate_success(
        &mut self,
        node_id: &str,
        pending_data: &mut HashMap<String, HashSet<String>>,
        queue: &mut VecDeque<String>,
        queued: &mut HashSet<String>,
        running: &HashSet<String>,
    ) {
        let Some(links) = self.plan.links(node_id).cloned() else {
            return;
        };

        for edge_id in &links.out_data {
            let Some(edge) = self.plan.edge(edge_id) else { continue };
            let target = edge.target.clone();
            if let Some(pending) = pending_data.get_mut(&target) {
                pending.remove(edge_id);
                if pending.is_empty() && !queued.contains(&target) && !running.contains(&target) {
                    queue.push_back(target.clone());
                    queued.insert(target);
                }
            }
        }

        for edge_id in &links.out_control {
            let Some(edge) = self.plan.edge(edge_id) else { continue };
            let fires = match &edge.source_handle {
                // A handle makes the control edge conditional on that
                // field of the source output being truthy
                Some(handle) => self
                    .outputs
                    .get(node_id)
                    .and_then(|v| crate::transform::lookup_path(v, handle))
                    .map(truthy)
                    .unwrap_or(false),
                None => true,
            };
            if fires && !queued.contains(&edge.target) && !running.contains(&edge.target) {
                debug!(edge = %edge_id, target = %edge.target, "control edge fired");
                queue.push_back(edge.target.clone());
                queued.insert(edge.target.clone());
            }
        }
    }

    fn handle_failure(
        &mut self,
        node_id: &str,
        failure: NodeFailure,
        queue: &mut VecDeque<String>,
        queued: &mut HashSet<String>,
        fatal: &mut Option<NodeFailure>,
    ) {
        self.bus.emit(
            node_id,
            StepEventKind::Failed,
            serde_json::to_value(&failure).unwrap_or_default(),
        );

        let error_edges: Vec<String> = self
            .plan
            .links(node_id)
            .map(|l| l.out_error.clone())
            .unwrap_or_default();

        if error_edges.is_empty() {
            warn!(execution = %self.execution_id, node = node_id, kind = %failure.kind,
                  "node failed with no error edge; failing execution");
            *fatal = Some(failure);
            return;
        }

        // Recovered locally: the failure value becomes this node's
        // output and flows along every error edge
        self.outputs
            .insert(node_id.to_string(), failure.as_edge_value());
        for edge_id in error_edges {
            let Some(edge) = self.plan.edge(&edge_id) else { continue };
            if !queued.contains(&edge.target) {
                debug!(edge = %edge_id, target = %edge.target, "error edge fired");
                queue.push_back(edge.target.clone());
                queued.insert(edge.target.clone());
            }
        }
    }

    async fn save_checkpoint(
        &mut self,
        after_node_id: &str,
        queued: &HashSet<String>,
        running: &HashSet<String>,
    ) {
        self.checkpoint_number += 1;
        // Running nodes have no output yet; a resume re-dispatches them
        let frontier: BTreeSet<String> = queued
            .iter()
            .cloned()
            .chain(running.iter().cloned())
            .collect();
        let checkpoint = Checkpoint {
            execution_id: self.execution_id,
            number: self.checkpoint_number,
            after_node_id: after_node_id.to_string(),
            node_outputs: self.outputs.clone(),
            frontier,
            at: Utc::now(),
            last_seq: self.bus.last_seq(),
        };
        if let Err(e) = self.checkpoints.save(checkpoint).await {
            // A failed checkpoint must not fail the run
            warn!(execution = %self.execution_id, error = %e, "checkpoint save failed");
        }
    }

    async fn finalize(
        self,
        started_at: chrono::DateTime<Utc>,
        fatal: Option<NodeFailure>,
        cancelled: bool,
        usage_total: TokenUsage,
        saw_usage: bool,
    ) -> ExecutionRecord {
        let mut final_output: Option<Value> = None;
        let mut error = fatal;

        let status = if cancelled && error.is_none() {
            ExecutionStatus::Cancelled
        } else if error.is_some() {
            ExecutionStatus::Failed
        } else {
            // Collect output-node values; a run that produced none is a
            // failure even when every node succeeded
            let mut collected = Map::new();
            for node in self.plan.output_nodes() {
                if let Some(value) = self.outputs.get(&node.id) {
                    collected.insert(node.envelope_key().to_string(), value.clone());
                }
            }
            if collected.is_empty() {
                error = Some(NodeFailure::new(
                    "NoOutputProduced",
                    "no output node completed",
                ));
                ExecutionStatus::Failed
            } else {
                final_output = Some(Value::Object(collected));
                ExecutionStatus::Completed
            }
        };

        // Nodes that never dispatched in a completed run were skipped
        if status == ExecutionStatus::Completed {
            for node_id in self.plan.node_ids() {
                if !self.outputs.contains_key(node_id) {
                    self.bus.emit(node_id, StepEventKind::Skipped, json!({}));
                }
            }
        }

        let terminal_kind = match status {
            ExecutionStatus::Completed => StepEventKind::Completed,
            ExecutionStatus::Cancelled => StepEventKind::Cancelled,
            _ => StepEventKind::Failed,
        };
        self.bus.emit(
            "",
            terminal_kind,
            json!({
                "status": status.as_str(),
                "final_output": final_output,
                "error": error,
            }),
        );

        self.set_status(status);
        let step_count = self.bus.last_seq();
        self.bus.close();

        info!(execution = %self.execution_id, status = status.as_str(), steps = step_count,
              "execution finished");

        ExecutionRecord {
            id: self.execution_id,
            workflow_id: self.workflow_id,
            workflow_version: self.workflow_version,
            user_id: self.user_id,
            status,
            input_envelope: self.input_envelope,
            final_output,
            error,
            token_usage: saw_usage.then_some(usage_total),
            started_at,
            finished_at: Some(Utc::now()),
            step_count,
        }
    }
}

/// Truthiness for conditional control edges
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_rules() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(0)));
        assert!(truthy(&json!("x")));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!({"a": 1})));
    }
}
