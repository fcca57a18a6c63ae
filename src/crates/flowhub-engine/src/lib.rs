//! Concurrent workflow execution engine
//!
//! Compiles a validated workflow graph into a runnable plan and executes
//! it with bounded concurrency: node evaluations that share no data
//! dependency run in parallel, token output streams as it arrives,
//! checkpoints persist after node completions, and cancellation is
//! cooperative at every suspension point.
//!
//! # Architecture
//!
//! ```text
//! Graph ──compile──▶ ExecutionPlan ──▶ run loop (scheduler)
//!                                        │  ready set / re-entry / error edges
//!                                        ├──▶ node evaluations (≤ C in flight)
//!                                        ├──▶ EventBus (seq-ordered, replayable)
//!                                        └──▶ CheckpointStore
//! ```
//!
//! - [`plan::ExecutionPlan`] - dependency-classified view of the graph
//! - [`engine::ExecutionEngine`] - entry point; produces a [`engine::RunHandle`]
//! - [`event::EventBus`] - per-execution ordered event stream with replay
//! - [`checkpoint::CheckpointStore`] - resume support
//! - [`error::NodeFailure`] - structured failure value routed over error edges

pub mod cancel;
pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod eval;
pub mod event;
pub mod plan;
pub mod record;
pub mod transform;

pub use cancel::{CancelCause, CancelToken};
pub use checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};
pub use engine::{EngineConfig, ExecutionEngine, RunHandle, RunParams};
pub use eval::NodeEvaluator;
pub use error::{EngineError, NodeFailure, Result};
pub use event::{EventBus, EventSubscription, StepEvent, StepEventKind};
pub use plan::ExecutionPlan;
pub use record::{ExecutionRecord, ExecutionStatus};
