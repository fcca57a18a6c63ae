//! Execution lifecycle: admission, run driving, persistence, streaming
//!
//! Admission order is fixed: authenticate (upstream), check visibility,
//! consume one quota slot, then start the engine run. On refusal no
//! state is modified. A persister task follows each run and finalizes
//! the row exactly once with the terminal record and full step log.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use flowhub_engine::{
    CancelCause, CancelToken, EventBus, EventSubscription, ExecutionEngine, ExecutionStatus,
    RunParams, StepEvent,
};

use crate::api::error::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::models::ExecutionRow;
use crate::db::repositories::{ExecutionRepository, QuotaRepository, WorkflowRepository};
use crate::db::DatabaseConnection;
use crate::services::workflow_service::WorkflowService;

/// Event access for a run still in flight
#[derive(Clone)]
struct ActiveRun {
    bus: EventBus,
    cancel: CancelToken,
}

/// Execution domain service
#[derive(Clone)]
pub struct ExecutionService {
    db: DatabaseConnection,
    engine: Arc<ExecutionEngine>,
    workflows: WorkflowService,
    active: Arc<DashMap<Uuid, ActiveRun>>,
    // Persister tasks; shared across clones so shutdown can drain them
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
    default_quota: i64,
}

impl ExecutionService {
    /// Create the service
    pub fn new(
        db: DatabaseConnection,
        engine: Arc<ExecutionEngine>,
        workflows: WorkflowService,
        default_quota: i64,
    ) -> Self {
        Self {
            db,
            engine,
            workflows,
            active: Arc::new(DashMap::new()),
            background: Arc::new(Mutex::new(Vec::new())),
            default_quota,
        }
    }

    /// Number of runs currently in flight
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.background.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Request cooperative cancellation of every in-flight run
    ///
    /// Called on shutdown; the runs finalize as `cancelled` and their
    /// persisters write the terminal records.
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            info!(execution = %entry.key(), "cancelling for shutdown");
            entry.value().cancel.cancel(CancelCause::Requested);
        }
    }

    /// Await every persister task still in flight
    pub async fn wait_background(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut tasks = self.background.lock();
                tasks.drain(..).collect()
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Admit and start a run of the workflow's current version
    pub async fn run(
        &self,
        workflow_id: &str,
        input: Value,
        caller: &AuthUser,
    ) -> ApiResult<ExecutionRow> {
        // Visibility first: a private workflow is runnable by its owner only
        let workflow = self.workflows.get_readable(workflow_id, caller).await?;

        // Quota is the last gate; nothing else has been written yet
        QuotaRepository::get_or_create(self.db.pool(), &caller.user_id, self.default_quota, 0)
            .await?;
        if !QuotaRepository::try_consume(self.db.pool(), &caller.user_id).await? {
            return Err(ApiError::QuotaExceeded(
                "daily execution limit reached".to_string(),
            ));
        }

        let handle = self.engine.start(RunParams {
            execution_id: None,
            workflow_id: workflow.id,
            workflow_version: workflow.version,
            user_id: caller.user_id.clone(),
            graph: workflow.graph.clone(),
            input_envelope: input.clone(),
        })?;

        let execution_id = handle.execution_id;
        ExecutionRepository::create_pending(
            self.db.pool(),
            execution_id,
            workflow.id,
            workflow.version,
            &caller.user_id,
            &input,
        )
        .await?;
        ExecutionRepository::update_status(
            self.db.pool(),
            &execution_id.to_string(),
            ExecutionStatus::Running,
        )
        .await?;

        self.active.insert(
            execution_id,
            ActiveRun {
                bus: handle.event_bus(),
                cancel: handle.cancel_token(),
            },
        );

        // Persister: drain events, await the record, finalize the row.
        // Tracked so shutdown can wait for the terminal write.
        let service = self.clone();
        let events = handle.subscribe(0);
        self.track(tokio::spawn(async move {
            service.persist_run(execution_id, handle, events).await;
        }));

        info!(execution = %execution_id, workflow = %workflow.id, "run admitted");

        ExecutionRepository::get_by_id(self.db.pool(), &execution_id.to_string())
            .await?
            .ok_or_else(|| ApiError::InternalError("execution row vanished".to_string()))
    }

    async fn persist_run(
        &self,
        execution_id: Uuid,
        handle: flowhub_engine::RunHandle,
        mut events: EventSubscription,
    ) {
        let mut step_log: Vec<StepEvent> = Vec::new();
        let workflow_id = {
            // Collect until the bus closes at finalization
            while let Some(event) = events.next().await {
                step_log.push(event);
            }
            match handle.wait().await {
                Ok(record) => {
                    let workflow_id = record.workflow_id.to_string();
                    let completed = record.status == ExecutionStatus::Completed;
                    if let Err(e) =
                        ExecutionRepository::finalize(self.db.pool(), &record, &step_log).await
                    {
                        error!(execution = %execution_id, error = %e, "finalize failed");
                    }
                    completed.then_some(workflow_id)
                }
                Err(e) => {
                    error!(execution = %execution_id, error = %e, "run task failed");
                    None
                }
            }
        };

        if let Some(workflow_id) = workflow_id {
            if let Err(e) =
                WorkflowRepository::increment_run_count(self.db.pool(), &workflow_id).await
            {
                warn!(workflow = %workflow_id, error = %e, "run_count update failed");
            }
        }

        self.active.remove(&execution_id);
    }

    /// Load an execution row, enforcing per-user ownership
    pub async fn get(&self, id: &str, caller: &AuthUser) -> ApiResult<ExecutionRow> {
        let row = ExecutionRepository::get_by_id(self.db.pool(), id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("execution {}", id)))?;
        if row.user_id != caller.user_id {
            return Err(ApiError::Forbidden("not your execution".to_string()));
        }
        Ok(row)
    }

    /// Event stream for an execution, resumable from `after_seq`
    ///
    /// Live runs stream from the bus; terminal runs replay the persisted
    /// step log.
    pub async fn subscribe(
        &self,
        id: &str,
        after_seq: u64,
        caller: &AuthUser,
    ) -> ApiResult<Vec<StepEvent>> {
        let row = self.get(id, caller).await?;
        let execution_id = Uuid::parse_str(&row.id)
            .map_err(|_| ApiError::InternalError("bad execution id".to_string()))?;

        if self.active.get(&execution_id).is_some() {
            // Caller converts the live subscription to SSE; replayed
            // events are not materialized here
            return Ok(Vec::new());
        }

        Ok(row
            .step_events()?
            .into_iter()
            .filter(|e| e.seq > after_seq)
            .collect())
    }

    /// Live subscription handle when the run is in flight
    pub fn live_subscription(&self, id: Uuid, after_seq: u64) -> Option<EventSubscription> {
        self.active.get(&id).map(|run| run.bus.subscribe(after_seq))
    }

    /// Request cooperative cancellation
    pub async fn cancel(&self, id: &str, caller: &AuthUser) -> ApiResult<()> {
        let row = self.get(id, caller).await?;
        let execution_id = Uuid::parse_str(&row.id)
            .map_err(|_| ApiError::InternalError("bad execution id".to_string()))?;

        if let Some(run) = self.active.get(&execution_id) {
            run.cancel.cancel(CancelCause::Requested);
            info!(execution = %execution_id, "cancel requested");
        }
        // Terminal runs accept the request as a no-op
        Ok(())
    }

    /// List the caller's executions
    pub async fn list(
        &self,
        caller: &AuthUser,
        status: Option<&str>,
        page: i64,
        limit: i64,
    ) -> ApiResult<Vec<ExecutionRow>> {
        Ok(ExecutionRepository::list_for_user(
            self.db.pool(),
            &caller.user_id,
            status,
            page * limit,
            limit,
        )
        .await?)
    }

    /// Quota status for the usage endpoint
    pub async fn usage(&self, caller: &AuthUser) -> ApiResult<(i64, i64, String)> {
        let row = QuotaRepository::get_or_create(
            self.db.pool(),
            &caller.user_id,
            self.default_quota,
            0,
        )
        .await?;
        Ok((row.limit_per_day, row.used_today, row.resets_at))
    }
}
