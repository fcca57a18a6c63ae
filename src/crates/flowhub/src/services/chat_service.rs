//! Chat sessions over workflows
//!
//! A chat turn runs the workflow with the message as input; the
//! resulting execution is linked back to the session and the assistant
//! message is appended when the run completes. The caller fetches the
//! full streamed response via the execution API.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use flowhub_engine::{ExecutionStatus, StepEventKind};

use crate::api::error::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::models::{ChatMessageRow, ChatSessionRow};
use crate::db::repositories::{ExecutionRepository, SessionRepository};
use crate::db::DatabaseConnection;
use crate::services::execution_service::ExecutionService;

/// Result of one chat turn
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Session the turn belongs to
    pub session_id: String,
    /// Execution producing the assistant response
    pub execution_id: String,
    /// First streamed characters, possibly empty
    pub response_head: String,
}

/// Chat domain service
#[derive(Clone)]
pub struct ChatService {
    db: DatabaseConnection,
    executions: ExecutionService,
    // Assistant-append watchers; shared across clones for shutdown
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ChatService {
    /// Create the service
    pub fn new(db: DatabaseConnection, executions: ExecutionService) -> Self {
        Self {
            db,
            executions,
            background: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.background.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Await every assistant-append watcher still in flight
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

    async fn session_for(
        &self,
        workflow_id: &str,
        session_id: Option<&str>,
        caller: &AuthUser,
    ) -> ApiResult<ChatSessionRow> {
        match session_id {
            Some(id) => {
                let session = SessionRepository::get_by_id(self.db.pool(), id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))?;
                if session.user_id != caller.user_id {
                    return Err(ApiError::Forbidden("not your session".to_string()));
                }
                if session.workflow_id != workflow_id {
                    return Err(ApiError::BadRequest(
                        "session belongs to another workflow".to_string(),
                    ));
                }
                Ok(session)
            }
            None => Ok(SessionRepository::create(self.db.pool(), workflow_id, &caller.user_id)
                .await?),
        }
    }

    /// Run one chat turn
    pub async fn chat(
        &self,
        workflow_id: &str,
        message: &str,
        session_id: Option<&str>,
        caller: &AuthUser,
    ) -> ApiResult<ChatTurn> {
        if message.trim().is_empty() {
            return Err(ApiError::BadRequest("message must not be empty".to_string()));
        }

        let session = self.session_for(workflow_id, session_id, caller).await?;

        // Admission (visibility + quota) happens inside the run
        let execution = self
            .executions
            .run(workflow_id, json!({"message": message}), caller)
            .await?;

        SessionRepository::append_message(
            self.db.pool(),
            &session.id,
            "user",
            message,
            Some(&execution.id),
        )
        .await?;

        // Grab the first streamed characters for the turn response, then
        // leave a watcher behind to append the assistant message
        let execution_id = Uuid::parse_str(&execution.id)
            .map_err(|_| ApiError::InternalError("bad execution id".to_string()))?;
        let response_head = self.peek_head(execution_id).await;

        let service = self.clone();
        let session_id = session.id.clone();
        let row_id = execution.id.clone();
        self.track(tokio::spawn(async move {
            service.append_assistant_on_completion(session_id, row_id).await;
        }));

        Ok(ChatTurn {
            session_id: session.id,
            execution_id: execution.id,
            response_head,
        })
    }

    /// Collect up to ~160 chars of early token output, bounded in time
    async fn peek_head(&self, execution_id: Uuid) -> String {
        let Some(mut subscription) = self.executions.live_subscription(execution_id, 0) else {
            return String::new();
        };

        let mut head = String::new();
        let deadline = tokio::time::sleep(Duration::from_millis(300));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                event = subscription.next() => {
                    let Some(event) = event else { break };
                    if event.kind == StepEventKind::Token {
                        if let Some(content) = event.payload.get("content").and_then(Value::as_str) {
                            head.push_str(content);
                            if head.len() >= 160 {
                                break;
                            }
                        }
                    }
                }
                _ = &mut deadline => break,
            }
        }
        head.chars().take(160).collect()
    }

    async fn append_assistant_on_completion(&self, session_id: String, execution_id: String) {
        // Wait for the persister to finalize the row
        for _ in 0..600 {
            match ExecutionRepository::get_by_id(self.db.pool(), &execution_id).await {
                Ok(Some(row)) if row.parsed_status().is_terminal() => {
                    let content = match row.parsed_status() {
                        ExecutionStatus::Completed => row
                            .final_output
                            .as_deref()
                            .and_then(|s| serde_json::from_str::<Value>(s).ok())
                            .map(render_output)
                            .unwrap_or_default(),
                        other => format!("(run {})", other.as_str()),
                    };
                    if let Err(e) = SessionRepository::append_message(
                        self.db.pool(),
                        &session_id,
                        "assistant",
                        &content,
                        Some(&execution_id),
                    )
                    .await
                    {
                        warn!(session = %session_id, error = %e, "assistant append failed");
                    }
                    return;
                }
                Ok(_) => tokio::time::sleep(Duration::from_millis(100)).await,
                Err(e) => {
                    warn!(execution = %execution_id, error = %e, "terminal poll failed");
                    return;
                }
            }
        }
        warn!(execution = %execution_id, "gave up waiting for terminal state");
    }

    /// Ordered messages of a session
    pub async fn messages(
        &self,
        session_id: &str,
        caller: &AuthUser,
    ) -> ApiResult<Vec<ChatMessageRow>> {
        let session = SessionRepository::get_by_id(self.db.pool(), session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))?;
        if session.user_id != caller.user_id {
            return Err(ApiError::Forbidden("not your session".to_string()));
        }
        Ok(SessionRepository::list_messages(self.db.pool(), session_id).await?)
    }

    /// Clear message content, preserving the session shell
    pub async fn clear(&self, session_id: &str, caller: &AuthUser) -> ApiResult<()> {
        let session = SessionRepository::get_by_id(self.db.pool(), session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))?;
        if session.user_id != caller.user_id {
            return Err(ApiError::Forbidden("not your session".to_string()));
        }
        Ok(SessionRepository::clear_messages(self.db.pool(), session_id).await?)
    }
}

/// Render the final output map as the assistant message text
fn render_output(output: Value) -> String {
    match output {
        Value::Object(map) if map.len() == 1 => {
            match map.into_iter().next() {
                Some((_, Value::String(s))) => s,
                Some((_, other)) => other.to_string(),
                None => String::new(),
            }
        }
        Value::String(s) => s,
        other => other.to_string(),
    }
}
