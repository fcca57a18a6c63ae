//! Request and response DTOs

use serde::{Deserialize, Serialize};
use serde_json::Value;

use flowhub_graph::{BilingualText, Graph, TriggerType, Workflow};

use crate::api::error::{ApiError, ApiResult};
use crate::db::models::{ChatMessageRow, ExecutionRow};

/// Body of `POST /workflows`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<BilingualText>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub trigger_type: TriggerType,
    pub graph: Graph,
}

impl CreateWorkflowRequest {
    /// Request-shape validation before the service runs
    pub fn validate(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("name must not be empty".to_string()));
        }
        if self.graph.nodes.is_empty() {
            return Err(ApiError::BadRequest("graph must have nodes".to_string()));
        }
        Ok(())
    }
}

/// Body of `PUT /workflows/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<BilingualText>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub graph: Option<Graph>,
    #[serde(default)]
    pub version_notes: Option<String>,
}

impl UpdateWorkflowRequest {
    /// Whether anything would change
    pub fn has_updates(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.is_public.is_some()
            || self.graph.is_some()
    }
}

/// Body of `POST /workflows/{id}/revert`
#[derive(Debug, Clone, Deserialize)]
pub struct RevertRequest {
    pub target_version: u32,
}

/// Query of `GET /workflows`
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowListQuery {
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

fn default_scope() -> String {
    "public".to_string()
}

/// Query of `GET /workflows/{id}/versions/compare`
#[derive(Debug, Clone, Deserialize)]
pub struct CompareQuery {
    pub v1: u32,
    pub v2: u32,
}

/// Body of `POST /executions/run`
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub input: Option<Value>,
}

/// Query of `GET /executions`
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Body of `POST /agents/{workflow_id}/chat`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response of a chat turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurnResponse {
    pub session_id: String,
    pub execution_id: String,
    pub response_head: String,
}

/// Workflow projection returned by the API (full domain shape)
pub type WorkflowResponse = Workflow;

/// Execution projection with JSON columns decoded
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResponse {
    pub id: String,
    pub workflow_id: String,
    pub workflow_version: i64,
    pub status: String,
    pub input_envelope: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<Value>,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub step_count: usize,
}

impl ExecutionResponse {
    /// Decode an execution row into the API shape
    pub fn from_row(row: ExecutionRow) -> Self {
        let parse = |s: &Option<String>| {
            s.as_deref()
                .and_then(|s| serde_json::from_str::<Value>(s).ok())
        };
        let step_count = row.step_events().map(|e| e.len()).unwrap_or(0);
        Self {
            id: row.id.clone(),
            workflow_id: row.workflow_id.clone(),
            workflow_version: row.workflow_version,
            status: row.status.clone(),
            input_envelope: serde_json::from_str(&row.input_envelope).unwrap_or(Value::Null),
            final_output: parse(&row.final_output),
            error: parse(&row.error),
            token_usage: parse(&row.token_usage),
            started_at: row.started_at,
            finished_at: row.finished_at,
            step_count,
        }
    }
}

/// Message projection
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub at: String,
}

impl MessageResponse {
    /// Project a message row
    pub fn from_row(row: ChatMessageRow) -> Self {
        Self {
            id: row.id,
            role: row.role,
            content: row.content,
            execution_id: row.execution_id,
            at: row.at,
        }
    }
}

/// Response of `GET /users/me/usage`
#[derive(Debug, Clone, Serialize)]
pub struct UsageResponse {
    pub limit: i64,
    pub used: i64,
    pub resets_at: String,
}

/// Pagination helpers shared by list endpoints
pub fn page_params(page: Option<i64>, limit: Option<i64>) -> ApiResult<(i64, i64)> {
    let page = page.unwrap_or(0);
    let limit = limit.unwrap_or(20);
    if page < 0 || !(1..=100).contains(&limit) {
        return Err(ApiError::BadRequest(
            "page must be >= 0 and limit in 1..=100".to_string(),
        ));
    }
    Ok((page, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_validation() {
        let request: CreateWorkflowRequest = serde_json::from_value(json!({
            "name": "Flow",
            "graph": {"nodes": [{"id": "o", "type": "output"}], "edges": []}
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let empty: CreateWorkflowRequest = serde_json::from_value(json!({
            "name": " ",
            "graph": {"nodes": [], "edges": []}
        }))
        .unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_page_params_bounds() {
        assert_eq!(page_params(None, None).unwrap(), (0, 20));
        assert!(page_params(Some(-1), None).is_err());
        assert!(page_params(None, Some(101)).is_err());
    }
}
