//! Execution row model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use flowhub_engine::{ExecutionRecord, ExecutionStatus, StepEvent};
use flowhub_llm::TokenUsage;

use crate::db::error::DatabaseError;

/// An execution as stored in SQLite
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    /// UUID string
    pub id: String,
    /// Workflow UUID string
    pub workflow_id: String,
    /// Executed version
    pub workflow_version: i64,
    /// Invoking user
    pub user_id: String,
    /// Status string
    pub status: String,
    /// Input envelope JSON
    pub input_envelope: String,
    /// Step log JSON array
    pub step_log: String,
    /// Final output JSON, when completed
    pub final_output: Option<String>,
    /// Terminal error JSON, when failed
    pub error: Option<String>,
    /// Token usage JSON, when any LLM ran
    pub token_usage: Option<String>,
    /// RFC3339
    pub started_at: String,
    /// RFC3339, terminal states only
    pub finished_at: Option<String>,
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl ExecutionRow {
    /// Row for a freshly admitted run
    pub fn pending(
        id: Uuid,
        workflow_id: Uuid,
        workflow_version: u32,
        user_id: &str,
        input_envelope: &serde_json::Value,
    ) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: id.to_string(),
            workflow_id: workflow_id.to_string(),
            workflow_version: workflow_version as i64,
            user_id: user_id.to_string(),
            status: ExecutionStatus::Pending.as_str().to_string(),
            input_envelope: serde_json::to_string(input_envelope)?,
            step_log: "[]".to_string(),
            final_output: None,
            error: None,
            token_usage: None,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
        })
    }

    /// Decode the step log column
    pub fn step_events(&self) -> Result<Vec<StepEvent>, DatabaseError> {
        Ok(serde_json::from_str(&self.step_log)?)
    }

    /// Decode the status column
    pub fn parsed_status(&self) -> ExecutionStatus {
        ExecutionStatus::parse(&self.status).unwrap_or(ExecutionStatus::Pending)
    }

    /// Decode the token usage column
    pub fn parsed_usage(&self) -> Option<TokenUsage> {
        self.token_usage
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
    }

    /// Project the row into the engine's record shape
    pub fn into_record(self) -> Result<ExecutionRecord, DatabaseError> {
        let status = self.parsed_status();
        let token_usage = self.parsed_usage();
        Ok(ExecutionRecord {
            id: Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::nil()),
            workflow_id: Uuid::parse_str(&self.workflow_id).unwrap_or_else(|_| Uuid::nil()),
            workflow_version: self.workflow_version as u32,
            user_id: self.user_id,
            status,
            input_envelope: serde_json::from_str(&self.input_envelope)?,
            final_output: self
                .final_output
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            error: self.error.as_deref().map(serde_json::from_str).transpose()?,
            token_usage,
            started_at: parse_time(&self.started_at),
            finished_at: self.finished_at.as_deref().map(parse_time),
            step_count: serde_json::from_str::<Vec<StepEvent>>(&self.step_log)
                .map(|events| events.len() as u64)
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_row_shape() {
        let row = ExecutionRow::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            3,
            "alice",
            &json!({"q": "42"}),
        )
        .unwrap();

        assert_eq!(row.status, "pending");
        assert_eq!(row.workflow_version, 3);
        assert!(row.step_events().unwrap().is_empty());
    }

    #[test]
    fn test_into_record() {
        let mut row = ExecutionRow::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            "alice",
            &json!({}),
        )
        .unwrap();
        row.status = "completed".to_string();
        row.final_output = Some(r#"{"out": "hi"}"#.to_string());
        row.finished_at = Some(Utc::now().to_rfc3339());

        let record = row.into_record().unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.final_output, Some(json!({"out": "hi"})));
    }
}
