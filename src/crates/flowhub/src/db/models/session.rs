//! Chat session and message row models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A chat session shell
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatSessionRow {
    /// UUID string
    pub id: String,
    /// Workflow the session chats with
    pub workflow_id: String,
    /// Owning user
    pub user_id: String,
    /// RFC3339
    pub created_at: String,
    /// RFC3339 of the latest message
    pub last_message_at: Option<String>,
    /// Number of messages currently in the session
    pub message_count: i64,
}

/// One message of a session
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessageRow {
    /// UUID string
    pub id: String,
    /// Owning session
    pub session_id: String,
    /// `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
    /// Execution that produced an assistant message
    pub execution_id: Option<String>,
    /// RFC3339
    pub at: String,
}
