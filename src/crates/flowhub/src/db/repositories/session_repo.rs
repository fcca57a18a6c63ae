//! Chat session repository
//!
//! Message appends update the session counters in the same transaction.
//! Clearing removes messages but keeps the session shell.

use chrono::Utc;
use uuid::Uuid;

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use crate::db::models::{ChatMessageRow, ChatSessionRow};

/// Chat session database operations
pub struct SessionRepository;

impl SessionRepository {
    /// Create a session shell
    pub async fn create(
        pool: &DatabasePool,
        workflow_id: &str,
        user_id: &str,
    ) -> Result<ChatSessionRow, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO chat_sessions (id, workflow_id, user_id, created_at, message_count)
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&id)
        .bind(workflow_id)
        .bind(user_id)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(ChatSessionRow {
            id,
            workflow_id: workflow_id.to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            last_message_at: None,
            message_count: 0,
        })
    }

    /// Fetch a session by id
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<ChatSessionRow>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, ChatSessionRow>("SELECT * FROM chat_sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?,
        )
    }

    /// Append a message and bump the session counters atomically
    pub async fn append_message(
        pool: &DatabasePool,
        session_id: &str,
        role: &str,
        content: &str,
        execution_id: Option<&str>,
    ) -> Result<ChatMessageRow, DatabaseError> {
        let mut tx = pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, role, content, execution_id, at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(execution_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chat_sessions
             SET message_count = message_count + 1, last_message_at = ?
             WHERE id = ?",
        )
        .bind(&now)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChatMessageRow {
            id,
            session_id: session_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            execution_id: execution_id.map(str::to_string),
            at: now,
        })
    }

    /// Messages of a session in order
    pub async fn list_messages(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<Vec<ChatMessageRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, ChatMessageRow>(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY at, id",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?)
    }

    /// Remove all messages, keeping the session shell
    pub async fn clear_messages(
        pool: &DatabasePool,
        session_id: &str,
    ) -> Result<(), DatabaseError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE chat_sessions SET message_count = 0 WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    async fn setup() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_append_updates_counters() {
        let pool = setup().await;
        let session = SessionRepository::create(&pool, "wf-1", "alice").await.unwrap();

        SessionRepository::append_message(&pool, &session.id, "user", "hello", None)
            .await
            .unwrap();
        SessionRepository::append_message(&pool, &session.id, "assistant", "hi", Some("ex-1"))
            .await
            .unwrap();

        let session = SessionRepository::get_by_id(&pool, &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.message_count, 2);
        assert!(session.last_message_at.is_some());

        let messages = SessionRepository::list_messages(&pool, &session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].execution_id.as_deref(), Some("ex-1"));
    }

    #[tokio::test]
    async fn test_clear_keeps_shell() {
        let pool = setup().await;
        let session = SessionRepository::create(&pool, "wf-1", "alice").await.unwrap();
        SessionRepository::append_message(&pool, &session.id, "user", "hello", None)
            .await
            .unwrap();

        SessionRepository::clear_messages(&pool, &session.id).await.unwrap();

        let shell = SessionRepository::get_by_id(&pool, &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shell.message_count, 0);
        assert!(SessionRepository::list_messages(&pool, &session.id)
            .await
            .unwrap()
            .is_empty());
    }
}
