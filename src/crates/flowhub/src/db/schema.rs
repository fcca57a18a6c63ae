//! Schema initialization
//!
//! Idempotent CREATE TABLE statements run at startup. Timestamps are
//! RFC3339 strings and structured fields are JSON text, both SQLite
//! conventions shared by every repository.

use sqlx::sqlite::SqlitePool;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT,
        is_public INTEGER NOT NULL DEFAULT 0,
        owner_id TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        graph TEXT NOT NULL,
        version_history TEXT NOT NULL DEFAULT '[]',
        trigger_type TEXT NOT NULL DEFAULT 'manual',
        run_count INTEGER NOT NULL DEFAULT 0,
        star_count INTEGER NOT NULL DEFAULT 0,
        forked_from TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (trigger_type IN ('manual', 'scheduled', 'chat'))
    )",
    "CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY NOT NULL,
        workflow_id TEXT NOT NULL,
        workflow_version INTEGER NOT NULL,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        input_envelope TEXT NOT NULL DEFAULT '{}',
        step_log TEXT NOT NULL DEFAULT '[]',
        final_output TEXT,
        error TEXT,
        token_usage TEXT,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        CHECK (status IN ('pending', 'running', 'streaming', 'completed', 'failed', 'cancelled'))
    )",
    "CREATE INDEX IF NOT EXISTS idx_executions_user ON executions (user_id, started_at)",
    "CREATE INDEX IF NOT EXISTS idx_executions_workflow ON executions (workflow_id, started_at)",
    "CREATE TABLE IF NOT EXISTS checkpoints (
        execution_id TEXT NOT NULL,
        number INTEGER NOT NULL,
        after_node_id TEXT NOT NULL,
        node_outputs TEXT NOT NULL,
        frontier TEXT NOT NULL,
        last_seq INTEGER NOT NULL DEFAULT 0,
        at TEXT NOT NULL,
        PRIMARY KEY (execution_id, number)
    )",
    "CREATE TABLE IF NOT EXISTS chat_sessions (
        id TEXT PRIMARY KEY NOT NULL,
        workflow_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_message_at TEXT,
        message_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS chat_messages (
        id TEXT PRIMARY KEY NOT NULL,
        session_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        execution_id TEXT,
        at TEXT NOT NULL,
        CHECK (role IN ('user', 'assistant'))
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages (session_id, at)",
    "CREATE TABLE IF NOT EXISTS quotas (
        user_id TEXT PRIMARY KEY NOT NULL,
        limit_per_day INTEGER NOT NULL,
        used_today INTEGER NOT NULL DEFAULT 0,
        resets_at TEXT NOT NULL,
        utc_offset_minutes INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS catalogue_records (
        source TEXT NOT NULL,
        slug TEXT NOT NULL,
        name_en TEXT NOT NULL DEFAULT '',
        name_zh TEXT NOT NULL DEFAULT '',
        description_en TEXT NOT NULL DEFAULT '',
        description_zh TEXT NOT NULL DEFAULT '',
        pricing TEXT NOT NULL DEFAULT 'unknown',
        ready INTEGER NOT NULL DEFAULT 0,
        index_retry_pending INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (source, slug)
    )",
];

/// Create all tables and indexes if absent
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();
    }
}
