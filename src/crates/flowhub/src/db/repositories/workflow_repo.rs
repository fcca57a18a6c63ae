//! Workflow repository
//!
//! Version writes use optimistic concurrency: the UPDATE is guarded by
//! the expected version and a zero-row result is a conflict.

use chrono::Utc;

use flowhub_graph::Workflow;

use crate::db::connection::DatabasePool;
use crate::db::error::DatabaseError;
use crate::db::models::WorkflowRow;

/// Listing scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope<'a> {
    /// Workflows owned by the user
    Mine(&'a str),
    /// Public workflows
    Public,
}

/// Workflow database operations
pub struct WorkflowRepository;

impl WorkflowRepository {
    /// Insert a new workflow
    pub async fn create(
        pool: &DatabasePool,
        workflow: &Workflow,
    ) -> Result<(), DatabaseError> {
        let row = WorkflowRow::from_domain(workflow)?;
        sqlx::query(
            "INSERT INTO workflows (id, slug, name, description, is_public, owner_id, version,
                                    graph, version_history, trigger_type, run_count, star_count,
                                    forked_from, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.slug)
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.is_public)
        .bind(&row.owner_id)
        .bind(row.version)
        .bind(&row.graph)
        .bind(&row.version_history)
        .bind(&row.trigger_type)
        .bind(row.run_count)
        .bind(row.star_count)
        .bind(&row.forked_from)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fetch a workflow by id
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<Workflow>, DatabaseError> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(WorkflowRow::into_domain).transpose()
    }

    /// Fetch a workflow by slug
    pub async fn get_by_slug(
        pool: &DatabasePool,
        slug: &str,
    ) -> Result<Option<Workflow>, DatabaseError> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE slug = ?")
            .bind(slug)
            .fetch_optional(pool)
            .await?;
        row.map(WorkflowRow::into_domain).transpose()
    }

    /// List workflows in a scope, newest first
    pub async fn list(
        pool: &DatabasePool,
        scope: ListScope<'_>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Workflow>, DatabaseError> {
        let rows = match scope {
            ListScope::Mine(owner) => {
                sqlx::query_as::<_, WorkflowRow>(
                    "SELECT * FROM workflows WHERE owner_id = ?
                     ORDER BY updated_at DESC LIMIT ? OFFSET ?",
                )
                .bind(owner)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
            ListScope::Public => {
                sqlx::query_as::<_, WorkflowRow>(
                    "SELECT * FROM workflows WHERE is_public = 1
                     ORDER BY updated_at DESC LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
        };
        rows.into_iter().map(WorkflowRow::into_domain).collect()
    }

    /// Persist a version write guarded by the expected pre-write version
    ///
    /// `workflow` must already carry the incremented version and the
    /// appended history snapshot; `expected_version` is the version the
    /// writer loaded. A stale expectation yields `VersionConflict`.
    pub async fn update_versioned(
        pool: &DatabasePool,
        workflow: &Workflow,
        expected_version: u32,
    ) -> Result<(), DatabaseError> {
        let row = WorkflowRow::from_domain(workflow)?;
        let result = sqlx::query(
            "UPDATE workflows
             SET name = ?, description = ?, is_public = ?, version = ?, graph = ?,
                 version_history = ?, trigger_type = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.is_public)
        .bind(row.version)
        .bind(&row.graph)
        .bind(&row.version_history)
        .bind(&row.trigger_type)
        .bind(&row.updated_at)
        .bind(&row.id)
        .bind(expected_version as i64)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::VersionConflict {
                entity: "workflow",
                id: row.id,
            });
        }
        Ok(())
    }

    /// Increment the completed-run counter
    pub async fn increment_run_count(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE workflows SET run_count = run_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete a workflow
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Count executions of the workflow that are not terminal yet
    pub async fn count_unfinished_executions(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<i64, DatabaseError> {
        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM executions
             WHERE workflow_id = ? AND status IN ('pending', 'running', 'streaming')",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;
    use flowhub_graph::{Graph, Node, NodeKind, OutputFormat};

    async fn setup() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    fn workflow(slug: &str, owner: &str) -> Workflow {
        let mut graph = Graph::new();
        graph.add_node(Node::new("o", NodeKind::Output { format: OutputFormat::Auto }));
        Workflow::new(slug, "Test", owner, graph)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let pool = setup().await;
        let wf = workflow("demo", "alice");
        WorkflowRepository::create(&pool, &wf).await.unwrap();

        let loaded = WorkflowRepository::get_by_id(&pool, &wf.id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.slug, "demo");
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_versioned_update_conflict() {
        let pool = setup().await;
        let mut wf = workflow("demo", "alice");
        WorkflowRepository::create(&pool, &wf).await.unwrap();

        wf.apply_edit(wf.graph.clone(), "alice", None);
        WorkflowRepository::update_versioned(&pool, &wf, 1)
            .await
            .unwrap();

        // Same expectation again is now stale
        let err = WorkflowRepository::update_versioned(&pool, &wf, 1)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_scopes() {
        let pool = setup().await;
        let mut mine = workflow("mine", "alice");
        mine.is_public = false;
        let mut public = workflow("public", "bob");
        public.is_public = true;
        WorkflowRepository::create(&pool, &mine).await.unwrap();
        WorkflowRepository::create(&pool, &public).await.unwrap();

        let mine_list = WorkflowRepository::list(&pool, ListScope::Mine("alice"), 0, 10)
            .await
            .unwrap();
        assert_eq!(mine_list.len(), 1);
        assert_eq!(mine_list[0].slug, "mine");

        let public_list = WorkflowRepository::list(&pool, ListScope::Public, 0, 10)
            .await
            .unwrap();
        assert_eq!(public_list.len(), 1);
        assert_eq!(public_list[0].slug, "public");
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_constraint_violation() {
        let pool = setup().await;
        WorkflowRepository::create(&pool, &workflow("dup", "alice"))
            .await
            .unwrap();
        let err = WorkflowRepository::create(&pool, &workflow("dup", "bob"))
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
