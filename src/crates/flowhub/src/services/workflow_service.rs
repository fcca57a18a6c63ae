//! Workflow version-store operations with ownership enforcement
//!
//! All version writes run under optimistic concurrency: a stale write
//! is retried once against the fresh row, then surfaces `Conflict`.

use rand::Rng;
use serde_json::Value;

use flowhub_graph::{BilingualText, Graph, GraphDiff, TriggerType, VersionSnapshot, Workflow};

use crate::api::error::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::repositories::{ListScope, WorkflowRepository};
use crate::db::DatabaseConnection;

/// Fields accepted at creation
#[derive(Debug, Clone)]
pub struct CreateWorkflowSpec {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<BilingualText>,
    pub is_public: bool,
    pub trigger_type: TriggerType,
    pub graph: Graph,
}

/// Fields accepted at update; `graph` triggers a version bump
#[derive(Debug, Clone, Default)]
pub struct UpdateWorkflowPatch {
    pub name: Option<String>,
    pub description: Option<BilingualText>,
    pub is_public: Option<bool>,
    pub graph: Option<Graph>,
    pub version_notes: Option<String>,
}

/// Workflow domain service
#[derive(Clone)]
pub struct WorkflowService {
    db: DatabaseConnection,
}

/// Turn a display name into a URL slug
fn slugify(name: &str) -> String {
    let mut slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        format!("workflow-{:06x}", rand::thread_rng().gen_range(0..0xffffff))
    } else {
        slug
    }
}

impl WorkflowService {
    /// Create a service over the shared connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Load a workflow for reading: public, owned, or 403
    pub async fn get_readable(&self, id: &str, caller: &AuthUser) -> ApiResult<Workflow> {
        let workflow = WorkflowRepository::get_by_id(self.db.pool(), id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("workflow {}", id)))?;
        if !workflow.is_public && workflow.owner_id != caller.user_id {
            // Admin bypass never applies to private workflows
            return Err(ApiError::Forbidden("workflow is private".to_string()));
        }
        Ok(workflow)
    }

    /// Load a workflow for writing: owner only
    pub async fn get_writable(&self, id: &str, caller: &AuthUser) -> ApiResult<Workflow> {
        let workflow = WorkflowRepository::get_by_id(self.db.pool(), id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("workflow {}", id)))?;
        if workflow.owner_id != caller.user_id {
            return Err(ApiError::Forbidden("not the workflow owner".to_string()));
        }
        Ok(workflow)
    }

    /// Create a workflow at version 1
    pub async fn create(&self, spec: CreateWorkflowSpec, caller: &AuthUser) -> ApiResult<Workflow> {
        spec.graph.validate()?;

        let base_slug = spec.slug.unwrap_or_else(|| slugify(&spec.name));
        let mut workflow = Workflow::new(&base_slug, &spec.name, &caller.user_id, spec.graph);
        workflow.description = spec.description;
        workflow.is_public = spec.is_public;
        workflow.trigger_type = spec.trigger_type;

        match WorkflowRepository::create(self.db.pool(), &workflow).await {
            Ok(()) => Ok(workflow),
            Err(e) if e.is_constraint_violation() => {
                // Slug taken; retry once with a random suffix
                workflow.slug = format!(
                    "{}-{:04x}",
                    base_slug,
                    rand::thread_rng().gen_range(0..0xffffu32)
                );
                WorkflowRepository::create(self.db.pool(), &workflow).await?;
                Ok(workflow)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Update metadata and optionally the graph (version bump)
    pub async fn update(
        &self,
        id: &str,
        patch: UpdateWorkflowPatch,
        caller: &AuthUser,
    ) -> ApiResult<Workflow> {
        if let Some(graph) = &patch.graph {
            graph.validate()?;
        }

        // Stale write retried once against the fresh row
        match self.try_update(id, &patch, caller).await {
            Err(ApiError::Conflict(_)) => self.try_update(id, &patch, caller).await,
            other => other,
        }
    }

    async fn try_update(
        &self,
        id: &str,
        patch: &UpdateWorkflowPatch,
        caller: &AuthUser,
    ) -> ApiResult<Workflow> {
        let mut workflow = self.get_writable(id, caller).await?;
        let expected_version = workflow.version;

        if let Some(name) = &patch.name {
            workflow.name = name.clone();
        }
        if let Some(description) = &patch.description {
            workflow.description = Some(description.clone());
        }
        if let Some(is_public) = patch.is_public {
            workflow.is_public = is_public;
        }
        if let Some(graph) = &patch.graph {
            workflow.apply_edit(graph.clone(), &caller.user_id, patch.version_notes.clone());
        }

        WorkflowRepository::update_versioned(self.db.pool(), &workflow, expected_version).await?;
        Ok(workflow)
    }

    /// Non-destructive revert to a recorded version
    pub async fn revert(
        &self,
        id: &str,
        target_version: u32,
        caller: &AuthUser,
    ) -> ApiResult<Workflow> {
        match self.try_revert(id, target_version, caller).await {
            Err(ApiError::Conflict(_)) => self.try_revert(id, target_version, caller).await,
            other => other,
        }
    }

    async fn try_revert(
        &self,
        id: &str,
        target_version: u32,
        caller: &AuthUser,
    ) -> ApiResult<Workflow> {
        let mut workflow = self.get_writable(id, caller).await?;
        let expected_version = workflow.version;
        workflow.revert_to(target_version, &caller.user_id)?;
        WorkflowRepository::update_versioned(self.db.pool(), &workflow, expected_version).await?;
        Ok(workflow)
    }

    /// Version listing: current version plus history
    pub async fn versions(
        &self,
        id: &str,
        caller: &AuthUser,
    ) -> ApiResult<(u32, Vec<VersionSnapshot>)> {
        let workflow = self.get_readable(id, caller).await?;
        Ok((workflow.version, workflow.version_history))
    }

    /// Diff two recorded versions
    pub async fn compare(
        &self,
        id: &str,
        v1: u32,
        v2: u32,
        caller: &AuthUser,
    ) -> ApiResult<GraphDiff> {
        let workflow = self.get_readable(id, caller).await?;
        let older = workflow.graph_at(v1)?;
        let newer = workflow.graph_at(v2)?;
        Ok(GraphDiff::between(older, newer))
    }

    /// Clone into the caller's namespace, preserving lineage
    pub async fn fork(&self, id: &str, caller: &AuthUser) -> ApiResult<Workflow> {
        let source = self.get_readable(id, caller).await?;

        let mut fork = Workflow::new(
            format!(
                "{}-fork-{:04x}",
                source.slug,
                rand::thread_rng().gen_range(0..0xffffu32)
            ),
            source.name.clone(),
            &caller.user_id,
            source.graph.clone(),
        );
        fork.description = source.description.clone();
        fork.trigger_type = source.trigger_type;
        fork.forked_from = Some(source.id);
        // Popularity does not transfer with a fork

        WorkflowRepository::create(self.db.pool(), &fork).await?;
        Ok(fork)
    }

    /// Delete, refused while unfinished executions reference the workflow
    pub async fn delete(&self, id: &str, caller: &AuthUser) -> ApiResult<()> {
        let workflow = self.get_writable(id, caller).await?;
        let unfinished =
            WorkflowRepository::count_unfinished_executions(self.db.pool(), &workflow.id.to_string())
                .await?;
        if unfinished > 0 {
            return Err(ApiError::Conflict(format!(
                "{} execution(s) still running",
                unfinished
            )));
        }
        WorkflowRepository::delete(self.db.pool(), &workflow.id.to_string()).await?;
        Ok(())
    }

    /// List workflows in a scope
    pub async fn list(
        &self,
        scope: &str,
        caller: &AuthUser,
        page: i64,
        limit: i64,
    ) -> ApiResult<Vec<Workflow>> {
        let scope = match scope {
            "mine" => ListScope::Mine(&caller.user_id),
            "public" => ListScope::Public,
            other => {
                return Err(ApiError::BadRequest(format!(
                    "unknown scope '{}' (expected mine|public)",
                    other
                )))
            }
        };
        Ok(WorkflowRepository::list(self.db.pool(), scope, page * limit, limit).await?)
    }

    /// Extract the graph of a specific version for the engine
    pub fn graph_for_run(workflow: &Workflow) -> (u32, Graph) {
        (workflow.version, workflow.graph.clone())
    }

    /// Convenience JSON projection used by handlers
    pub fn to_json(workflow: &Workflow) -> Value {
        serde_json::to_value(workflow).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowhub_graph::{Edge, InputType, Node, NodeKind, OutputFormat};
    use serde_json::json;

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::new(
            "in",
            NodeKind::Input {
                input_type: InputType::Text,
                default: Some(json!("x")),
            },
        ));
        graph.add_node(Node::new("out", NodeKind::Output { format: OutputFormat::Auto }));
        graph.add_edge(Edge::new("e1", "in", "out"));
        graph
    }

    fn alice() -> AuthUser {
        AuthUser {
            user_id: "alice".to_string(),
            is_admin: false,
        }
    }

    fn bob() -> AuthUser {
        AuthUser {
            user_id: "bob".to_string(),
            is_admin: true,
        }
    }

    async fn service() -> WorkflowService {
        let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        WorkflowService::new(db)
    }

    fn spec(name: &str) -> CreateWorkflowSpec {
        CreateWorkflowSpec {
            name: name.to_string(),
            slug: None,
            description: None,
            is_public: false,
            trigger_type: TriggerType::Manual,
            graph: graph(),
        }
    }

    #[tokio::test]
    async fn test_create_slugifies_name() {
        let service = service().await;
        let workflow = service.create(spec("My First Flow!"), &alice()).await.unwrap();
        assert_eq!(workflow.slug, "my-first-flow");
        assert_eq!(workflow.version, 1);
    }

    #[tokio::test]
    async fn test_private_workflow_hidden_from_others_even_admin() {
        let service = service().await;
        let workflow = service.create(spec("Secret"), &alice()).await.unwrap();

        let err = service
            .get_readable(&workflow.id.to_string(), &bob())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_revert_restores() {
        let service = service().await;
        let workflow = service.create(spec("Flow"), &alice()).await.unwrap();
        let id = workflow.id.to_string();

        let mut bigger = graph();
        bigger.add_node(Node::new("out2", NodeKind::Output { format: OutputFormat::Auto }));
        bigger.add_edge(Edge::new("e2", "in", "out2"));

        let updated = service
            .update(
                &id,
                UpdateWorkflowPatch {
                    graph: Some(bigger),
                    version_notes: Some("add out2".to_string()),
                    ..Default::default()
                },
                &alice(),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.version_history.len(), 1);

        let reverted = service.revert(&id, 1, &alice()).await.unwrap();
        assert_eq!(reverted.version, 3);
        assert_eq!(
            flowhub_graph::canonical_graph(&reverted.graph),
            flowhub_graph::canonical_graph(&workflow.graph)
        );
    }

    #[tokio::test]
    async fn test_compare_versions() {
        let service = service().await;
        let workflow = service.create(spec("Flow"), &alice()).await.unwrap();
        let id = workflow.id.to_string();

        let mut bigger = graph();
        bigger.add_node(Node::new("mid", NodeKind::Output { format: OutputFormat::Auto }));
        bigger.add_edge(Edge::new("e2", "in", "mid"));
        service
            .update(
                &id,
                UpdateWorkflowPatch {
                    graph: Some(bigger),
                    ..Default::default()
                },
                &alice(),
            )
            .await
            .unwrap();

        let diff = service.compare(&id, 1, 2, &alice()).await.unwrap();
        assert_eq!(diff.nodes_added.len(), 1);
        assert_eq!(diff.nodes_added[0].id, "mid");

        let err = service.compare(&id, 1, 99, &alice()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fork_resets_counters_and_links_lineage() {
        let service = service().await;
        let mut source = service.create(spec("Popular"), &alice()).await.unwrap();
        source.is_public = true;
        // Make it public so bob can fork it
        service
            .update(
                &source.id.to_string(),
                UpdateWorkflowPatch {
                    is_public: Some(true),
                    ..Default::default()
                },
                &alice(),
            )
            .await
            .unwrap();

        let fork = service.fork(&source.id.to_string(), &bob()).await.unwrap();
        assert_eq!(fork.owner_id, "bob");
        assert_eq!(fork.version, 1);
        assert_eq!(fork.star_count, 0);
        assert_eq!(fork.forked_from, Some(source.id));
    }

    #[tokio::test]
    async fn test_update_requires_ownership() {
        let service = service().await;
        let workflow = service.create(spec("Mine"), &alice()).await.unwrap();

        let err = service
            .update(
                &workflow.id.to_string(),
                UpdateWorkflowPatch {
                    name: Some("Stolen".to_string()),
                    ..Default::default()
                },
                &bob(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}
