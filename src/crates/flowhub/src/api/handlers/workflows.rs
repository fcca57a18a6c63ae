//! Workflow CRUD, versioning and fork endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::api::error::ApiResult;
use crate::api::models::{
    page_params, CompareQuery, CreateWorkflowRequest, ExecutionResponse, RevertRequest,
    UpdateWorkflowRequest, WorkflowListQuery,
};
use crate::api::routes::AppState;
use crate::auth::AuthUser;
use crate::db::repositories::ExecutionRepository;
use crate::services::workflow_service::{CreateWorkflowSpec, UpdateWorkflowPatch};

/// Create a new workflow
///
/// POST /workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<CreateWorkflowRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    request.validate()?;

    let workflow = state
        .workflows
        .create(
            CreateWorkflowSpec {
                name: request.name,
                slug: request.slug,
                description: request.description,
                is_public: request.is_public,
                trigger_type: request.trigger_type,
                graph: request.graph,
            },
            &caller,
        )
        .await?;

    tracing::info!(workflow = %workflow.id, owner = %caller.user_id, "workflow created");
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// Read one workflow
///
/// GET /workflows/:id
pub async fn get_workflow(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workflow = state.workflows.get_readable(&id, &caller).await?;
    Ok(Json(workflow))
}

/// List workflows in a scope
///
/// GET /workflows?scope=mine|public&page=&limit=
pub async fn list_workflows(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<WorkflowListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let (page, limit) = page_params(query.page, query.limit)?;
    let workflows = state
        .workflows
        .list(&query.scope, &caller, page, limit)
        .await?;
    Ok(Json(json!({
        "items": workflows,
        "page": page,
        "limit": limit,
    })))
}

/// Update a workflow; a graph change bumps the version
///
/// PUT /workflows/:id
pub async fn update_workflow(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateWorkflowRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !request.has_updates() {
        return Err(crate::api::error::ApiError::BadRequest(
            "no fields to update".to_string(),
        ));
    }

    let workflow = state
        .workflows
        .update(
            &id,
            UpdateWorkflowPatch {
                name: request.name,
                description: request.description,
                is_public: request.is_public,
                graph: request.graph,
                version_notes: request.version_notes,
            },
            &caller,
        )
        .await?;

    tracing::info!(workflow = %workflow.id, version = workflow.version, "workflow updated");
    Ok(Json(workflow))
}

/// Delete a workflow
///
/// DELETE /workflows/:id
pub async fn delete_workflow(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    state.workflows.delete(&id, &caller).await?;
    tracing::info!(workflow = %id, "workflow deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Fork into the caller's namespace
///
/// POST /workflows/:id/fork
pub async fn fork_workflow(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let fork = state.workflows.fork(&id, &caller).await?;
    tracing::info!(source = %id, fork = %fork.id, "workflow forked");
    Ok((StatusCode::CREATED, Json(fork)))
}

/// Version listing
///
/// GET /workflows/:id/versions
pub async fn list_versions(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let (current_version, history) = state.workflows.versions(&id, &caller).await?;
    Ok(Json(json!({
        "current_version": current_version,
        "history": history,
    })))
}

/// Diff two versions
///
/// GET /workflows/:id/versions/compare?v1=&v2=
pub async fn compare_versions(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let diff = state
        .workflows
        .compare(&id, query.v1, query.v2, &caller)
        .await?;
    Ok(Json(diff))
}

/// Non-destructive revert
///
/// POST /workflows/:id/revert
pub async fn revert_workflow(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<RevertRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workflow = state
        .workflows
        .revert(&id, request.target_version, &caller)
        .await?;
    tracing::info!(workflow = %id, target = request.target_version, version = workflow.version,
                   "workflow reverted");
    Ok(Json(workflow))
}

/// Run history of one workflow
///
/// GET /workflows/:id/executions
pub async fn list_workflow_executions(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    // Access check happens via the workflow read path
    let workflow = state.workflows.get_readable(&id, &caller).await?;
    let rows = ExecutionRepository::list_for_workflow(
        state.db.pool(),
        &workflow.id.to_string(),
        0,
        50,
    )
    .await?;

    // Foreign runs of a public workflow stay private
    let mine: Vec<ExecutionResponse> = rows
        .into_iter()
        .filter(|row| row.user_id == caller.user_id)
        .map(ExecutionResponse::from_row)
        .collect();
    Ok(Json(json!({"items": mine})))
}
