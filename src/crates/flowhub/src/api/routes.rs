//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::auth::SharedVerifier;
use crate::db::DatabaseConnection;
use crate::services::{ChatService, ExecutionService, WorkflowService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub verifier: SharedVerifier,
    pub workflows: WorkflowService,
    pub executions: ExecutionService,
    pub chat: ChatService,
}

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and metadata
        .route("/health", get(handlers::health))
        .route("/system/info", get(handlers::system_info))
        // Workflow endpoints
        .route(
            "/workflows",
            post(handlers::create_workflow).get(handlers::list_workflows),
        )
        .route(
            "/workflows/:id",
            get(handlers::get_workflow)
                .put(handlers::update_workflow)
                .delete(handlers::delete_workflow),
        )
        .route("/workflows/:id/fork", post(handlers::fork_workflow))
        .route("/workflows/:id/versions", get(handlers::list_versions))
        .route(
            "/workflows/:id/versions/compare",
            get(handlers::compare_versions),
        )
        .route("/workflows/:id/revert", post(handlers::revert_workflow))
        .route(
            "/workflows/:id/executions",
            get(handlers::list_workflow_executions),
        )
        // Execution endpoints
        .route("/executions/run", post(handlers::run_execution))
        .route("/executions", get(handlers::list_executions))
        .route("/executions/:id", get(handlers::get_execution))
        .route("/executions/:id/cancel", post(handlers::cancel_execution))
        // Chat endpoints
        .route("/agents/:workflow_id/chat", post(handlers::chat_turn))
        .route(
            "/sessions/:id/messages",
            get(handlers::list_messages).delete(handlers::clear_messages),
        )
        // Quota
        .route("/users/me/usage", get(handlers::my_usage))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
