//! Chat endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::api::error::ApiResult;
use crate::api::models::{ChatTurnRequest, ChatTurnResponse, MessageResponse};
use crate::api::routes::AppState;
use crate::auth::AuthUser;

/// Run one chat turn against a workflow
///
/// POST /agents/:workflow_id/chat
pub async fn chat_turn(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(workflow_id): Path<String>,
    Json(request): Json<ChatTurnRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let turn = state
        .chat
        .chat(
            &workflow_id,
            &request.message,
            request.session_id.as_deref(),
            &caller,
        )
        .await?;

    Ok(Json(ChatTurnResponse {
        session_id: turn.session_id,
        execution_id: turn.execution_id,
        response_head: turn.response_head,
    }))
}

/// Ordered messages of a session
///
/// GET /sessions/:id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let messages = state.chat.messages(&id, &caller).await?;
    let items: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from_row).collect();
    Ok(Json(json!({"items": items})))
}

/// Clear session content, preserving the shell
///
/// DELETE /sessions/:id/messages
pub async fn clear_messages(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    state.chat.clear(&id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}
