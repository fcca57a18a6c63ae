//! Execution endpoints, including the SSE event stream
//!
//! `GET /executions/{id}` returns the JSON record, or an SSE stream of
//! step events when the client sends `Accept: text/event-stream`.
//! Frames carry `event: <kind>`, `data: <json>` and `id: <seq>`;
//! clients reconnect with `Last-Event-ID` to resume after `seq`.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use uuid::Uuid;

use flowhub_engine::{StepEvent, StepEventKind};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{page_params, ExecutionListQuery, ExecutionResponse, RunRequest};
use crate::api::routes::AppState;
use crate::auth::AuthUser;

/// Start a run
///
/// POST /executions/run
pub async fn run_execution(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(request): Json<RunRequest>,
) -> ApiResult<impl IntoResponse> {
    let input = request.input.unwrap_or_else(|| json!({}));
    let row = state
        .executions
        .run(&request.workflow_id, input, &caller)
        .await?;
    Ok((StatusCode::CREATED, Json(ExecutionResponse::from_row(row))))
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

fn last_event_id(headers: &HeaderMap) -> u64 {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn sse_frame(event: &StepEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default()
        .event(event.kind.as_str())
        .data(data)
        .id(event.seq.to_string())
}

fn is_terminal_frame(event: &StepEvent) -> bool {
    event.node_id.is_empty()
        && matches!(
            event.kind,
            StepEventKind::Completed | StepEventKind::Failed | StepEventKind::Cancelled
        )
}

/// Read an execution, or stream its events
///
/// GET /executions/:id
pub async fn get_execution(
    State(state): State<AppState>,
    caller: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let row = state.executions.get(&id, &caller).await?;

    if !wants_event_stream(&headers) {
        return Ok(Json(ExecutionResponse::from_row(row)).into_response());
    }

    let after_seq = last_event_id(&headers);
    let execution_id = Uuid::parse_str(&row.id)
        .map_err(|_| ApiError::InternalError("bad execution id".to_string()))?;

    // Live runs stream from the bus; terminal runs replay the log
    if let Some(mut subscription) = state.executions.live_subscription(execution_id, after_seq) {
        let stream = async_stream::stream! {
            while let Some(event) = subscription.next().await {
                let terminal = is_terminal_frame(&event);
                yield Ok::<Event, Infallible>(sse_frame(&event));
                if terminal {
                    break;
                }
            }
        };
        return Ok(sse_response(stream));
    }

    let events = state.executions.subscribe(&id, after_seq, &caller).await?;
    let stream = async_stream::stream! {
        for event in events {
            yield Ok::<Event, Infallible>(sse_frame(&event));
        }
    };
    Ok(sse_response(stream))
}

fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

/// Request cancellation
///
/// POST /executions/:id/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.executions.cancel(&id, &caller).await?;
    Ok(StatusCode::ACCEPTED)
}

/// List the caller's executions
///
/// GET /executions?status=&page=&limit=
pub async fn list_executions(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ExecutionListQuery>,
) -> ApiResult<impl IntoResponse> {
    let (page, limit) = page_params(query.page, query.limit)?;
    let rows = state
        .executions
        .list(&caller, query.status.as_deref(), page, limit)
        .await?;
    let items: Vec<ExecutionResponse> = rows.into_iter().map(ExecutionResponse::from_row).collect();
    Ok(Json(json!({
        "items": items,
        "page": page,
        "limit": limit,
    })))
}
