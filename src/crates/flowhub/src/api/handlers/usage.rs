//! Quota usage endpoint

use axum::{extract::State, Json};

use crate::api::error::ApiResult;
use crate::api::models::UsageResponse;
use crate::api::routes::AppState;
use crate::auth::AuthUser;

/// Current quota status of the caller
///
/// GET /users/me/usage
pub async fn my_usage(
    State(state): State<AppState>,
    caller: AuthUser,
) -> ApiResult<impl axum::response::IntoResponse> {
    let (limit, used, resets_at) = state.executions.usage(&caller).await?;
    Ok(Json(UsageResponse {
        limit,
        used,
        resets_at,
    }))
}
