//! API error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;

/// API error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Stable code for programmatic handling
    pub code: String,
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Custom API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Graph or schema validation failure
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Optimistic concurrency loss or state conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Daily execution budget exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Database or broker unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Anything else
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code identifier
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Error type name
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::QuotaExceeded(_) => "QuotaExceeded",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::InternalError(_) => "InternalError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse {
            error: self.error_type().to_string(),
            message: self.to_string(),
            code: self.code().to_string(),
        };

        if status.is_server_error() {
            tracing::error!(code = %body.code, "API error: {}", body.message);
        } else {
            tracing::debug!(code = %body.code, "API error: {}", body.message);
        }

        (status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else if err.is_conflict() || err.is_constraint_violation() {
            ApiError::Conflict(err.to_string())
        } else if err.is_unavailable() {
            ApiError::ServiceUnavailable(err.to_string())
        } else {
            ApiError::InternalError(err.to_string())
        }
    }
}

impl From<flowhub_graph::GraphError> for ApiError {
    fn from(err: flowhub_graph::GraphError) -> Self {
        match &err {
            flowhub_graph::GraphError::UnknownVersion { .. } => ApiError::NotFound(err.to_string()),
            _ => ApiError::ValidationError(err.to_string()),
        }
    }
}

impl From<flowhub_engine::EngineError> for ApiError {
    fn from(err: flowhub_engine::EngineError) -> Self {
        match &err {
            flowhub_engine::EngineError::Graph(_) | flowhub_engine::EngineError::Plan(_) => {
                ApiError::ValidationError(err.to_string())
            }
            flowhub_engine::EngineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::InternalError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_maps_to_429() {
        let err = ApiError::QuotaExceeded("limit 2 reached".to_string());
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_conflict_from_database_error() {
        let err: ApiError = DatabaseError::VersionConflict {
            entity: "workflow",
            id: "w".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unknown_version_maps_to_404() {
        let err: ApiError = flowhub_graph::GraphError::UnknownVersion {
            workflow_id: "w".to_string(),
            version: 9,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
