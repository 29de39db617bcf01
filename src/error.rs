//! # Error Handling
//!
//! HTTP error responses in `application/problem+json` form with trace ID
//! propagation. Sync failures are not HTTP errors: they are returned inside
//! the structured run outcomes with a `200 OK`.

use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::complete_sync::CompleteSyncError;
use crate::telemetry;

/// Problem body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Stable machine-readable code, see [`ErrorCode`]
    pub code: Box<str>,
    pub message: Box<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Box<serde_json::Value>>,
    /// Request trace ID, or a `corr-` ID when none is in scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

/// Error codes the API emits. Each code has exactly one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("VALIDATION_FAILED")]
    ValidationFailed,
    #[error("UNAUTHORIZED")]
    Unauthorized,
    #[error("NOT_FOUND")]
    NotFound,
    #[error("SYNC_IN_PROGRESS")]
    SyncInProgress,
    #[error("SERVICE_UNAVAILABLE")]
    ServiceUnavailable,
    #[error("INTERNAL_SERVER_ERROR")]
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::SyncInProgress => StatusCode::CONFLICT,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status(),
            code: code.to_string().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Some(trace_id_or_correlation()),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }
}

fn trace_id_or_correlation() -> Box<str> {
    telemetry::current_trace_id()
        .unwrap_or_else(|| format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]))
        .into_boxed_str()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );
        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!(error = ?error, "Unhandled error in request");
        Self::new(ErrorCode::Internal, "An internal error occurred")
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        match error {
            sea_orm::DbErr::RecordNotFound(record) => {
                Self::new(ErrorCode::NotFound, format!("Record not found: {record}"))
            }
            sea_orm::DbErr::Conn(err) => {
                tracing::error!(error = ?err, "Database connection error");
                Self::new(ErrorCode::ServiceUnavailable, "Database service unavailable")
            }
            other => {
                tracing::error!(error = ?other, "Database error");
                Self::new(ErrorCode::Internal, "Database error occurred")
            }
        }
    }
}

impl From<CompleteSyncError> for ApiError {
    fn from(error: CompleteSyncError) -> Self {
        match error {
            CompleteSyncError::AccountNotFound(id) => not_found("Account", &id.to_string()),
            CompleteSyncError::Storage(err) => err.into(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("Invalid path parameter: {}", rejection.body_text()),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("Invalid query parameter: {}", rejection.body_text()),
        )
    }
}

pub fn unauthorized(message: Option<&str>) -> ApiError {
    ApiError::new(
        ErrorCode::Unauthorized,
        message.unwrap_or("Authentication required"),
    )
}

pub fn not_found(entity: &str, id: &str) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("{entity} '{id}' not found"))
}

/// Validation failure with per-field messages in `details`
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(ErrorCode::ValidationFailed, message).with_details(field_errors)
}

/// Another sync holds the process-wide sync lock
pub fn sync_in_progress() -> ApiError {
    ApiError::new(ErrorCode::SyncInProgress, "A sync run is already in progress")
        .with_details(serde_json::json!({ "retry": "after the current run completes" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_api_error_with_details() {
        let error = ApiError::new(ErrorCode::ValidationFailed, "bad limit")
            .with_details(json!({"limit": "must be positive"}));

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.details, Some(Box::new(json!({"limit": "must be positive"}))));
    }

    #[test]
    fn test_from_anyhow_hides_internal_message() {
        let api_error: ApiError = anyhow::anyhow!("connection refused on 10.0.0.3").into();

        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn test_content_type_header() {
        let response = unauthorized(None).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_trace_id_generation() {
        let error = not_found("Connection", "abc");

        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn test_missing_account_maps_to_404() {
        let id = Uuid::new_v4();
        let error: ApiError = CompleteSyncError::AccountNotFound(id).into();

        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert!(error.message.contains(&id.to_string()));
    }

    #[test]
    fn test_sync_in_progress_is_conflict() {
        let error = sync_in_progress();
        assert_eq!(error.status, StatusCode::CONFLICT);
        assert_eq!(error.code, Box::from("SYNC_IN_PROGRESS"));
    }

    #[test]
    fn test_database_error_mapping() {
        let api_error: ApiError = sea_orm::DbErr::RecordNotFound("snapshot".to_string()).into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert!(api_error.message.contains("snapshot"));
    }
}
