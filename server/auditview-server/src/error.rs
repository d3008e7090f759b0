use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use audit_engine::AuditError;

/// Standard API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Error type/code
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Timestamp when error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Main API error enum
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error(transparent)]
    Engine(#[from] AuditError),
}

impl ApiError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            Self::Engine(err) => match err {
                AuditError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "invalid_filter"),
                AuditError::InvalidCursor => (StatusCode::BAD_REQUEST, "invalid_cursor"),
                AuditError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
                AuditError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                AuditError::NotReady => (StatusCode::CONFLICT, "export_not_ready"),
                AuditError::ArtifactExpired => (StatusCode::GONE, "export_expired"),
                AuditError::ExportTooLarge => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "export_too_large")
                }
                AuditError::PermissionResolverUnavailable(_)
                | AuditError::StoreUnavailable(_)
                | AuditError::SinkError(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "dependency_unavailable")
                }
                AuditError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let error_id = Uuid::new_v4().to_string();

        if status.is_server_error() {
            error!(error_id = %error_id, error = %self, "request failed");
        }

        let body = ApiErrorResponse {
            error_id,
            error_type: error_type.to_string(),
            message: self.to_string(),
            timestamp: chrono::Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}
