use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use audit_engine::export::{ExportFormat, ExportJob, ExportStatus};
use audit_engine::AuditLogFilter;

use crate::{error::ApiError, middleware::auth_context::AuthContext, server::AppState};

/// Export submission body: the requested format plus the same filter shape
/// the search endpoint accepts.
#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
    #[serde(default)]
    pub filter: AuditLogFilter,
}

/// Response for an accepted export request
#[derive(Debug, Serialize)]
pub struct ExportAccepted {
    pub export_id: Uuid,
    pub status: ExportStatus,
}

/// Status snapshot returned to pollers
#[derive(Debug, Serialize)]
pub struct ExportStatusResponse {
    pub export_id: Uuid,
    pub status: ExportStatus,
    pub format: ExportFormat,
    pub progress_percentage: f64,
    pub total_records: Option<u64>,
    pub processed_records: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub size_bytes: Option<u64>,
    pub download_expires_at: Option<DateTime<Utc>>,
    pub download_count: u32,
    pub error: Option<String>,
}

impl From<ExportJob> for ExportStatusResponse {
    fn from(job: ExportJob) -> Self {
        Self {
            export_id: job.id,
            status: job.status,
            format: job.format,
            progress_percentage: job.progress_percentage(),
            total_records: job.total_records,
            processed_records: job.processed_records,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            size_bytes: job.artifact.as_ref().map(|a| a.size_bytes),
            download_expires_at: job.artifact.as_ref().map(|a| a.expires_at),
            download_count: job.download_count,
            error: job.error,
        }
    }
}

/// POST /api/audit/export
pub async fn request_export(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<ExportRequest>,
) -> Result<(StatusCode, Json<ExportAccepted>), ApiError> {
    let export_id = state
        .exports
        .submit(&auth.user_context(), &body.filter, body.format)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ExportAccepted {
            export_id,
            status: ExportStatus::Pending,
        }),
    ))
}

/// GET /api/audit/export
pub async fn list_exports(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<ExportStatusResponse>>, ApiError> {
    let jobs = state.exports.list_jobs(&auth.user_context()).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// GET /api/audit/export/:id/status
pub async fn get_export_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ExportStatusResponse>, ApiError> {
    let job = state.exports.get_status(&auth.user_context(), id).await?;
    Ok(Json(job.into()))
}

/// GET /api/audit/export/:id/download
pub async fn download_export(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let download = state
        .exports
        .fetch_artifact(&auth.user_context(), id)
        .await?;

    let headers = [
        (header::CONTENT_TYPE, download.mime_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.filename),
        ),
    ];
    Ok((headers, download.bytes).into_response())
}
