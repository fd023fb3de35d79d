//! # Job API Handlers
//!
//! Read-only access to provisioning-job progress records. Long-running
//! operations are diagnosable from these without process logs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::provisioning_job::JobStep;
use crate::repositories::JobRepository;
use crate::server::AppState;

/// Provisioning-job detail response
#[derive(Debug, Serialize, ToSchema)]
pub struct JobDto {
    pub id: Uuid,
    /// Absent for fleet-wide batch records
    pub tenant_id: Option<Uuid>,
    pub kind: String,
    pub status: String,
    pub steps: Vec<JobStep>,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Get a provisioning job by ID
#[utoipa::path(
    get,
    path = "/admin/jobs/{job_id}",
    security(("admin_secret" = [])),
    params(("job_id" = Uuid, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job detail", body = JobDto),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError),
        (status = 404, description = "Job not found", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobDto>, ApiError> {
    let job = JobRepository::new(&state.db)
        .get_job(job_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "JOB_NOT_FOUND", "Job not found")
                .with_details(serde_json::json!({ "job_id": job_id.to_string() }))
        })?;

    let steps: Vec<JobStep> = serde_json::from_value(job.steps).unwrap_or_default();

    Ok(Json(JobDto {
        id: job.id,
        tenant_id: job.tenant_id,
        kind: job.kind,
        status: job.status,
        steps,
        error: job.error,
        created_at: job.created_at.to_rfc3339(),
        completed_at: job.completed_at.map(|t| t.to_rfc3339()),
    }))
}
