//! # Upgrade API Handlers
//!
//! Fleet-admin endpoints for inspecting and driving schema upgrades.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::provisioning_job::kind as job_kind;
use crate::repositories::{JobRepository, TenantRepository};
use crate::server::AppState;
use crate::upgrade::{TenantUpgradeResult, UpgradeStatus};

/// Per-tenant line in the fleet upgrade-status report.
#[derive(Debug, Serialize, ToSchema)]
pub struct TenantVersionStatus {
    pub id: Uuid,
    pub slug: String,
    pub schema_version: Option<String>,
    /// Count of catalog entries newer than the tenant's recorded version
    pub pending_migrations: usize,
    /// Tenant lifecycle status
    pub status: String,
}

/// Fleet-wide schema-version report.
#[derive(Debug, Serialize, ToSchema)]
pub struct UpgradeStatusResponse {
    /// Newest version in the deployed catalog
    pub latest_version: Option<String>,
    /// Total entries in the deployed catalog
    pub total_migrations: usize,
    pub tenants: Vec<TenantVersionStatus>,
}

/// Response for a fleet upgrade run.
#[derive(Debug, Serialize, ToSchema)]
pub struct FleetUpgradeResponse {
    /// Batch job recording this run
    pub job_id: Uuid,
    pub latest_version: Option<String>,
    pub upgraded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub details: Vec<TenantUpgradeResult>,
}

/// Single-tenant pending-migration report.
#[derive(Debug, Serialize, ToSchema)]
pub struct TenantUpgradeReport {
    pub id: Uuid,
    pub slug: String,
    pub schema_version: Option<String>,
    pub status: String,
    /// Filenames of catalog entries that would run on upgrade, in order
    pub pending: Vec<String>,
}

/// Fleet-wide schema-version status
#[utoipa::path(
    get,
    path = "/admin/upgrade-status",
    security(("admin_secret" = [])),
    responses(
        (status = 200, description = "Fleet schema-version report", body = UpgradeStatusResponse),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError)
    ),
    tag = "upgrade"
)]
pub async fn upgrade_status(
    State(state): State<AppState>,
) -> Result<Json<UpgradeStatusResponse>, ApiError> {
    let tenants = TenantRepository::new(&state.db).list_tenants().await?;

    let report = UpgradeStatusResponse {
        latest_version: state.catalog.latest_version().map(str::to_string),
        total_migrations: state.catalog.len(),
        tenants: tenants
            .into_iter()
            .map(|tenant| TenantVersionStatus {
                pending_migrations: state
                    .catalog
                    .migrations_since(tenant.schema_version.as_deref())
                    .len(),
                id: tenant.id,
                slug: tenant.slug,
                schema_version: tenant.schema_version,
                status: tenant.status,
            })
            .collect(),
    };

    Ok(Json(report))
}

/// Upgrade the whole fleet, strictly sequentially
#[utoipa::path(
    post,
    path = "/admin/upgrade",
    security(("admin_secret" = [])),
    responses(
        (status = 200, description = "Fleet upgrade finished", body = FleetUpgradeResponse),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError)
    ),
    tag = "upgrade"
)]
pub async fn upgrade_fleet(
    State(state): State<AppState>,
) -> Result<Json<FleetUpgradeResponse>, ApiError> {
    let jobs = JobRepository::new(&state.db);
    let job = jobs.create_job(None, job_kind::UPGRADE, &["upgrade_fleet"]).await?;
    jobs.start_step(job.id, "upgrade_fleet").await?;

    let report = state.engine.upgrade_fleet(&state.shutdown, None).await?;

    if report.failed > 0 {
        jobs.fail_step(
            job.id,
            "upgrade_fleet",
            &format!("{} tenant(s) failed", report.failed),
        )
        .await?;
        jobs.fail_job(job.id, &format!("{} tenant(s) failed", report.failed))
            .await?;
    } else {
        jobs.complete_step(job.id, "upgrade_fleet").await?;
        jobs.complete_job(job.id).await?;
    }

    Ok(Json(FleetUpgradeResponse {
        job_id: job.id,
        latest_version: state.catalog.latest_version().map(str::to_string),
        upgraded: report.upgraded,
        skipped: report.skipped,
        failed: report.failed,
        details: report.details,
    }))
}

/// Pending-migration report for one tenant
#[utoipa::path(
    get,
    path = "/admin/upgrade/{tenant_id}",
    security(("admin_secret" = [])),
    params(("tenant_id" = Uuid, Path, description = "Tenant UUID")),
    responses(
        (status = 200, description = "Single-tenant pending report", body = TenantUpgradeReport),
        (status = 400, description = "Malformed tenant identifier", body = ApiError),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "upgrade"
)]
pub async fn tenant_upgrade_report(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantUpgradeReport>, ApiError> {
    let tenant = TenantRepository::new(&state.db)
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| tenant_not_found(tenant_id))?;

    let pending = state
        .catalog
        .migrations_since(tenant.schema_version.as_deref())
        .iter()
        .map(|file| file.filename.clone())
        .collect();

    Ok(Json(TenantUpgradeReport {
        id: tenant.id,
        slug: tenant.slug,
        schema_version: tenant.schema_version,
        status: tenant.status,
        pending,
    }))
}

/// Upgrade one tenant
#[utoipa::path(
    post,
    path = "/admin/upgrade/{tenant_id}",
    security(("admin_secret" = [])),
    params(("tenant_id" = Uuid, Path, description = "Tenant UUID")),
    responses(
        (status = 200, description = "Upgrade attempt finished", body = TenantUpgradeResult),
        (status = 400, description = "Malformed tenant identifier", body = ApiError),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "upgrade"
)]
pub async fn upgrade_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantUpgradeResult>, ApiError> {
    if TenantRepository::new(&state.db)
        .get_tenant(tenant_id)
        .await?
        .is_none()
    {
        return Err(tenant_not_found(tenant_id));
    }

    let result = state.engine.upgrade_tenant(tenant_id, &state.shutdown).await?;

    if result.status == UpgradeStatus::Failed {
        tracing::warn!(
            %tenant_id,
            error = result.error.as_deref().unwrap_or("unknown"),
            "Single-tenant upgrade reported failure"
        );
    }

    Ok(Json(result))
}

fn tenant_not_found(tenant_id: Uuid) -> ApiError {
    ApiError::new(
        axum::http::StatusCode::NOT_FOUND,
        "TENANT_NOT_FOUND",
        "Tenant not found",
    )
    .with_details(serde_json::json!({ "tenant_id": tenant_id.to_string() }))
}
