//! # Domain API Handlers
//!
//! Fleet-admin endpoints for slug availability checks and hostname
//! allocation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domains::{AllocationOutcome, SlugAvailability};
use crate::error::ApiError;
use crate::repositories::TenantRepository;
use crate::server::AppState;

/// Request payload for attaching a domain to a tenant
#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachDomainRequestDto {
    /// Slug to allocate under the apex domain
    #[schema(example = "acme")]
    pub slug: String,
    /// Whether this becomes the tenant's primary hostname
    #[serde(default)]
    pub is_primary: bool,
}

/// Response for a domain allocation
#[derive(Debug, Serialize, ToSchema)]
pub struct AttachDomainResponseDto {
    pub hostname: String,
    pub outcome: AllocationOutcome,
}

/// Check slug availability across all sources of truth
#[utoipa::path(
    get,
    path = "/admin/domains/check/{slug}",
    security(("admin_secret" = [])),
    params(("slug" = String, Path, description = "Candidate slug")),
    responses(
        (status = 200, description = "Availability report", body = SlugAvailability),
        (status = 400, description = "Invalid slug format", body = ApiError),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError)
    ),
    tag = "domains"
)]
pub async fn check_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<SlugAvailability>, ApiError> {
    let report = state.allocator.check_availability(&slug).await?;
    Ok(Json(report))
}

/// Allocate a hostname for a tenant
#[utoipa::path(
    post,
    path = "/admin/tenants/{tenant_id}/domains",
    security(("admin_secret" = [])),
    params(("tenant_id" = Uuid, Path, description = "Tenant UUID")),
    request_body = AttachDomainRequestDto,
    responses(
        (status = 200, description = "Hostname allocated or attach skipped", body = AttachDomainResponseDto),
        (status = 400, description = "Invalid slug format", body = ApiError),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError),
        (status = 409, description = "Hostname already allocated", body = ApiError)
    ),
    tag = "domains"
)]
pub async fn attach_domain(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<AttachDomainRequestDto>,
) -> Result<Json<AttachDomainResponseDto>, ApiError> {
    if TenantRepository::new(&state.db)
        .get_tenant(tenant_id)
        .await?
        .is_none()
    {
        return Err(
            ApiError::new(StatusCode::NOT_FOUND, "TENANT_NOT_FOUND", "Tenant not found")
                .with_details(serde_json::json!({ "tenant_id": tenant_id.to_string() })),
        );
    }

    let outcome = state
        .allocator
        .allocate_domain(tenant_id, &request.slug, request.is_primary)
        .await?;

    Ok(Json(AttachDomainResponseDto {
        hostname: state.allocator.hostname_for(&request.slug),
        outcome,
    }))
}

/// Release a hostname
#[utoipa::path(
    delete,
    path = "/admin/domains/{hostname}",
    security(("admin_secret" = [])),
    params(("hostname" = String, Path, description = "Fully-qualified hostname")),
    responses(
        (status = 204, description = "Hostname released"),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError)
    ),
    tag = "domains"
)]
pub async fn release_domain(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.allocator.release_domain(&hostname).await?;
    Ok(StatusCode::NO_CONTENT)
}
