//! # Tenant API Handlers
//!
//! Fleet-admin endpoints for provisioning and inspecting tenants.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, validation_error};
use crate::provisioner::{ProvisionReport, ProvisionRequest};
use crate::repositories::TenantRepository;
use crate::server::AppState;

/// Request payload for provisioning a new tenant
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProvisionTenantRequestDto {
    /// URL-safe slug, 2-63 lowercase alphanumeric characters with internal
    /// hyphens
    #[schema(example = "acme")]
    pub slug: String,
    /// Display name for the tenant
    #[schema(example = "Acme Corp")]
    pub display_name: String,
    pub theme: Option<String>,
    pub template: Option<String>,
    pub owner_account: Option<Uuid>,
    /// Email of the first administrative user seeded into the tenant site
    #[schema(example = "owner@acme.example.com")]
    pub admin_email: String,
}

/// Tenant detail response
#[derive(Debug, Serialize, ToSchema)]
pub struct TenantDto {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub status: String,
    pub schema_version: Option<String>,
    /// Whether an isolated database has been provisioned and recorded
    pub provisioned: bool,
    pub feature_flags: serde_json::Value,
    pub theme: String,
    pub template: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Provision a new tenant end to end
#[utoipa::path(
    post,
    path = "/admin/tenants",
    security(("admin_secret" = [])),
    request_body = ProvisionTenantRequestDto,
    responses(
        (status = 201, description = "Tenant provisioned", body = ProvisionReport),
        (status = 400, description = "Invalid slug or payload", body = ApiError),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError),
        (status = 409, description = "Slug unavailable", body = ApiError),
        (status = 502, description = "Management provider error", body = ApiError),
        (status = 504, description = "Database readiness timed out", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn provision_tenant(
    State(state): State<AppState>,
    Json(request): Json<ProvisionTenantRequestDto>,
) -> Result<(StatusCode, Json<ProvisionReport>), ApiError> {
    if request.admin_email.trim().is_empty() || !request.admin_email.contains('@') {
        return Err(validation_error(
            "admin_email must be a valid email address",
            serde_json::json!({ "admin_email": request.admin_email }),
        ));
    }

    let report = state
        .provisioner
        .provision_tenant(
            ProvisionRequest {
                slug: request.slug,
                display_name: request.display_name,
                theme: request.theme,
                template: request.template,
                owner_account: request.owner_account,
                admin_email: request.admin_email,
            },
            &state.shutdown,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(report)))
}

/// Get a tenant by ID
#[utoipa::path(
    get,
    path = "/admin/tenants/{tenant_id}",
    security(("admin_secret" = [])),
    params(("tenant_id" = Uuid, Path, description = "Tenant UUID")),
    responses(
        (status = 200, description = "Tenant detail", body = TenantDto),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<TenantDto>, ApiError> {
    let tenant = TenantRepository::new(&state.db)
        .get_tenant(tenant_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "TENANT_NOT_FOUND", "Tenant not found")
                .with_details(serde_json::json!({ "tenant_id": tenant_id.to_string() }))
        })?;

    Ok(Json(TenantDto {
        id: tenant.id,
        slug: tenant.slug,
        display_name: tenant.display_name,
        status: tenant.status,
        schema_version: tenant.schema_version,
        provisioned: tenant.database_ref.is_some(),
        feature_flags: tenant.feature_flags,
        theme: tenant.theme,
        template: tenant.template,
        created_at: tenant.created_at.to_rfc3339(),
        updated_at: tenant.updated_at.to_rfc3339(),
    }))
}
