//! # Flag API Handlers
//!
//! Fleet-admin endpoint for propagating new default feature flags.

use std::collections::BTreeMap;

use axum::{extract::State, response::Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::flags::FleetPropagationReport;
use crate::server::AppState;

/// Request payload for flag propagation
#[derive(Debug, Deserialize, ToSchema)]
pub struct PropagateFlagsRequestDto {
    /// New default flags; keys must match `[a-z0-9_]{1,64}`
    #[schema(example = json!({ "dark_mode": true }))]
    pub defaults: BTreeMap<String, bool>,
    /// Restrict propagation to one tenant; absent means the whole fleet
    pub tenant_id: Option<Uuid>,
}

/// Propagate default flags additively
#[utoipa::path(
    post,
    path = "/admin/flags/propagate",
    security(("admin_secret" = [])),
    request_body = PropagateFlagsRequestDto,
    responses(
        (status = 200, description = "Propagation pass finished", body = FleetPropagationReport),
        (status = 400, description = "Invalid flag keys", body = ApiError),
        (status = 401, description = "Missing or invalid admin secret", body = ApiError),
        (status = 502, description = "Registry updated but runtime sync failed", body = ApiError)
    ),
    tag = "flags"
)]
pub async fn propagate_flags(
    State(state): State<AppState>,
    Json(request): Json<PropagateFlagsRequestDto>,
) -> Result<Json<FleetPropagationReport>, ApiError> {
    let report = match request.tenant_id {
        Some(tenant_id) => {
            let result = state
                .propagator
                .propagate_to_tenant(tenant_id, &request.defaults)
                .await?;
            FleetPropagationReport {
                tenants_updated: usize::from(!result.added.is_empty()),
                flags_added: result.added.len(),
                errors: Vec::new(),
                details: vec![result],
            }
        }
        None => {
            state
                .propagator
                .propagate_to_fleet(&request.defaults)
                .await?
        }
    };

    Ok(Json(report))
}
