//! # API Handlers
//!
//! HTTP endpoint handlers for the Launchpad fleet-admin API.

use axum::extract::State;
use axum::response::Json;

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod domains;
pub mod flags;
pub mod jobs;
pub mod tenants;
pub mod upgrade;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness/readiness probe backed by a registry round trip
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy"),
        (status = 503, description = "Registry unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    crate::db::health_check(&state.db).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
