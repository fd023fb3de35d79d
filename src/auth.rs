//! # Admin Access Guard
//!
//! Shared-secret authentication for the fleet-admin API. Every `/admin/*`
//! route is gated on an `X-Admin-Secret` header compared in constant time
//! against the configured secrets.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id};
use crate::server::AppState;
use crate::telemetry::TraceContext;

/// Header carrying the fleet-admin shared secret.
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Marker type for authenticated fleet-admin requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminAuth;

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates the admin shared-secret header
pub async fn admin_auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let secret = extract_admin_secret(request.headers(), trace_id)?;
    validate_secret(&config, secret)?;

    tracing::debug!("Authenticated fleet-admin request");

    let mut request = request;
    request.extensions_mut().insert(AdminAuth);

    Ok(next.run(request).await)
}

fn extract_admin_secret<'a>(
    headers: &'a HeaderMap,
    trace_id: Option<String>,
) -> Result<&'a str, ApiError> {
    let trace_id_clone = trace_id.clone();

    headers
        .get(ADMIN_SECRET_HEADER)
        .ok_or_else(|| {
            if let Some(trace_id_val) = trace_id_clone {
                unauthorized_with_trace_id(Some("Missing X-Admin-Secret header"), trace_id_val)
            } else {
                unauthorized(Some("Missing X-Admin-Secret header"))
            }
        })
        .and_then(|value| {
            value.to_str().map_err(|_| {
                if let Some(trace_id_val) = trace_id {
                    unauthorized_with_trace_id(Some("Invalid X-Admin-Secret header"), trace_id_val)
                } else {
                    unauthorized(Some("Invalid X-Admin-Secret header"))
                }
            })
        })
}

fn validate_secret(config: &AppConfig, candidate: &str) -> Result<(), ApiError> {
    let is_valid = config.admin_secrets.iter().any(|configured| {
        ConstantTimeEq::ct_eq(candidate.as_bytes(), configured.as_bytes()).into()
    });

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid admin secret")))
    }
}

impl<S> FromRequestParts<S> for AdminAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Fleet-admin authentication required")))
    }
}
