//! # Error Handling
//!
//! This module provides unified error handling for the Launchpad control
//! plane: the `OrchestratorError` taxonomy used by the provisioning and
//! upgrade core, and a problem+json `ApiError` response format with trace ID
//! propagation for the HTTP surface.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Maximum characters of an upstream response body kept in error details.
const BODY_SNIPPET_MAX_CHARS: usize = 200;

/// Error taxonomy for the provisioning/upgrade core.
///
/// Single-tenant operations return typed result objects rather than raising;
/// these errors surface inside those results or abort an operation before
/// any tenant-level work starts.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Required credential/identifier missing. Fails fast, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-success response from a remote management/provisioning/domain API.
    /// Safe for the caller to retry.
    #[error("upstream {service} returned status {status}")]
    Upstream {
        service: String,
        status: u16,
        body_snippet: Option<String>,
    },

    /// Readiness polling exceeded its bound. Distinct from `Upstream` so
    /// operators know the operation may still complete out-of-band.
    #[error("timed out after {seconds}s waiting for {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Slug/domain format or malformed identifier, rejected before any I/O.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Duplicate slug/hostname, or a lost optimistic-lock race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation requires a provisioned database the tenant does not have.
    #[error("tenant {0} is not yet provisioned")]
    NotProvisioned(uuid::Uuid),

    /// Fleet-registry database failure.
    #[error("registry error: {0}")]
    Registry(#[from] sea_orm::DbErr),

    /// Credential cipher failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    /// Remote transport failure before any HTTP status was produced.
    #[error("transport error calling {service}: {message}")]
    Transport { service: String, message: String },

    /// A specific migration file failed to apply. Carries the filename so a
    /// failed provisioning or upgrade is diagnosable from the error alone.
    #[error("migration {filename} failed: {source}")]
    Migration {
        filename: String,
        #[source]
        source: Box<OrchestratorError>,
    },

    /// The registry's flag map was updated but the tenant's runtime store was
    /// not. Distinct so operators can retry just the runtime sync.
    #[error("registry updated for tenant {tenant_id} but runtime sync failed: {source}")]
    RuntimeSyncFailed {
        tenant_id: uuid::Uuid,
        #[source]
        source: Box<OrchestratorError>,
    },

    /// The operation was cancelled before completion. Durable state reflects
    /// the work finished so far.
    #[error("operation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Build an `Upstream` error from a service name, status, and raw body.
    pub fn upstream(service: &str, status: u16, body: Option<String>) -> Self {
        Self::Upstream {
            service: service.to_string(),
            status,
            body_snippet: body.map(|b| truncate_chars(&b, BODY_SNIPPET_MAX_CHARS)),
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let truncated: String = value.chars().take(max).collect();
        format!("{}...", truncated)
    } else {
        value.to_string()
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Extract current trace ID from the active task context (falls back to a
    /// generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Whether a database error is a unique-constraint violation, across the
/// Postgres and SQLite backends the registry runs on.
pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
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

// Error mappers for common sources

impl From<OrchestratorError> for ApiError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
            }
            OrchestratorError::Conflict(message) => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", &message)
            }
            OrchestratorError::NotProvisioned(tenant_id) => Self::new(
                StatusCode::CONFLICT,
                "NOT_PROVISIONED",
                "Tenant has no provisioned database",
            )
            .with_details(json!({ "tenant_id": tenant_id.to_string() })),
            OrchestratorError::Timeout { operation, seconds } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "UPSTREAM_TIMEOUT",
                &format!("Timed out after {}s waiting for {}", seconds, operation),
            ),
            OrchestratorError::Upstream {
                service,
                status,
                body_snippet,
            } => Self::new(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                &format!("Upstream {} returned error status {}", service, status),
            )
            .with_details(json!({
                "service": service,
                "status": status,
                "body_snippet": body_snippet,
            })),
            OrchestratorError::Transport { service, message } => {
                tracing::error!(%service, %message, "Upstream transport failure");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    &format!("Failed to reach upstream {}", service),
                )
            }
            OrchestratorError::Configuration(message) => {
                tracing::error!(%message, "Configuration error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "Required configuration is missing or invalid",
                )
            }
            OrchestratorError::Migration { filename, source } => {
                let base: ApiError = (*source).into();
                Self::new(
                    base.status,
                    "MIGRATION_FAILED",
                    &format!("Migration {} failed", filename),
                )
                .with_details(json!({ "filename": filename }))
            }
            OrchestratorError::RuntimeSyncFailed { tenant_id, source } => Self::new(
                StatusCode::BAD_GATEWAY,
                "RUNTIME_SYNC_FAILED",
                "Registry updated but tenant runtime sync failed",
            )
            .with_details(json!({
                "tenant_id": tenant_id.to_string(),
                "cause": source.to_string(),
            })),
            OrchestratorError::Cancelled => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "CANCELLED",
                "Operation was cancelled before completion",
            ),
            OrchestratorError::Registry(db_err) => db_err.into(),
            OrchestratorError::Crypto(crypto_err) => {
                tracing::error!(error = %crypto_err, "Credential cipher failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Credential handling failed",
                )
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Registry connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Registry database unavailable",
                )
            }
            _ => {
                tracing::error!("Registry error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Registry error occurred",
                )
            }
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
    }

    #[test]
    fn test_upstream_error_maps_to_502() {
        let error: ApiError =
            OrchestratorError::upstream("management", 503, Some("unavailable".to_string())).into();

        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(error.code, Box::from("UPSTREAM_ERROR"));

        let details = error.details.unwrap();
        assert_eq!(details["service"], "management");
        assert_eq!(details["status"], 503);
    }

    #[test]
    fn test_timeout_is_distinct_from_upstream() {
        let timeout: ApiError = OrchestratorError::Timeout {
            operation: "database readiness".to_string(),
            seconds: 120,
        }
        .into();
        let upstream: ApiError = OrchestratorError::upstream("management", 500, None).into();

        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.code, Box::from("UPSTREAM_TIMEOUT"));
        assert_ne!(timeout.code, upstream.code);
    }

    #[test]
    fn test_validation_error_maps_to_400() {
        let error: ApiError =
            OrchestratorError::Validation("slug must be 2-63 characters".to_string()).into();

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert!(error.message.contains("slug"));
    }

    #[test]
    fn test_not_provisioned_carries_tenant_id() {
        let tenant_id = uuid::Uuid::new_v4();
        let error: ApiError = OrchestratorError::NotProvisioned(tenant_id).into();

        assert_eq!(error.status, StatusCode::CONFLICT);
        assert_eq!(error.code, Box::from("NOT_PROVISIONED"));
        let details = error.details.unwrap();
        assert_eq!(details["tenant_id"], tenant_id.to_string());
    }

    #[test]
    fn test_upstream_body_snippet_truncation() {
        let long_body = "x".repeat(500);
        let error = OrchestratorError::upstream("hosting", 500, Some(long_body));

        let OrchestratorError::Upstream { body_snippet, .. } = error else {
            panic!("expected upstream error");
        };
        let snippet = body_snippet.unwrap();
        assert!(snippet.chars().count() <= BODY_SNIPPET_MAX_CHARS + 3);
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn test_validation_error_with_details() {
        let field_errors = json!({
            "slug": "Slug is reserved",
        });

        let error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.details, Some(Box::new(field_errors)));
    }

    #[test]
    fn test_content_type_header() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Test error");

        let response = error.into_response();

        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_database_error_mapping() {
        let db_error = sea_orm::DbErr::RecordNotFound("tenant".to_string());
        let api_error: ApiError = db_error.into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, Box::from("NOT_FOUND"));
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        assert!(error.trace_id.is_some());
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
    }
}
