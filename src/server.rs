//! # Server Configuration
//!
//! Application state, router wiring, and the serve loop for the Launchpad
//! control plane. Every `/admin/*` route sits behind the shared-secret
//! guard; `/`, `/healthz`, and the API docs are open.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::admin_auth_middleware;
use crate::catalog::MigrationCatalog;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::domains::DomainAllocator;
use crate::flags::FlagPropagator;
use crate::handlers;
use crate::provider::{DatabaseHost, DomainHost};
use crate::provisioner::TenantProvisioner;
use crate::telemetry::{TraceContext, with_trace_context};
use crate::upgrade::UpgradeEngine;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub catalog: Arc<MigrationCatalog>,
    pub provisioner: Arc<TenantProvisioner>,
    pub engine: Arc<UpgradeEngine>,
    pub propagator: Arc<FlagPropagator>,
    pub allocator: Arc<DomainAllocator>,
    /// Process-wide cancellation, threaded through polls and fleet loops
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the orchestration components around one registry connection, one
    /// catalog snapshot, and the two provider clients.
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        catalog: Arc<MigrationCatalog>,
        host: Arc<dyn DatabaseHost>,
        hosting: Arc<dyn DomainHost>,
        crypto_key: CryptoKey,
        shutdown: CancellationToken,
    ) -> Self {
        let allocator = Arc::new(DomainAllocator::new(
            db.clone(),
            hosting,
            config.apex_domain.clone(),
        ));
        let provisioner = Arc::new(TenantProvisioner::new(
            db.clone(),
            Arc::clone(&config),
            Arc::clone(&catalog),
            Arc::clone(&host),
            Arc::clone(&allocator),
            crypto_key,
        ));
        let engine = Arc::new(UpgradeEngine::new(
            db.clone(),
            Arc::clone(&catalog),
            Arc::clone(&host),
        ));
        let propagator = Arc::new(FlagPropagator::new(db.clone(), host));

        Self {
            config,
            db,
            catalog,
            provisioner,
            engine,
            propagator,
            allocator,
            shutdown,
        }
    }
}

/// Assigns a trace ID to each request and makes it available to error
/// responses through the task-local trace context.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", &Uuid::new_v4().to_string()[..8]);
    let context = TraceContext {
        trace_id: trace_id.clone(),
    };
    request.extensions_mut().insert(context.clone());

    with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/upgrade-status", get(handlers::upgrade::upgrade_status))
        .route("/admin/upgrade", post(handlers::upgrade::upgrade_fleet))
        .route(
            "/admin/upgrade/{tenant_id}",
            get(handlers::upgrade::tenant_upgrade_report)
                .post(handlers::upgrade::upgrade_tenant),
        )
        .route("/admin/tenants", post(handlers::tenants::provision_tenant))
        .route("/admin/tenants/{tenant_id}", get(handlers::tenants::get_tenant))
        .route(
            "/admin/tenants/{tenant_id}/domains",
            post(handlers::domains::attach_domain),
        )
        .route("/admin/jobs/{job_id}", get(handlers::jobs::get_job))
        .route("/admin/flags/propagate", post(handlers::flags::propagate_flags))
        .route("/admin/domains/check/{slug}", get(handlers::domains::check_slug))
        .route(
            "/admin/domains/{hostname}",
            delete(handlers::domains::release_domain),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            admin_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(admin_routes)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server, shutting down gracefully on ctrl-c by cancelling the
/// shared token so in-flight fleet loops stop between tenants.
pub async fn run_server(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let shutdown = state.shutdown.clone();
    let profile = state.config.profile.clone();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::upgrade::upgrade_status,
        crate::handlers::upgrade::upgrade_fleet,
        crate::handlers::upgrade::tenant_upgrade_report,
        crate::handlers::upgrade::upgrade_tenant,
        crate::handlers::tenants::provision_tenant,
        crate::handlers::tenants::get_tenant,
        crate::handlers::jobs::get_job,
        crate::handlers::flags::propagate_flags,
        crate::handlers::domains::check_slug,
        crate::handlers::domains::attach_domain,
        crate::handlers::domains::release_domain,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::upgrade::UpgradeStatusResponse,
            crate::handlers::upgrade::TenantVersionStatus,
            crate::handlers::upgrade::FleetUpgradeResponse,
            crate::handlers::upgrade::TenantUpgradeReport,
            crate::handlers::tenants::ProvisionTenantRequestDto,
            crate::handlers::tenants::TenantDto,
            crate::handlers::jobs::JobDto,
            crate::handlers::flags::PropagateFlagsRequestDto,
            crate::handlers::domains::AttachDomainRequestDto,
            crate::handlers::domains::AttachDomainResponseDto,
            crate::upgrade::TenantUpgradeResult,
            crate::upgrade::UpgradeStatus,
            crate::flags::FleetPropagationReport,
            crate::flags::TenantPropagationResult,
            crate::flags::TenantPropagationError,
            crate::domains::SlugAvailability,
            crate::domains::AllocationOutcome,
            crate::provisioner::ProvisionReport,
            crate::provisioner::DomainStepOutcome,
            crate::models::provisioning_job::JobStep,
        )
    ),
    info(
        title = "Launchpad Control Plane API",
        description = "Tenant provisioning and schema-upgrade orchestrator",
        version = env!("CARGO_PKG_VERSION"),
    ),
    modifiers(&AdminSecretAddon)
)]
pub struct ApiDoc;

struct AdminSecretAddon;

impl Modify for AdminSecretAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_secret",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    crate::auth::ADMIN_SECRET_HEADER,
                ))),
            );
        }
    }
}
