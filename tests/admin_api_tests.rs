//! End-to-end tests for the fleet-admin API: the full router with auth
//! middleware, driven over an in-memory registry and mock provider hosts.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

use launchpad::catalog::MigrationCatalog;
use launchpad::config::AppConfig;
use launchpad::crypto::CryptoKey;
use launchpad::error::OrchestratorError;
use launchpad::models::tenant::status as tenant_status;
use launchpad::provider::{
    AttachOutcome, DatabaseHost, DomainHost, InstanceKeys, InstanceState, NewInstance,
};
use launchpad::repositories::{CreateTenantRequest, TenantRepository};
use launchpad::server::{AppState, create_app};

const ADMIN_SECRET: &str = "fleet-secret";

/// Management host whose instances are ready immediately and whose SQL
/// executions always succeed. Statements are recorded per reference.
struct InstantHost {
    statements: Mutex<Vec<(String, String)>>,
}

impl InstantHost {
    fn new() -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DatabaseHost for InstantHost {
    async fn create_instance(
        &self,
        name: &str,
        _region: &str,
        _password: &str,
    ) -> Result<NewInstance, OrchestratorError> {
        Ok(NewInstance {
            reference: format!("ref-{}", name),
        })
    }

    async fn instance_state(&self, _reference: &str) -> Result<InstanceState, OrchestratorError> {
        Ok(InstanceState::Ready)
    }

    async fn instance_keys(&self, reference: &str) -> Result<InstanceKeys, OrchestratorError> {
        Ok(InstanceKeys {
            database_url: format!("postgres://{}.db.example.com/postgres", reference),
            service_role_key: "service-role-key".to_string(),
            anon_key: "anon-key".to_string(),
        })
    }

    async fn execute_sql(&self, reference: &str, sql: &str) -> Result<(), OrchestratorError> {
        self.statements
            .lock()
            .unwrap()
            .push((reference.to_string(), sql.to_string()));
        Ok(())
    }
}

/// Domain host with credentials configured and no existing hostnames.
struct OpenDomainHost;

#[async_trait]
impl DomainHost for OpenDomainHost {
    fn is_configured(&self) -> bool {
        true
    }

    async fn domain_exists(&self, _hostname: &str) -> Result<bool, OrchestratorError> {
        Ok(false)
    }

    async fn attach_domain(&self, _hostname: &str) -> Result<AttachOutcome, OrchestratorError> {
        Ok(AttachOutcome::Attached)
    }

    async fn detach_domain(&self, _hostname: &str) -> Result<(), OrchestratorError> {
        Ok(())
    }
}

fn write_catalog(dir: &tempfile::TempDir) -> MigrationCatalog {
    std::fs::write(
        dir.path().join("20250101000000_create_posts.sql"),
        "create table posts (id uuid primary key);",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("20250215000000_add_title.sql"),
        "alter table posts add column title text;",
    )
    .unwrap();
    MigrationCatalog::from_dir(dir.path())
}

async fn test_state(catalog: MigrationCatalog) -> AppState {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let config = Arc::new(AppConfig {
        admin_secrets: vec![ADMIN_SECRET.to_string()],
        apex_domain: "apps.example.com".to_string(),
        crypto_key: Some(vec![7u8; 32]),
        ..Default::default()
    });

    AppState::new(
        config,
        db,
        Arc::new(catalog),
        Arc::new(InstantHost::new()),
        Arc::new(OpenDomainHost),
        CryptoKey::new(vec![7u8; 32]).unwrap(),
        CancellationToken::new(),
    )
}

fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Admin-Secret", ADMIN_SECRET);

    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn admin_routes_require_secret() {
    let state = test_state(MigrationCatalog::default()).await;
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/upgrade-status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn health_and_root_are_open() {
    let state = test_state(MigrationCatalog::default()).await;
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn provision_flow_creates_active_tenant_with_completed_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(write_catalog(&dir)).await;
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/admin/tenants",
            Some(serde_json::json!({
                "slug": "acme",
                "display_name": "Acme Corp",
                "admin_email": "owner@acme.example.com"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let report = response_json(response).await;
    assert_eq!(report["slug"], "acme");
    assert_eq!(report["status"], "active");
    assert_eq!(report["schema_version"], "20250215000000");
    assert_eq!(report["domain"], "allocated");

    let tenant_id = report["tenant_id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(admin_request(
            "GET",
            &format!("/admin/tenants/{}", tenant_id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tenant = response_json(response).await;
    assert_eq!(tenant["provisioned"], true);
    assert_eq!(tenant["status"], "active");

    let job_id = report["job_id"].as_str().unwrap().to_string();
    let response = app
        .oneshot(admin_request("GET", &format!("/admin/jobs/{}", job_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job = response_json(response).await;
    assert_eq!(job["status"], "completed");
    let steps = job["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|step| step["status"] == "completed"));
}

#[tokio::test]
async fn provision_rejects_malformed_admin_email() {
    let state = test_state(MigrationCatalog::default()).await;
    let app = create_app(state);

    let response = app
        .oneshot(admin_request(
            "POST",
            "/admin/tenants",
            Some(serde_json::json!({
                "slug": "acme",
                "display_name": "Acme Corp",
                "admin_email": "not-an-email"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["details"]["admin_email"], "not-an-email");
}

#[tokio::test]
async fn duplicate_slug_returns_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(write_catalog(&dir)).await;
    let app = create_app(state);

    let payload = serde_json::json!({
        "slug": "acme",
        "display_name": "Acme Corp",
        "admin_email": "owner@acme.example.com"
    });

    let response = app
        .clone()
        .oneshot(admin_request("POST", "/admin/tenants", Some(payload.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(admin_request("POST", "/admin/tenants", Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn fleet_upgrade_drains_pending_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(write_catalog(&dir)).await;
    let tenants = TenantRepository::new(&state.db);
    let tenant = tenants
        .create_tenant(CreateTenantRequest {
            slug: "bravo".to_string(),
            display_name: "Bravo".to_string(),
            theme: None,
            template: None,
            owner_account: None,
        })
        .await
        .unwrap();
    tenants.set_database_ref(tenant.id, "ref-bravo").await.unwrap();
    tenants
        .set_status(tenant.id, tenant_status::ACTIVE)
        .await
        .unwrap();

    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/admin/upgrade-status", None))
        .await
        .unwrap();
    let status = response_json(response).await;
    assert_eq!(status["latest_version"], "20250215000000");
    assert_eq!(status["tenants"][0]["pending_migrations"], 2);

    let response = app
        .clone()
        .oneshot(admin_request("POST", "/admin/upgrade", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = response_json(response).await;
    assert_eq!(report["upgraded"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["details"][0]["migrations_run"], 2);

    let job_id = report["job_id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(admin_request("GET", &format!("/admin/jobs/{}", job_id), None))
        .await
        .unwrap();
    let job = response_json(response).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["tenant_id"], serde_json::Value::Null);

    let response = app
        .oneshot(admin_request("GET", "/admin/upgrade-status", None))
        .await
        .unwrap();
    let status = response_json(response).await;
    assert_eq!(status["tenants"][0]["pending_migrations"], 0);
    assert_eq!(status["tenants"][0]["schema_version"], "20250215000000");
}

#[tokio::test]
async fn slug_check_reflects_provisioned_tenants() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(write_catalog(&dir)).await;
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(admin_request("GET", "/admin/domains/check/acme", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = response_json(response).await;
    assert_eq!(report["available"], true);
    assert_eq!(report["hostname"], "acme.apps.example.com");

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/admin/tenants",
            Some(serde_json::json!({
                "slug": "acme",
                "display_name": "Acme Corp",
                "admin_email": "owner@acme.example.com"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(admin_request("GET", "/admin/domains/check/acme", None))
        .await
        .unwrap();
    let report = response_json(response).await;
    assert_eq!(report["available"], false);
    assert!(
        report["taken_in"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("registry_tenants"))
    );
}

#[tokio::test]
async fn flag_propagation_updates_fleet() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(write_catalog(&dir)).await;
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/admin/tenants",
            Some(serde_json::json!({
                "slug": "acme",
                "display_name": "Acme Corp",
                "admin_email": "owner@acme.example.com"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/admin/flags/propagate",
            Some(serde_json::json!({ "defaults": { "dark_mode": true } })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = response_json(response).await;
    assert_eq!(report["tenants_updated"], 1);
    assert_eq!(report["flags_added"], 1);
    assert_eq!(report["details"][0]["added"], serde_json::json!(["dark_mode"]));

    let tenant_id = report["details"][0]["tenant_id"].as_str().unwrap().to_string();
    let response = app
        .oneshot(admin_request(
            "GET",
            &format!("/admin/tenants/{}", tenant_id),
            None,
        ))
        .await
        .unwrap();
    let tenant = response_json(response).await;
    assert_eq!(tenant["feature_flags"]["dark_mode"], true);
}

#[tokio::test]
async fn unknown_tenant_paths_return_404() {
    let state = test_state(MigrationCatalog::default()).await;
    let app = create_app(state);
    let missing = Uuid::new_v4();

    for (method, uri) in [
        ("GET", format!("/admin/tenants/{}", missing)),
        ("GET", format!("/admin/upgrade/{}", missing)),
        ("POST", format!("/admin/upgrade/{}", missing)),
    ] {
        let response = app
            .clone()
            .oneshot(admin_request(method, &uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        let body = response_json(response).await;
        assert_eq!(body["code"], "TENANT_NOT_FOUND");
    }

    let response = app
        .oneshot(admin_request(
            "POST",
            &format!("/admin/tenants/{}/domains", missing),
            Some(serde_json::json!({ "slug": "orphan" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
