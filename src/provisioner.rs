//! # Database Provisioner
//!
//! First-time creation of a tenant's isolated database: create the instance
//! at the management provider, poll until it is ready within a hard
//! deadline, apply the full migration catalog, seed initial configuration,
//! and store the instance credentials encrypted in the registry. Every run
//! is backed by a provisioning job whose step list shows exactly how far it
//! got.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalog::MigrationCatalog;
use crate::config::AppConfig;
use crate::crypto::{self, CryptoKey};
use crate::domains::{AllocationOutcome, DomainAllocator, validate_slug_format};
use crate::error::OrchestratorError;
use crate::models::provisioning_job::kind as job_kind;
use crate::models::tenant::{Model as TenantModel, status};
use crate::models::tenant_credential::kind as credential_kind;
use crate::provider::{DatabaseHost, InstanceKeys, InstanceState};
use crate::repositories::{CredentialRepository, JobRepository, TenantRepository};

const PASSWORD_LEN: usize = 32;

mod step {
    pub const CREATE_DATABASE: &str = "create_database";
    pub const APPLY_MIGRATIONS: &str = "apply_migrations";
    pub const SEED_CONFIG: &str = "seed_config";
    pub const STORE_CREDENTIALS: &str = "store_credentials";
    pub const ALLOCATE_DOMAIN: &str = "allocate_domain";
}

/// Request data for provisioning a new tenant.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub slug: String,
    pub display_name: String,
    pub theme: Option<String>,
    pub template: Option<String>,
    pub owner_account: Option<Uuid>,
    pub admin_email: String,
}

/// A ready, reachable database instance and its access credentials.
#[derive(Debug)]
pub struct ProvisionedDatabase {
    pub reference: String,
    pub keys: InstanceKeys,
}

/// Outcome of a full provisioning run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisionReport {
    pub tenant_id: Uuid,
    pub slug: String,
    pub job_id: Uuid,
    pub status: String,
    pub schema_version: Option<String>,
    pub domain: DomainStepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DomainStepOutcome {
    Allocated,
    SkippedNotConfigured,
}

/// Orchestrates first-time tenant provisioning end to end.
pub struct TenantProvisioner {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    catalog: Arc<MigrationCatalog>,
    host: Arc<dyn DatabaseHost>,
    domains: Arc<DomainAllocator>,
    crypto_key: CryptoKey,
}

impl TenantProvisioner {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<AppConfig>,
        catalog: Arc<MigrationCatalog>,
        host: Arc<dyn DatabaseHost>,
        domains: Arc<DomainAllocator>,
        crypto_key: CryptoKey,
    ) -> Self {
        Self {
            db,
            config,
            catalog,
            host,
            domains,
            crypto_key,
        }
    }

    /// Create an isolated database for the slug and wait for it to become
    /// reachable. The caller persists `database_ref` only after this returns
    /// success, so no tenant row ever points at an unreachable instance.
    pub async fn provision_database(
        &self,
        slug: &str,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedDatabase, OrchestratorError> {
        let password = generate_password();
        let name = format!("tenant-{}", slug);

        let instance = self
            .host
            .create_instance(&name, &self.config.default_region, &password)
            .await?;

        info!(%slug, reference = %instance.reference, "Database instance created; polling readiness");

        self.await_ready(&instance.reference, cancel).await?;

        let keys = self.host.instance_keys(&instance.reference).await?;
        Ok(ProvisionedDatabase {
            reference: instance.reference,
            keys,
        })
    }

    /// Poll the instance on a fixed interval until it reports a terminal
    /// state or the overall deadline passes. Exceeding the deadline is a
    /// timeout, reported distinctly from a provider-declared failure.
    async fn await_ready(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestratorError> {
        let interval = Duration::from_secs(self.config.provisioner.poll_interval_seconds);
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.provisioner.timeout_seconds);

        loop {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            match self.host.instance_state(reference).await? {
                InstanceState::Ready => return Ok(()),
                InstanceState::Failed(reason) => {
                    return Err(OrchestratorError::upstream(
                        "management",
                        502,
                        Some(format!("instance {} failed: {}", reference, reason)),
                    ));
                }
                InstanceState::Provisioning => {}
            }

            if tokio::time::Instant::now() + interval > deadline {
                return Err(OrchestratorError::Timeout {
                    operation: format!("database {} readiness", reference),
                    seconds: self.config.provisioner.timeout_seconds,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Enable required extensions, then apply every catalog entry in order.
    /// The first failure aborts with an error naming the file.
    pub async fn apply_catalog_to_new_database(
        &self,
        reference: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        self.host
            .execute_sql(
                reference,
                "create extension if not exists \"uuid-ossp\"; create extension if not exists pgcrypto;",
            )
            .await?;

        if self.catalog.is_empty() {
            warn!(%reference, "Migration catalog is empty; database seeded with no schema");
            return Ok(None);
        }

        for migration in self.catalog.migrations() {
            let sql = migration.read_sql().await.map_err(|err| {
                OrchestratorError::Migration {
                    filename: migration.filename.clone(),
                    source: Box::new(OrchestratorError::Configuration(format!(
                        "unreadable migration file: {}",
                        err
                    ))),
                }
            })?;

            self.host.execute_sql(reference, &sql).await.map_err(|err| {
                OrchestratorError::Migration {
                    filename: migration.filename.clone(),
                    source: Box::new(err),
                }
            })?;
        }

        Ok(self.catalog.latest_version().map(str::to_string))
    }

    /// Upsert initial branding/theme rows and the first admin user record.
    /// Conflict-tolerant so a retried provisioning pass does not duplicate.
    pub async fn seed_initial_config(
        &self,
        reference: &str,
        request: &ProvisionRequest,
    ) -> Result<(), OrchestratorError> {
        let settings = [
            ("site_name", request.display_name.as_str()),
            ("theme", request.theme.as_deref().unwrap_or("default")),
            ("template", request.template.as_deref().unwrap_or("standard")),
        ];

        for (key, value) in settings {
            let sql = format!(
                "insert into site_settings (key, value) values ('{}', '{}') on conflict (key) do nothing",
                key,
                sql_escape(value)
            );
            self.host.execute_sql(reference, &sql).await?;
        }

        let admin_sql = format!(
            "insert into site_users (email, role) values ('{}', 'admin') on conflict (email) do nothing",
            sql_escape(&request.admin_email)
        );
        self.host.execute_sql(reference, &admin_sql).await?;

        Ok(())
    }

    /// Full provisioning flow: tenant row, database, schema, seed data,
    /// encrypted credentials, hostname. Progress is persisted step by step
    /// on a provisioning job so failures are diagnosable from the registry.
    pub async fn provision_tenant(
        &self,
        request: ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<ProvisionReport, OrchestratorError> {
        validate_slug_format(&request.slug)?;

        let availability = self.domains.check_availability(&request.slug).await?;
        if !availability.available {
            return Err(OrchestratorError::Conflict(format!(
                "slug '{}' is unavailable (taken in: {})",
                request.slug,
                availability.taken_in.join(", ")
            )));
        }

        let tenants = TenantRepository::new(&self.db);
        let tenant = tenants
            .create_tenant(crate::repositories::CreateTenantRequest {
                slug: request.slug.clone(),
                display_name: request.display_name.clone(),
                theme: request.theme.clone(),
                template: request.template.clone(),
                owner_account: request.owner_account,
            })
            .await?;

        let jobs = JobRepository::new(&self.db);
        let job = jobs
            .create_job(
                Some(tenant.id),
                job_kind::PROVISION,
                &[
                    step::CREATE_DATABASE,
                    step::APPLY_MIGRATIONS,
                    step::SEED_CONFIG,
                    step::STORE_CREDENTIALS,
                    step::ALLOCATE_DOMAIN,
                ],
            )
            .await?;

        match self
            .run_provisioning_steps(&tenant, &request, job.id, cancel)
            .await
        {
            Ok(report) => {
                jobs.complete_job(job.id).await?;
                info!(
                    tenant_id = %tenant.id,
                    slug = %tenant.slug,
                    job_id = %job.id,
                    "Tenant provisioned"
                );
                Ok(report)
            }
            Err(err) => {
                jobs.fail_job(job.id, &err.to_string()).await?;
                warn!(
                    tenant_id = %tenant.id,
                    slug = %tenant.slug,
                    job_id = %job.id,
                    error = %err,
                    "Tenant provisioning failed"
                );
                Err(err)
            }
        }
    }

    async fn run_provisioning_steps(
        &self,
        tenant: &TenantModel,
        request: &ProvisionRequest,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ProvisionReport, OrchestratorError> {
        let tenants = TenantRepository::new(&self.db);
        let jobs = JobRepository::new(&self.db);

        jobs.start_step(job_id, step::CREATE_DATABASE).await?;
        let database = match self.provision_database(&tenant.slug, cancel).await {
            Ok(database) => database,
            Err(err) => {
                jobs.fail_step(job_id, step::CREATE_DATABASE, &err.to_string())
                    .await?;
                return Err(err);
            }
        };
        // The instance is reachable; only now does the tenant row learn its
        // database_ref.
        tenants.set_database_ref(tenant.id, &database.reference).await?;
        jobs.complete_step(job_id, step::CREATE_DATABASE).await?;

        jobs.start_step(job_id, step::APPLY_MIGRATIONS).await?;
        let schema_version = match self
            .apply_catalog_to_new_database(&database.reference)
            .await
        {
            Ok(version) => version,
            Err(err) => {
                jobs.fail_step(job_id, step::APPLY_MIGRATIONS, &err.to_string())
                    .await?;
                return Err(err);
            }
        };
        if let Some(ref version) = schema_version {
            tenants
                .commit_schema_version(tenant.id, tenant.lock_version, version)
                .await?;
        }
        jobs.complete_step(job_id, step::APPLY_MIGRATIONS).await?;

        jobs.start_step(job_id, step::SEED_CONFIG).await?;
        if let Err(err) = self.seed_initial_config(&database.reference, request).await {
            jobs.fail_step(job_id, step::SEED_CONFIG, &err.to_string())
                .await?;
            return Err(err);
        }
        jobs.complete_step(job_id, step::SEED_CONFIG).await?;

        jobs.start_step(job_id, step::STORE_CREDENTIALS).await?;
        if let Err(err) = self.store_credentials(tenant.id, &database).await {
            jobs.fail_step(job_id, step::STORE_CREDENTIALS, &err.to_string())
                .await?;
            return Err(err);
        }
        jobs.complete_step(job_id, step::STORE_CREDENTIALS).await?;

        jobs.start_step(job_id, step::ALLOCATE_DOMAIN).await?;
        let domain = match self
            .domains
            .allocate_domain(tenant.id, &tenant.slug, true)
            .await
        {
            Ok(AllocationOutcome::SkippedNotConfigured) => {
                jobs.skip_step(
                    job_id,
                    step::ALLOCATE_DOMAIN,
                    "hosting provider not configured",
                )
                .await?;
                DomainStepOutcome::SkippedNotConfigured
            }
            Ok(_) => {
                jobs.complete_step(job_id, step::ALLOCATE_DOMAIN).await?;
                DomainStepOutcome::Allocated
            }
            Err(err) => {
                jobs.fail_step(job_id, step::ALLOCATE_DOMAIN, &err.to_string())
                    .await?;
                return Err(err);
            }
        };

        tenants.set_status(tenant.id, status::ACTIVE).await?;

        Ok(ProvisionReport {
            tenant_id: tenant.id,
            slug: tenant.slug.clone(),
            job_id,
            status: status::ACTIVE.to_string(),
            schema_version,
            domain,
        })
    }

    async fn store_credentials(
        &self,
        tenant_id: Uuid,
        database: &ProvisionedDatabase,
    ) -> Result<(), OrchestratorError> {
        let credentials = CredentialRepository::new(&self.db);
        let pairs = [
            (credential_kind::DATABASE_URL, &database.keys.database_url),
            (
                credential_kind::SERVICE_ROLE_KEY,
                &database.keys.service_role_key,
            ),
            (credential_kind::ANON_KEY, &database.keys.anon_key),
        ];

        for (kind, plaintext) in pairs {
            let ciphertext = crypto::encrypt_credential(&self.crypto_key, tenant_id, kind, plaintext)?;
            credentials.upsert_credential(tenant_id, kind, ciphertext).await?;
        }

        Ok(())
    }
}

/// Strong random password for the new database instance.
fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Minimal literal escaping for seed statements; values are operator-supplied
/// (display name, admin email), never tenant-end-user input.
fn sql_escape(value: &str) -> String {
    value.replace('\'', "''")
}
