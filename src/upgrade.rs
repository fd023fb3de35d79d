//! # Schema Upgrade Engine
//!
//! Computes and applies pending migrations for one tenant or the whole
//! fleet. The crash-recovery contract lives here: after each successfully
//! executed migration the tenant's `schema_version` is durably committed
//! before the next one starts, so a crash or timeout mid-batch leaves the
//! registry reflecting exactly the migrations that ran. A retry recomputes
//! the pending set from that version and applies only the remainder.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalog::MigrationCatalog;
use crate::error::OrchestratorError;
use crate::models::tenant::{Model as TenantModel, status};
use crate::provider::DatabaseHost;
use crate::repositories::TenantRepository;

/// Terminal state of one tenant's upgrade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    /// All pending migrations applied
    Upgraded,
    /// Zero pending migrations; nothing was written
    Skipped,
    /// A migration failed or the tenant was not upgradeable
    Failed,
}

/// Result of `upgrade_tenant` for one tenant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TenantUpgradeResult {
    pub tenant_id: Uuid,
    pub slug: String,
    pub status: UpgradeStatus,
    /// Schema version before the attempt
    pub previous_version: Option<String>,
    /// Last successfully committed version after the attempt
    pub new_version: Option<String>,
    /// Count of migrations applied in this attempt
    pub migrations_run: usize,
    /// Failure description naming the failing file, when status is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate outcome of a fleet-wide upgrade pass.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct FleetUpgradeReport {
    pub upgraded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub details: Vec<TenantUpgradeResult>,
}

/// Progress sink invoked after each tenant in a fleet pass with the tenant's
/// result, its zero-based index, and the fleet size.
pub type ProgressCallback<'a> = dyn FnMut(usize, usize, &TenantUpgradeResult) + Send + 'a;

/// Drives per-tenant and fleet-wide schema upgrades against a fixed catalog
/// snapshot taken at construction.
pub struct UpgradeEngine {
    db: DatabaseConnection,
    catalog: Arc<MigrationCatalog>,
    host: Arc<dyn DatabaseHost>,
}

impl UpgradeEngine {
    pub fn new(
        db: DatabaseConnection,
        catalog: Arc<MigrationCatalog>,
        host: Arc<dyn DatabaseHost>,
    ) -> Self {
        Self { db, catalog, host }
    }

    /// Apply all pending migrations to one tenant's database, committing the
    /// registry's `schema_version` after each success. Returns a typed result
    /// instead of failing so fleet callers can continue past one tenant.
    pub async fn upgrade_tenant(
        &self,
        tenant_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TenantUpgradeResult, OrchestratorError> {
        let tenants = TenantRepository::new(&self.db);
        let tenant = tenants.require_tenant(tenant_id).await?;
        Ok(self.upgrade_loaded_tenant(&tenants, tenant, cancel).await)
    }

    async fn upgrade_loaded_tenant(
        &self,
        tenants: &TenantRepository<'_>,
        tenant: TenantModel,
        cancel: &CancellationToken,
    ) -> TenantUpgradeResult {
        let previous_version = tenant.schema_version.clone();

        let Some(database_ref) = tenant.database_ref.clone() else {
            return TenantUpgradeResult {
                tenant_id: tenant.id,
                slug: tenant.slug,
                status: UpgradeStatus::Failed,
                previous_version: previous_version.clone(),
                new_version: previous_version,
                migrations_run: 0,
                error: Some(OrchestratorError::NotProvisioned(tenant.id).to_string()),
            };
        };

        let pending = self
            .catalog
            .migrations_since(previous_version.as_deref());

        if pending.is_empty() {
            return TenantUpgradeResult {
                tenant_id: tenant.id,
                slug: tenant.slug,
                status: UpgradeStatus::Skipped,
                previous_version: previous_version.clone(),
                new_version: previous_version,
                migrations_run: 0,
                error: None,
            };
        }

        let mut lock_version = tenant.lock_version;
        let mut committed_version = previous_version.clone();
        let mut migrations_run = 0;

        for migration in pending {
            if cancel.is_cancelled() {
                return self.failed_result(
                    &tenant,
                    previous_version,
                    committed_version,
                    migrations_run,
                    OrchestratorError::Cancelled.to_string(),
                );
            }

            let sql = match migration.read_sql().await {
                Ok(sql) => sql,
                Err(err) => {
                    return self.failed_result(
                        &tenant,
                        previous_version,
                        committed_version,
                        migrations_run,
                        format!("migration {} unreadable: {}", migration.filename, err),
                    );
                }
            };

            if let Err(err) = self.host.execute_sql(&database_ref, &sql).await {
                return self.failed_result(
                    &tenant,
                    previous_version,
                    committed_version,
                    migrations_run,
                    OrchestratorError::Migration {
                        filename: migration.filename.clone(),
                        source: Box::new(err),
                    }
                    .to_string(),
                );
            }

            // Durable commit before the next migration runs. This is the
            // resumability boundary: the recorded version always reflects
            // exactly the migrations that succeeded.
            if let Err(err) = tenants
                .commit_schema_version(tenant.id, lock_version, &migration.version)
                .await
            {
                return self.failed_result(
                    &tenant,
                    previous_version,
                    committed_version,
                    migrations_run,
                    format!(
                        "failed to record version {} after applying {}: {}",
                        migration.version, migration.filename, err
                    ),
                );
            }

            lock_version += 1;
            committed_version = Some(migration.version.clone());
            migrations_run += 1;
        }

        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            migrations_run,
            new_version = committed_version.as_deref().unwrap_or("none"),
            "Tenant upgraded"
        );

        TenantUpgradeResult {
            tenant_id: tenant.id,
            slug: tenant.slug,
            status: UpgradeStatus::Upgraded,
            previous_version,
            new_version: committed_version,
            migrations_run,
            error: None,
        }
    }

    fn failed_result(
        &self,
        tenant: &TenantModel,
        previous_version: Option<String>,
        committed_version: Option<String>,
        migrations_run: usize,
        error: String,
    ) -> TenantUpgradeResult {
        warn!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            migrations_run,
            %error,
            "Tenant upgrade failed"
        );

        TenantUpgradeResult {
            tenant_id: tenant.id,
            slug: tenant.slug.clone(),
            status: UpgradeStatus::Failed,
            previous_version,
            new_version: committed_version,
            migrations_run,
            error: Some(error),
        }
    }

    /// Upgrade every active tenant holding a provisioned database, strictly
    /// sequentially. One tenant's failure never stops the loop; cancellation
    /// is honored between tenants.
    pub async fn upgrade_fleet(
        &self,
        cancel: &CancellationToken,
        mut progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<FleetUpgradeReport, OrchestratorError> {
        let tenants = TenantRepository::new(&self.db);
        let eligible: Vec<TenantModel> = tenants
            .list_provisioned()
            .await?
            .into_iter()
            .filter(|tenant| tenant.status == status::ACTIVE)
            .collect();

        let total = eligible.len();
        let mut report = FleetUpgradeReport::default();

        info!(total, "Starting fleet upgrade pass");

        for (index, tenant) in eligible.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    processed = index,
                    total, "Fleet upgrade cancelled between tenants"
                );
                break;
            }

            let result = self.upgrade_loaded_tenant(&tenants, tenant, cancel).await;

            match result.status {
                UpgradeStatus::Upgraded => report.upgraded += 1,
                UpgradeStatus::Skipped => report.skipped += 1,
                UpgradeStatus::Failed => report.failed += 1,
            }

            metrics::counter!(
                "launchpad_tenant_upgrades_total",
                "status" => match result.status {
                    UpgradeStatus::Upgraded => "upgraded",
                    UpgradeStatus::Skipped => "skipped",
                    UpgradeStatus::Failed => "failed",
                }
            )
            .increment(1);

            if let Some(callback) = progress.as_deref_mut() {
                callback(index, total, &result);
            }

            report.details.push(result);
        }

        info!(
            upgraded = report.upgraded,
            skipped = report.skipped,
            failed = report.failed,
            "Fleet upgrade pass finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MigrationFile;
    use crate::repositories::CreateTenantRequest;
    use async_trait::async_trait;
    use migration::MigratorTrait;
    use sea_orm::Database;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory database host that records executed SQL and can be told to
    /// fail specific statements.
    struct ScriptedHost {
        executed: Mutex<Vec<(String, String)>>,
        fail_on: Mutex<HashMap<String, String>>,
    }

    impl ScriptedHost {
        fn new() -> Self {
            Self {
                executed: Mutex::new(Vec::new()),
                fail_on: Mutex::new(HashMap::new()),
            }
        }

        fn fail_when_sql_contains(&self, needle: &str, message: &str) {
            self.fail_on
                .lock()
                .unwrap()
                .insert(needle.to_string(), message.to_string());
        }

        fn executed_count(&self) -> usize {
            self.executed.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DatabaseHost for ScriptedHost {
        async fn create_instance(
            &self,
            _name: &str,
            _region: &str,
            _password: &str,
        ) -> Result<crate::provider::NewInstance, OrchestratorError> {
            unimplemented!("not used by upgrade tests")
        }

        async fn instance_state(
            &self,
            _reference: &str,
        ) -> Result<crate::provider::InstanceState, OrchestratorError> {
            unimplemented!("not used by upgrade tests")
        }

        async fn instance_keys(
            &self,
            _reference: &str,
        ) -> Result<crate::provider::InstanceKeys, OrchestratorError> {
            unimplemented!("not used by upgrade tests")
        }

        async fn execute_sql(&self, reference: &str, sql: &str) -> Result<(), OrchestratorError> {
            for (needle, message) in self.fail_on.lock().unwrap().iter() {
                if sql.contains(needle.as_str()) {
                    return Err(OrchestratorError::upstream(
                        "management",
                        500,
                        Some(message.clone()),
                    ));
                }
            }
            self.executed
                .lock()
                .unwrap()
                .push((reference.to_string(), sql.to_string()));
            Ok(())
        }
    }

    async fn setup_registry() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    fn catalog_in(dir: &std::path::Path, versions: &[&str]) -> Arc<MigrationCatalog> {
        use std::io::Write;
        let files = versions
            .iter()
            .map(|version| {
                let filename = format!("{}_change.sql", version);
                let path = dir.join(&filename);
                let mut file = std::fs::File::create(&path).unwrap();
                writeln!(file, "-- {}\nalter table widgets add column c{};", version, version)
                    .unwrap();
                MigrationFile {
                    version: (*version).to_string(),
                    filename,
                    path: PathBuf::from(path),
                }
            })
            .collect();
        Arc::new(MigrationCatalog::from_files(files))
    }

    async fn seed_tenant(
        db: &DatabaseConnection,
        slug: &str,
        schema_version: Option<&str>,
        database_ref: Option<&str>,
    ) -> Uuid {
        let repo = TenantRepository::new(db);
        let tenant = repo
            .create_tenant(CreateTenantRequest {
                slug: slug.to_string(),
                display_name: slug.to_string(),
                theme: None,
                template: None,
                owner_account: None,
            })
            .await
            .unwrap();
        if let Some(reference) = database_ref {
            repo.set_database_ref(tenant.id, reference).await.unwrap();
            repo.set_status(tenant.id, status::ACTIVE).await.unwrap();
        }
        if let Some(version) = schema_version {
            repo.commit_schema_version(tenant.id, 0, version).await.unwrap();
        }
        tenant.id
    }

    #[tokio::test]
    async fn test_pending_set_is_strictly_newer_than_recorded_version() {
        let db = setup_registry().await;
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(
            dir.path(),
            &["20250209000000", "20250211000000", "20250212000000"],
        );
        let host = Arc::new(ScriptedHost::new());
        let engine = UpgradeEngine::new(db.clone(), catalog, host.clone());

        let tenant_id =
            seed_tenant(&db, "acme", Some("20250210000000"), Some("db-acme")).await;

        let result = engine
            .upgrade_tenant(tenant_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, UpgradeStatus::Upgraded);
        assert_eq!(result.previous_version.as_deref(), Some("20250210000000"));
        assert_eq!(result.new_version.as_deref(), Some("20250212000000"));
        assert_eq!(result.migrations_run, 2);
        assert_eq!(host.executed_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_pending_set_is_a_true_noop() {
        let db = setup_registry().await;
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path(), &["20250210000000"]);
        let host = Arc::new(ScriptedHost::new());
        let engine = UpgradeEngine::new(db.clone(), catalog, host.clone());

        let tenant_id =
            seed_tenant(&db, "acme", Some("20250210000000"), Some("db-acme")).await;
        let before = TenantRepository::new(&db)
            .get_tenant(tenant_id)
            .await
            .unwrap()
            .unwrap();

        let result = engine
            .upgrade_tenant(tenant_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, UpgradeStatus::Skipped);
        assert_eq!(result.migrations_run, 0);
        assert_eq!(host.executed_count(), 0);

        // No writes: lock_version and updated_at untouched.
        let after = TenantRepository::new(&db)
            .get_tenant(tenant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.lock_version, before.lock_version);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_failure_commits_prior_successes_and_resumes() {
        let db = setup_registry().await;
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(
            dir.path(),
            &["20250211000000", "20250212000000", "20250213000000"],
        );
        let host = Arc::new(ScriptedHost::new());
        host.fail_when_sql_contains("c20250212000000", "column already exists");
        let engine = UpgradeEngine::new(db.clone(), catalog.clone(), host.clone());

        let tenant_id = seed_tenant(&db, "acme", None, Some("db-acme")).await;

        let result = engine
            .upgrade_tenant(tenant_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, UpgradeStatus::Failed);
        assert_eq!(result.migrations_run, 1);
        assert_eq!(result.new_version.as_deref(), Some("20250211000000"));
        let error = result.error.unwrap();
        assert!(error.contains("20250212000000_change.sql"));

        // The registry reflects exactly the migrations that succeeded.
        let tenant = TenantRepository::new(&db)
            .get_tenant(tenant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tenant.schema_version.as_deref(), Some("20250211000000"));

        // Fix the failure and retry: only the remainder is applied.
        host.fail_on.lock().unwrap().clear();
        let retry = engine
            .upgrade_tenant(tenant_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(retry.status, UpgradeStatus::Upgraded);
        assert_eq!(retry.previous_version.as_deref(), Some("20250211000000"));
        assert_eq!(retry.new_version.as_deref(), Some("20250213000000"));
        assert_eq!(retry.migrations_run, 2);
        // 1 from the first pass + 2 from the retry; nothing re-applied.
        assert_eq!(host.executed_count(), 3);
    }

    #[tokio::test]
    async fn test_unprovisioned_tenant_fails_without_sql() {
        let db = setup_registry().await;
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path(), &["20250211000000"]);
        let host = Arc::new(ScriptedHost::new());
        let engine = UpgradeEngine::new(db.clone(), catalog, host.clone());

        let tenant_id = seed_tenant(&db, "acme", None, None).await;

        let result = engine
            .upgrade_tenant(tenant_id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, UpgradeStatus::Failed);
        assert_eq!(result.migrations_run, 0);
        assert!(result.error.unwrap().contains("not yet provisioned"));
        assert_eq!(host.executed_count(), 0);
    }

    #[tokio::test]
    async fn test_fleet_isolates_failures_and_reports_progress() {
        let db = setup_registry().await;
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path(), &["20250211000000"]);
        let host = Arc::new(ScriptedHost::new());
        let engine = UpgradeEngine::new(db.clone(), catalog, host.clone());

        let a = seed_tenant(&db, "alpha", Some("20250211000000"), Some("db-alpha")).await;
        let b = seed_tenant(&db, "bravo", None, Some("db-bravo")).await;
        let c = seed_tenant(&db, "charlie", None, Some("db-charlie")).await;

        // Bravo's database rejects every statement; alpha and charlie run
        // on their own merits.
        struct RefScopedHost {
            inner: Arc<ScriptedHost>,
            fail_ref: String,
        }

        #[async_trait]
        impl DatabaseHost for RefScopedHost {
            async fn create_instance(
                &self,
                name: &str,
                region: &str,
                password: &str,
            ) -> Result<crate::provider::NewInstance, OrchestratorError> {
                self.inner.create_instance(name, region, password).await
            }
            async fn instance_state(
                &self,
                reference: &str,
            ) -> Result<crate::provider::InstanceState, OrchestratorError> {
                self.inner.instance_state(reference).await
            }
            async fn instance_keys(
                &self,
                reference: &str,
            ) -> Result<crate::provider::InstanceKeys, OrchestratorError> {
                self.inner.instance_keys(reference).await
            }
            async fn execute_sql(
                &self,
                reference: &str,
                sql: &str,
            ) -> Result<(), OrchestratorError> {
                if reference == self.fail_ref {
                    return Err(OrchestratorError::upstream("management", 500, None));
                }
                self.inner.execute_sql(reference, sql).await
            }
        }

        let engine = UpgradeEngine::new(
            db.clone(),
            Arc::new(MigrationCatalog::from_files(
                engine.catalog.migrations().to_vec(),
            )),
            Arc::new(RefScopedHost {
                inner: host.clone(),
                fail_ref: "db-bravo".to_string(),
            }),
        );

        let mut seen = Vec::new();
        let mut callback = |index: usize, total: usize, result: &TenantUpgradeResult| {
            seen.push((index, total, result.status));
        };

        let report = engine
            .upgrade_fleet(&CancellationToken::new(), Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.upgraded, 1);
        assert_eq!(report.details.len(), 3);

        // Ordering is stable (creation order) and every tenant reached a
        // terminal state despite bravo's failure.
        assert_eq!(report.details[0].tenant_id, a);
        assert_eq!(report.details[1].tenant_id, b);
        assert_eq!(report.details[2].tenant_id, c);
        assert_eq!(report.details[2].status, UpgradeStatus::Upgraded);

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, 3, UpgradeStatus::Skipped));
        assert_eq!(seen[2], (2, 3, UpgradeStatus::Upgraded));
    }

    #[tokio::test]
    async fn test_fleet_cancellation_stops_between_tenants() {
        let db = setup_registry().await;
        let dir = tempfile::tempdir().unwrap();
        let catalog = catalog_in(dir.path(), &["20250211000000"]);
        let host = Arc::new(ScriptedHost::new());
        let engine = UpgradeEngine::new(db.clone(), catalog, host.clone());

        seed_tenant(&db, "alpha", None, Some("db-alpha")).await;
        seed_tenant(&db, "bravo", None, Some("db-bravo")).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine.upgrade_fleet(&cancel, None).await.unwrap();
        assert!(report.details.is_empty());
        assert_eq!(host.executed_count(), 0);
    }
}
