//! # Tenant Repository
//!
//! Registry operations for tenant rows. Orchestrated writes to a tenant's
//! lifecycle fields go through the optimistic-lock helpers here: every such
//! update is filtered on the lock version the caller read and bumps it by
//! one, so a concurrent writer loses with a conflict instead of silently
//! overwriting.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{OrchestratorError, is_unique_violation};
use crate::models::tenant::{
    ActiveModel as TenantActiveModel, Column, Entity as Tenant, Model as TenantModel, status,
};

/// Request data for creating a new tenant row
#[derive(Debug, Clone)]
pub struct CreateTenantRequest {
    /// URL-safe unique slug, already validated by the domain allocator
    pub slug: String,
    /// Display name for the tenant
    pub display_name: String,
    /// Theme identifier
    pub theme: Option<String>,
    /// Template identifier
    pub template: Option<String>,
    /// Owning account
    pub owner_account: Option<Uuid>,
}

/// Repository for tenant registry operations
pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a tenant in the `provisioning` state with an empty flag map.
    /// A duplicate slug maps to a conflict.
    pub async fn create_tenant(
        &self,
        request: CreateTenantRequest,
    ) -> Result<TenantModel, OrchestratorError> {
        let now = Utc::now().fixed_offset();

        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(request.slug.clone()),
            display_name: Set(request.display_name),
            status: Set(status::PROVISIONING.to_string()),
            schema_version: Set(None),
            database_ref: Set(None),
            feature_flags: Set(JsonValue::Object(Default::default())),
            theme: Set(request.theme.unwrap_or_else(|| "default".to_string())),
            template: Set(request.template.unwrap_or_else(|| "standard".to_string())),
            owner_account: Set(request.owner_account),
            lock_version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        tenant.insert(self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                OrchestratorError::Conflict(format!("slug '{}' is already taken", request.slug))
            } else {
                err.into()
            }
        })
    }

    pub async fn get_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantModel>, OrchestratorError> {
        Ok(Tenant::find_by_id(tenant_id).one(self.db).await?)
    }

    /// Fetch a tenant or fail with a validation error naming the ID.
    pub async fn require_tenant(&self, tenant_id: Uuid) -> Result<TenantModel, OrchestratorError> {
        self.get_tenant(tenant_id).await?.ok_or_else(|| {
            OrchestratorError::Validation(format!("tenant {} does not exist", tenant_id))
        })
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantModel>, OrchestratorError> {
        Ok(Tenant::find()
            .filter(Column::Slug.eq(slug))
            .one(self.db)
            .await?)
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool, OrchestratorError> {
        Ok(self.find_by_slug(slug).await?.is_some())
    }

    /// All tenants, oldest first. Fleet operations walk this list so batch
    /// ordering is stable across runs.
    pub async fn list_tenants(&self) -> Result<Vec<TenantModel>, OrchestratorError> {
        Ok(Tenant::find()
            .order_by_asc(Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    /// Tenants holding a provisioned database, oldest first.
    pub async fn list_provisioned(&self) -> Result<Vec<TenantModel>, OrchestratorError> {
        Ok(Tenant::find()
            .filter(Column::DatabaseRef.is_not_null())
            .order_by_asc(Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    /// Record the provider handle for the tenant's isolated database. Called
    /// only after the instance reported ready; a tenant row never points at
    /// an unreachable database.
    pub async fn set_database_ref(
        &self,
        tenant_id: Uuid,
        reference: &str,
    ) -> Result<(), OrchestratorError> {
        let result = Tenant::update_many()
            .col_expr(Column::DatabaseRef, Expr::value(reference))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(tenant_id))
            .exec(self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(OrchestratorError::Validation(format!(
                "tenant {} does not exist",
                tenant_id
            )));
        }
        Ok(())
    }

    pub async fn set_status(
        &self,
        tenant_id: Uuid,
        new_status: &str,
    ) -> Result<(), OrchestratorError> {
        Tenant::update_many()
            .col_expr(Column::Status, Expr::value(new_status))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(tenant_id))
            .exec(self.db)
            .await?;
        Ok(())
    }

    /// Durably record that a migration version has been applied to the
    /// tenant's database. Filtered on the lock version the caller observed;
    /// losing the race is a conflict, and the caller must re-read before
    /// retrying.
    pub async fn commit_schema_version(
        &self,
        tenant_id: Uuid,
        expected_lock_version: i32,
        version: &str,
    ) -> Result<(), OrchestratorError> {
        let result = Tenant::update_many()
            .col_expr(Column::SchemaVersion, Expr::value(version))
            .col_expr(
                Column::LockVersion,
                Expr::col(Column::LockVersion).add(1),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(tenant_id))
            .filter(Column::LockVersion.eq(expected_lock_version))
            .exec(self.db)
            .await?;

        if result.rows_affected != 1 {
            return Err(OrchestratorError::Conflict(format!(
                "tenant {} was modified concurrently",
                tenant_id
            )));
        }
        Ok(())
    }

    /// Replace the tenant's flag map under the same optimistic-lock protocol
    /// as schema-version commits.
    pub async fn update_feature_flags(
        &self,
        tenant_id: Uuid,
        expected_lock_version: i32,
        flags: JsonValue,
    ) -> Result<(), OrchestratorError> {
        let result = Tenant::update_many()
            .col_expr(Column::FeatureFlags, Expr::value(flags))
            .col_expr(
                Column::LockVersion,
                Expr::col(Column::LockVersion).add(1),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(tenant_id))
            .filter(Column::LockVersion.eq(expected_lock_version))
            .exec(self.db)
            .await?;

        if result.rows_affected != 1 {
            return Err(OrchestratorError::Conflict(format!(
                "tenant {} was modified concurrently",
                tenant_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::MigratorTrait;
    use sea_orm::Database;

    async fn setup_registry() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    fn request(slug: &str) -> CreateTenantRequest {
        CreateTenantRequest {
            slug: slug.to_string(),
            display_name: format!("{} store", slug),
            theme: None,
            template: None,
            owner_account: None,
        }
    }

    #[tokio::test]
    async fn test_create_tenant_starts_provisioning_with_empty_flags() {
        let db = setup_registry().await;
        let repo = TenantRepository::new(&db);

        let tenant = repo.create_tenant(request("acme")).await.unwrap();

        assert_eq!(tenant.slug, "acme");
        assert_eq!(tenant.status, status::PROVISIONING);
        assert_eq!(tenant.schema_version, None);
        assert_eq!(tenant.database_ref, None);
        assert_eq!(tenant.feature_flags, serde_json::json!({}));
        assert_eq!(tenant.lock_version, 0);
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_a_conflict() {
        let db = setup_registry().await;
        let repo = TenantRepository::new(&db);

        repo.create_tenant(request("acme")).await.unwrap();
        let err = repo.create_tenant(request("acme")).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_commit_schema_version_bumps_lock_version() {
        let db = setup_registry().await;
        let repo = TenantRepository::new(&db);
        let tenant = repo.create_tenant(request("acme")).await.unwrap();

        repo.commit_schema_version(tenant.id, 0, "20250210000000")
            .await
            .unwrap();

        let reloaded = repo.get_tenant(tenant.id).await.unwrap().unwrap();
        assert_eq!(reloaded.schema_version.as_deref(), Some("20250210000000"));
        assert_eq!(reloaded.lock_version, 1);
    }

    #[tokio::test]
    async fn test_stale_lock_version_is_a_conflict() {
        let db = setup_registry().await;
        let repo = TenantRepository::new(&db);
        let tenant = repo.create_tenant(request("acme")).await.unwrap();

        repo.commit_schema_version(tenant.id, 0, "20250210000000")
            .await
            .unwrap();

        // Second writer still holding lock_version 0 loses.
        let err = repo
            .commit_schema_version(tenant.id, 0, "20250211000000")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict(_)));

        let reloaded = repo.get_tenant(tenant.id).await.unwrap().unwrap();
        assert_eq!(reloaded.schema_version.as_deref(), Some("20250210000000"));
    }

    #[tokio::test]
    async fn test_list_provisioned_excludes_tenants_without_database() {
        let db = setup_registry().await;
        let repo = TenantRepository::new(&db);

        let with_db = repo.create_tenant(request("acme")).await.unwrap();
        repo.create_tenant(request("pending")).await.unwrap();
        repo.set_database_ref(with_db.id, "db-abc123").await.unwrap();

        let provisioned = repo.list_provisioned().await.unwrap();
        assert_eq!(provisioned.len(), 1);
        assert_eq!(provisioned[0].id, with_db.id);
        assert_eq!(provisioned[0].database_ref.as_deref(), Some("db-abc123"));
    }

    #[tokio::test]
    async fn test_update_feature_flags_optimistic() {
        let db = setup_registry().await;
        let repo = TenantRepository::new(&db);
        let tenant = repo.create_tenant(request("acme")).await.unwrap();

        repo.update_feature_flags(
            tenant.id,
            0,
            serde_json::json!({ "new_checkout": true }),
        )
        .await
        .unwrap();

        let reloaded = repo.get_tenant(tenant.id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.feature_flags,
            serde_json::json!({ "new_checkout": true })
        );
        assert_eq!(reloaded.lock_version, 1);
    }
}
