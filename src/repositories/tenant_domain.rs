//! # Domain Repository
//!
//! Registry operations for hostname allocations. Hostnames are globally
//! unique across the fleet; the unique index is the final arbiter and a
//! violation surfaces as a conflict.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::error::{OrchestratorError, is_unique_violation};
use crate::models::tenant_domain::{
    ActiveModel as DomainActiveModel, Column, Entity as TenantDomain, Model as DomainModel,
    ssl_status,
};

/// Repository for tenant domain allocations
pub struct DomainRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> DomainRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn hostname_exists(&self, hostname: &str) -> Result<bool, OrchestratorError> {
        Ok(TenantDomain::find()
            .filter(Column::Hostname.eq(hostname))
            .one(self.db)
            .await?
            .is_some())
    }

    pub async fn find_by_hostname(
        &self,
        hostname: &str,
    ) -> Result<Option<DomainModel>, OrchestratorError> {
        Ok(TenantDomain::find()
            .filter(Column::Hostname.eq(hostname))
            .one(self.db)
            .await?)
    }

    pub async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<DomainModel>, OrchestratorError> {
        Ok(TenantDomain::find()
            .filter(Column::TenantId.eq(tenant_id))
            .all(self.db)
            .await?)
    }

    /// Record a hostname allocation for a tenant. Duplicates map to a
    /// conflict naming the hostname.
    pub async fn create_domain(
        &self,
        tenant_id: Uuid,
        hostname: &str,
        is_primary: bool,
    ) -> Result<DomainModel, OrchestratorError> {
        let domain = DomainActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            hostname: Set(hostname.to_string()),
            is_primary: Set(is_primary),
            ssl_status: Set(ssl_status::PENDING.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        };

        domain.insert(self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                OrchestratorError::Conflict(format!("hostname '{}' is already allocated", hostname))
            } else {
                err.into()
            }
        })
    }

    pub async fn delete_by_hostname(&self, hostname: &str) -> Result<bool, OrchestratorError> {
        let result = TenantDomain::delete_many()
            .filter(Column::Hostname.eq(hostname))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
