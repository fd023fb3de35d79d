//! Tenant entity model
//!
//! This module contains the SeaORM entity model for the tenants table:
//! one row per customer site instance, carrying its lifecycle status, the
//! schema version last applied to its isolated database, and its flag map.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Lifecycle states a tenant moves through.
pub mod status {
    pub const PROVISIONING: &str = "provisioning";
    pub const ACTIVE: &str = "active";
    pub const SUSPENDED: &str = "suspended";
    pub const ARCHIVED: &str = "archived";
}

/// Tenant entity: identity + lifecycle record for one isolated site
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// URL-safe unique slug
    pub slug: String,

    /// Human-readable display name
    pub display_name: String,

    /// Lifecycle status (provisioning, active, suspended, archived)
    pub status: String,

    /// Version of the most recent migration applied to the tenant database.
    /// Null until first provisioned; monotonically non-decreasing afterwards.
    pub schema_version: Option<String>,

    /// Opaque handle to the tenant's isolated database instance.
    /// Null while provisioning; only persisted after the instance is reachable.
    pub database_ref: Option<String>,

    /// Flag name -> boolean map
    #[sea_orm(column_type = "JsonBinary")]
    pub feature_flags: JsonValue,

    /// Theme identifier
    pub theme: String,

    /// Template identifier
    pub template: String,

    /// Owning account identifier
    pub owner_account: Option<Uuid>,

    /// Optimistic concurrency counter bumped on every orchestrated write
    pub lock_version: i32,

    /// Timestamp when the tenant was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last update
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tenant_domain::Entity")]
    TenantDomains,
    #[sea_orm(has_many = "super::tenant_credential::Entity")]
    TenantCredentials,
    #[sea_orm(has_many = "super::provisioning_job::Entity")]
    ProvisioningJobs,
}

impl Related<super::tenant_domain::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TenantDomains.def()
    }
}

impl Related<super::tenant_credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TenantCredentials.def()
    }
}

impl Related<super::provisioning_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProvisioningJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
