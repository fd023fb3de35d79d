//! TenantDomain entity model
//!
//! Hostnames bound to a tenant. Hostnames are globally unique across the
//! whole fleet.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// SSL/verification states for a hostname binding.
pub mod ssl_status {
    pub const PENDING: &str = "pending";
    pub const VERIFIED: &str = "verified";
    pub const FAILED: &str = "failed";
}

/// TenantDomain entity: one hostname bound to one tenant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_domains")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Fully-qualified hostname, globally unique
    pub hostname: String,

    /// Whether this is the tenant's primary hostname
    pub is_primary: bool,

    /// SSL/verification state (pending, verified, failed)
    pub ssl_status: String,

    /// Timestamp when the binding was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id",
        on_delete = "Cascade"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
