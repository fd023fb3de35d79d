//! TenantCredential entity model
//!
//! Encrypted secret material keyed by (tenant, kind). Stores ciphertext
//! only; the AES-256-GCM envelope is produced by `crate::crypto`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Credential kinds stored per tenant.
pub mod kind {
    pub const DATABASE_URL: &str = "database_url";
    pub const SERVICE_ROLE_KEY: &str = "service_role_key";
    pub const ANON_KEY: &str = "anon_key";
}

/// TenantCredential entity: one encrypted secret per (tenant, kind)
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenant_credentials")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Credential kind (database_url, service_role_key, ...)
    pub kind: String,

    /// AES-256-GCM ciphertext envelope, never plaintext
    pub ciphertext: Vec<u8>,

    /// When this credential was last validated against its provider
    pub last_validated_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the credential was first stored
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp of the last rotation/update
    pub updated_at: DateTimeWithTimeZone,
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
