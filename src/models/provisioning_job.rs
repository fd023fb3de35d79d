//! ProvisioningJob entity model
//!
//! Audit/progress record for one long-running operation. Fleet-wide batches
//! use a synthetic record with a null tenant_id. Jobs are append-only once
//! completed and never deleted.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Job kinds tracked by the orchestrator.
pub mod kind {
    pub const PROVISION: &str = "provision";
    pub const UPGRADE: &str = "upgrade";
    pub const KEY_UPDATE: &str = "key_update";
    pub const DOMAIN_ADD: &str = "domain_add";
}

/// Job and step statuses.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const RUNNING: &str = "running";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const SKIPPED: &str = "skipped";
}

/// One named step inside a job's ordered step list (stored as json).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobStep {
    /// Step name (e.g. create_database, apply_migrations)
    pub name: String,
    /// Step status (pending, running, completed, failed)
    pub status: String,
    /// When the step started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// When the step finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Error message if the step failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// ProvisioningJob entity: progress record for one orchestrated operation
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "provisioning_jobs")]
pub struct Model {
    /// Unique identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Target tenant; null for fleet-wide batch records
    pub tenant_id: Option<Uuid>,

    /// Operation kind (provision, upgrade, key_update, domain_add)
    pub kind: String,

    /// Overall status (pending, running, completed, failed)
    pub status: String,

    /// Ordered list of [`JobStep`] values
    #[sea_orm(column_type = "JsonBinary")]
    pub steps: JsonValue,

    /// Overall error if the job failed
    pub error: Option<String>,

    /// Timestamp when the job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the job reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,
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
