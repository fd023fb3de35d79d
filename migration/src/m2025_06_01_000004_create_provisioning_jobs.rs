//! Migration to create the provisioning_jobs table.
//!
//! Audit/progress record for one long-running operation against one tenant
//! (or a synthetic batch record for fleet-wide upgrades, with a null
//! tenant_id). Rows are append-only once completed and retained forever.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProvisioningJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProvisioningJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProvisioningJobs::TenantId).uuid().null())
                    .col(ColumnDef::new(ProvisioningJobs::Kind).text().not_null())
                    .col(
                        ColumnDef::new(ProvisioningJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ProvisioningJobs::Steps)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProvisioningJobs::Error).text().null())
                    .col(
                        ColumnDef::new(ProvisioningJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProvisioningJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_provisioning_jobs_tenant_id")
                            .from(ProvisioningJobs::Table, ProvisioningJobs::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_provisioning_jobs_tenant_id")
                    .table(ProvisioningJobs::Table)
                    .col(ProvisioningJobs::TenantId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_provisioning_jobs_tenant_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ProvisioningJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProvisioningJobs {
    Table,
    Id,
    TenantId,
    Kind,
    Status,
    Steps,
    Error,
    CreatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
