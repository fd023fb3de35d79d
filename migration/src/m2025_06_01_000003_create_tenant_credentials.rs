//! Migration to create the tenant_credentials table.
//!
//! Encrypted secret material keyed by (tenant, credential kind). Only
//! ciphertext is ever stored; plaintext never touches the registry.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantCredentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TenantCredentials::TenantId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TenantCredentials::Kind).text().not_null())
                    .col(
                        ColumnDef::new(TenantCredentials::Ciphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantCredentials::LastValidatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(TenantCredentials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tenant_credentials_tenant_id")
                            .from(TenantCredentials::Table, TenantCredentials::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One credential row per (tenant, kind)
        manager
            .create_index(
                Index::create()
                    .name("idx_tenant_credentials_tenant_kind")
                    .table(TenantCredentials::Table)
                    .col(TenantCredentials::TenantId)
                    .col(TenantCredentials::Kind)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_tenant_credentials_tenant_kind")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(TenantCredentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TenantCredentials {
    Table,
    Id,
    TenantId,
    Kind,
    Ciphertext,
    LastValidatedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}
