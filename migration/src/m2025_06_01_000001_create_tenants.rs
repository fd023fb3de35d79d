//! Migration to create the tenants table.
//!
//! Baseline fleet-registry table: one row per customer site instance with
//! its lifecycle status, recorded schema version, and isolated database
//! reference.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tenants::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Tenants::Slug)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Tenants::DisplayName).text().not_null())
                    .col(
                        ColumnDef::new(Tenants::Status)
                            .text()
                            .not_null()
                            .default("provisioning"),
                    )
                    .col(ColumnDef::new(Tenants::SchemaVersion).text().null())
                    .col(ColumnDef::new(Tenants::DatabaseRef).text().null())
                    .col(ColumnDef::new(Tenants::FeatureFlags).json_binary().not_null())
                    .col(
                        ColumnDef::new(Tenants::Theme)
                            .text()
                            .not_null()
                            .default("default"),
                    )
                    .col(
                        ColumnDef::new(Tenants::Template)
                            .text()
                            .not_null()
                            .default("standard"),
                    )
                    .col(ColumnDef::new(Tenants::OwnerAccount).uuid().null())
                    .col(
                        ColumnDef::new(Tenants::LockVersion)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Tenants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Tenants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tenants_status")
                    .table(Tenants::Table)
                    .col(Tenants::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Slug,
    DisplayName,
    Status,
    SchemaVersion,
    DatabaseRef,
    FeatureFlags,
    Theme,
    Template,
    OwnerAccount,
    LockVersion,
    CreatedAt,
    UpdatedAt,
}
