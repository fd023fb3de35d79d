//! Database migrations for the Launchpad fleet registry.
//!
//! This module contains all registry migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_tenants;
mod m2025_06_01_000002_create_tenant_domains;
mod m2025_06_01_000003_create_tenant_credentials;
mod m2025_06_01_000004_create_provisioning_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_tenants::Migration),
            Box::new(m2025_06_01_000002_create_tenant_domains::Migration),
            Box::new(m2025_06_01_000003_create_tenant_credentials::Migration),
            Box::new(m2025_06_01_000004_create_provisioning_jobs::Migration),
        ]
    }
}
