//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! fleet-registry entities, keeping query and concurrency details out of the
//! orchestration core.

pub mod provisioning_job;
pub mod tenant;
pub mod tenant_credential;
pub mod tenant_domain;

pub use provisioning_job::JobRepository;
pub use tenant::{CreateTenantRequest, TenantRepository};
pub use tenant_credential::CredentialRepository;
pub use tenant_domain::DomainRepository;
