//! # Data Models
//!
//! This module contains all the data models used throughout the Launchpad
//! control plane.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod provisioning_job;
pub mod tenant;
pub mod tenant_credential;
pub mod tenant_domain;

pub use provisioning_job::Entity as ProvisioningJob;
pub use tenant::Entity as Tenant;
pub use tenant_credential::Entity as TenantCredential;
pub use tenant_domain::Entity as TenantDomain;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "launchpad".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
