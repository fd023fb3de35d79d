//! # Remote Provider Clients
//!
//! Typed clients for the two external capabilities the orchestrator depends
//! on: the database management API (create/poll/query isolated instances)
//! and the hosting provider's domain API (allocate/verify/remove hostnames).
//!
//! Both capabilities sit behind traits so the provisioner, upgrade engine,
//! and domain allocator can be driven against mock hosts in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

pub mod hosting;
pub mod management;

pub use hosting::HostingClient;
pub use management::ManagementClient;

/// Lifecycle state reported by the management provider for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// Still coming up; keep polling
    Provisioning,
    /// Terminal-ready: the instance is reachable and accepting SQL
    Ready,
    /// Terminal-failure reported by the provider
    Failed(String),
}

/// Reference to a newly created isolated database instance.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInstance {
    /// Opaque provider handle, persisted as the tenant's `database_ref`
    pub reference: String,
}

/// Access credentials for a ready instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceKeys {
    pub database_url: String,
    pub service_role_key: String,
    pub anon_key: String,
}

/// Remote database management capability.
#[async_trait]
pub trait DatabaseHost: Send + Sync {
    /// Create an isolated database instance with a deterministic name.
    async fn create_instance(
        &self,
        name: &str,
        region: &str,
        password: &str,
    ) -> Result<NewInstance, OrchestratorError>;

    /// Report the instance's current lifecycle state.
    async fn instance_state(&self, reference: &str) -> Result<InstanceState, OrchestratorError>;

    /// Fetch access credentials for a ready instance.
    async fn instance_keys(&self, reference: &str) -> Result<InstanceKeys, OrchestratorError>;

    /// Execute a SQL statement against the instance.
    async fn execute_sql(&self, reference: &str, sql: &str) -> Result<(), OrchestratorError>;
}

/// Outcome of attaching a hostname at the hosting provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Newly attached
    Attached,
    /// The provider reported the hostname as already attached; treated as
    /// success (idempotent attach)
    AlreadyAttached,
}

/// Hosting/CDN domain-allocation capability.
#[async_trait]
pub trait DomainHost: Send + Sync {
    /// Whether provider credentials are configured in this environment.
    fn is_configured(&self) -> bool;

    /// Whether the hostname is already known to the provider.
    async fn domain_exists(&self, hostname: &str) -> Result<bool, OrchestratorError>;

    /// Attach a hostname to the shared multi-tenant deployment.
    async fn attach_domain(&self, hostname: &str) -> Result<AttachOutcome, OrchestratorError>;

    /// Detach a hostname from the shared multi-tenant deployment.
    async fn detach_domain(&self, hostname: &str) -> Result<(), OrchestratorError>;
}
