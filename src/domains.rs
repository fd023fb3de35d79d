//! # Domain Allocator
//!
//! Slug validation and hostname reservation. Availability reconciles three
//! independent sources (registry tenants, registry domains, hosting
//! provider); a hostname present in any one of them is unavailable, since
//! disagreement usually means an orphaned or half-finished prior allocation.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::provider::{AttachOutcome, DomainHost};
use crate::repositories::{DomainRepository, TenantRepository};

/// Lowercase alphanumeric with internal hyphens, no leading/trailing hyphen.
static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("slug pattern is valid"));

/// Slugs that collide with infrastructure hostnames or admin surfaces.
const RESERVED_SLUGS: &[&str] = &[
    "www", "admin", "api", "app", "mail", "ftp", "staging", "dashboard",
];

const SLUG_MIN_LEN: usize = 2;
const SLUG_MAX_LEN: usize = 63;

/// Validate slug length, character pattern, and the reserved-word set.
/// Pure; rejected slugs never reach the registry or the provider.
pub fn validate_slug_format(slug: &str) -> Result<(), OrchestratorError> {
    if slug.len() < SLUG_MIN_LEN || slug.len() > SLUG_MAX_LEN {
        return Err(OrchestratorError::Validation(format!(
            "slug must be {} to {} characters, got {}",
            SLUG_MIN_LEN,
            SLUG_MAX_LEN,
            slug.len()
        )));
    }

    if !SLUG_PATTERN.is_match(slug) {
        return Err(OrchestratorError::Validation(
            "slug must be lowercase alphanumeric with internal hyphens".to_string(),
        ));
    }

    if RESERVED_SLUGS.contains(&slug) {
        return Err(OrchestratorError::Validation(format!(
            "slug '{}' is reserved",
            slug
        )));
    }

    Ok(())
}

/// Availability report for one slug.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SlugAvailability {
    pub slug: String,
    pub hostname: String,
    pub available: bool,
    /// Sources where the slug/hostname was found when unavailable
    pub taken_in: Vec<String>,
}

/// Outcome of a hostname allocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOutcome {
    /// Registered and attached at the provider
    Allocated,
    /// The provider already had the hostname attached; treated as success
    AlreadyAttached,
    /// Provider credentials not configured; nothing was attached
    SkippedNotConfigured,
}

/// Reserves and releases tenant hostnames under a fixed apex domain.
pub struct DomainAllocator {
    db: DatabaseConnection,
    hosting: Arc<dyn DomainHost>,
    apex_domain: String,
}

impl DomainAllocator {
    pub fn new(db: DatabaseConnection, hosting: Arc<dyn DomainHost>, apex_domain: String) -> Self {
        Self {
            db,
            hosting,
            apex_domain,
        }
    }

    /// The fully-qualified hostname a slug maps to.
    pub fn hostname_for(&self, slug: &str) -> String {
        format!("{}.{}", slug, self.apex_domain)
    }

    /// Check a slug against all three sources of truth. Unavailable if any
    /// source knows it.
    pub async fn check_availability(
        &self,
        slug: &str,
    ) -> Result<SlugAvailability, OrchestratorError> {
        validate_slug_format(slug)?;

        let hostname = self.hostname_for(slug);
        let mut taken_in = Vec::new();

        if TenantRepository::new(&self.db).slug_exists(slug).await? {
            taken_in.push("registry_tenants".to_string());
        }

        if DomainRepository::new(&self.db)
            .hostname_exists(&hostname)
            .await?
        {
            taken_in.push("registry_domains".to_string());
        }

        if self.hosting.is_configured() && self.hosting.domain_exists(&hostname).await? {
            taken_in.push("provider".to_string());
        }

        if !taken_in.is_empty() {
            warn!(%slug, sources = ?taken_in, "Slug unavailable");
        }

        Ok(SlugAvailability {
            slug: slug.to_string(),
            hostname,
            available: taken_in.is_empty(),
            taken_in,
        })
    }

    /// Reserve a hostname for a tenant: record it in the registry, then
    /// attach it at the provider. A provider-side "already attached" is
    /// success. Without provider credentials the registry record is still
    /// written and the attach is skipped explicitly.
    pub async fn allocate_domain(
        &self,
        tenant_id: Uuid,
        slug: &str,
        is_primary: bool,
    ) -> Result<AllocationOutcome, OrchestratorError> {
        validate_slug_format(slug)?;
        let hostname = self.hostname_for(slug);

        let domains = DomainRepository::new(&self.db);
        if !domains.hostname_exists(&hostname).await? {
            domains.create_domain(tenant_id, &hostname, is_primary).await?;
        }

        if !self.hosting.is_configured() {
            info!(%hostname, "Hosting provider not configured; skipping attach");
            return Ok(AllocationOutcome::SkippedNotConfigured);
        }

        match self.hosting.attach_domain(&hostname).await? {
            AttachOutcome::Attached => Ok(AllocationOutcome::Allocated),
            AttachOutcome::AlreadyAttached => Ok(AllocationOutcome::AlreadyAttached),
        }
    }

    /// Release a hostname: detach at the provider (when configured), then
    /// drop the registry record. Both halves tolerate the hostname already
    /// being gone.
    pub async fn release_domain(&self, hostname: &str) -> Result<(), OrchestratorError> {
        if self.hosting.is_configured() {
            self.hosting.detach_domain(hostname).await?;
        }

        DomainRepository::new(&self.db)
            .delete_by_hostname(hostname)
            .await?;

        info!(%hostname, "Released hostname");
        Ok(())
    }
}
