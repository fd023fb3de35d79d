//! # Feature Flag Propagator
//!
//! Additively merges new default flags into each tenant's flag map. The
//! merge is a set-union on keys: a key already present is never overwritten,
//! whatever its value, because an existing value may be a deliberate
//! per-tenant customization. Two writes happen per touched tenant, registry
//! first, then the tenant's own runtime store; a runtime failure after a
//! registry success surfaces as a distinct error so operators can retry just
//! the sync.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::models::tenant::{Model as TenantModel, status};
use crate::provider::DatabaseHost;
use crate::repositories::TenantRepository;

/// Flag keys become identifiers in the tenant runtime store; validated
/// before any SQL is assembled from them.
static FLAG_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]{1,64}$").expect("flag key pattern is valid"));

/// Result of propagating defaults to one tenant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TenantPropagationResult {
    pub tenant_id: Uuid,
    pub slug: String,
    /// Keys newly added to the tenant's map
    pub added: Vec<String>,
    /// Keys already present and left untouched
    pub skipped: Vec<String>,
    /// Whether the tenant's runtime store was updated (false when no keys
    /// were added or the tenant has no provisioned database)
    pub runtime_synced: bool,
}

/// Aggregate outcome of a fleet-wide propagation pass.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct FleetPropagationReport {
    /// Tenants whose flag map gained at least one key
    pub tenants_updated: usize,
    /// Total keys added across the fleet
    pub flags_added: usize,
    /// Per-tenant failures; the pass continues past each
    pub errors: Vec<TenantPropagationError>,
    pub details: Vec<TenantPropagationResult>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TenantPropagationError {
    pub tenant_id: Uuid,
    pub slug: String,
    pub error: String,
}

/// Propagates new default flags across the fleet registry and each tenant's
/// runtime configuration store.
pub struct FlagPropagator {
    db: DatabaseConnection,
    host: Arc<dyn DatabaseHost>,
}

impl FlagPropagator {
    pub fn new(db: DatabaseConnection, host: Arc<dyn DatabaseHost>) -> Self {
        Self { db, host }
    }

    /// Merge `new_defaults` into one tenant's flag map. Keys already present
    /// are skipped regardless of value; calling twice with the same defaults
    /// adds zero keys the second time.
    pub async fn propagate_to_tenant(
        &self,
        tenant_id: Uuid,
        new_defaults: &BTreeMap<String, bool>,
    ) -> Result<TenantPropagationResult, OrchestratorError> {
        validate_flag_keys(new_defaults)?;

        let tenants = TenantRepository::new(&self.db);
        let tenant = tenants.require_tenant(tenant_id).await?;
        self.propagate_to_loaded_tenant(&tenants, tenant, new_defaults)
            .await
    }

    async fn propagate_to_loaded_tenant(
        &self,
        tenants: &TenantRepository<'_>,
        tenant: TenantModel,
        new_defaults: &BTreeMap<String, bool>,
    ) -> Result<TenantPropagationResult, OrchestratorError> {
        let mut flags = match &tenant.feature_flags {
            JsonValue::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };

        let mut added = Vec::new();
        let mut skipped = Vec::new();

        for (key, default) in new_defaults {
            if flags.contains_key(key) {
                skipped.push(key.clone());
            } else {
                flags.insert(key.clone(), JsonValue::Bool(*default));
                added.push(key.clone());
            }
        }

        if added.is_empty() {
            return Ok(TenantPropagationResult {
                tenant_id: tenant.id,
                slug: tenant.slug,
                added,
                skipped,
                runtime_synced: false,
            });
        }

        tenants
            .update_feature_flags(tenant.id, tenant.lock_version, JsonValue::Object(flags))
            .await?;

        // Registry is now current; sync the tenant's live runtime store. A
        // failure from here on is the distinguishable lagged-sync case.
        let runtime_synced = match &tenant.database_ref {
            Some(database_ref) => {
                self.sync_runtime_store(&tenant, database_ref, new_defaults, &added)
                    .await?;
                true
            }
            None => {
                warn!(
                    tenant_id = %tenant.id,
                    slug = %tenant.slug,
                    "Tenant has no provisioned database; runtime sync deferred"
                );
                false
            }
        };

        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            added = added.len(),
            skipped = skipped.len(),
            runtime_synced,
            "Propagated default flags"
        );

        Ok(TenantPropagationResult {
            tenant_id: tenant.id,
            slug: tenant.slug,
            added,
            skipped,
            runtime_synced,
        })
    }

    async fn sync_runtime_store(
        &self,
        tenant: &TenantModel,
        database_ref: &str,
        new_defaults: &BTreeMap<String, bool>,
        added: &[String],
    ) -> Result<(), OrchestratorError> {
        // Additive on the runtime side too: existing rows win on conflict.
        // Keys were validated against FLAG_KEY_PATTERN before reaching here.
        let values: Vec<String> = added
            .iter()
            .map(|key| format!("('{}', {})", key, new_defaults[key]))
            .collect();
        let sql = format!(
            "insert into feature_flags (name, enabled) values {} on conflict (name) do nothing",
            values.join(", ")
        );

        self.host
            .execute_sql(database_ref, &sql)
            .await
            .map_err(|err| OrchestratorError::RuntimeSyncFailed {
                tenant_id: tenant.id,
                source: Box::new(err),
            })
    }

    /// Propagate defaults to every active tenant, sequentially, collecting
    /// per-tenant errors without aborting the pass.
    pub async fn propagate_to_fleet(
        &self,
        new_defaults: &BTreeMap<String, bool>,
    ) -> Result<FleetPropagationReport, OrchestratorError> {
        validate_flag_keys(new_defaults)?;

        let tenants = TenantRepository::new(&self.db);
        let fleet: Vec<TenantModel> = tenants
            .list_tenants()
            .await?
            .into_iter()
            .filter(|tenant| tenant.status == status::ACTIVE)
            .collect();

        let mut report = FleetPropagationReport::default();

        for tenant in fleet {
            let tenant_id = tenant.id;
            let slug = tenant.slug.clone();

            match self
                .propagate_to_loaded_tenant(&tenants, tenant, new_defaults)
                .await
            {
                Ok(result) => {
                    if !result.added.is_empty() {
                        report.tenants_updated += 1;
                        report.flags_added += result.added.len();
                    }
                    report.details.push(result);
                }
                Err(err) => {
                    warn!(%tenant_id, %slug, error = %err, "Flag propagation failed for tenant");
                    report.errors.push(TenantPropagationError {
                        tenant_id,
                        slug,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

fn validate_flag_keys(new_defaults: &BTreeMap<String, bool>) -> Result<(), OrchestratorError> {
    for key in new_defaults.keys() {
        if !FLAG_KEY_PATTERN.is_match(key) {
            return Err(OrchestratorError::Validation(format!(
                "flag key '{}' must match [a-z0-9_]{{1,64}}",
                key
            )));
        }
    }
    Ok(())
}
