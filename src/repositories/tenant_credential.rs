//! # Credential Repository
//!
//! Registry operations for encrypted tenant secrets. Only ciphertext
//! envelopes cross this boundary; encryption and decryption happen in the
//! orchestration core via `crate::crypto`.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::models::tenant_credential::{
    ActiveModel as CredentialActiveModel, Column, Entity as TenantCredential,
    Model as CredentialModel,
};

/// Repository for encrypted tenant credentials
pub struct CredentialRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> CredentialRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_credential(
        &self,
        tenant_id: Uuid,
        kind: &str,
    ) -> Result<Option<CredentialModel>, OrchestratorError> {
        Ok(TenantCredential::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Kind.eq(kind))
            .one(self.db)
            .await?)
    }

    /// Insert or rotate the credential for (tenant, kind). Rotation replaces
    /// the ciphertext in place and refreshes `updated_at`.
    pub async fn upsert_credential(
        &self,
        tenant_id: Uuid,
        kind: &str,
        ciphertext: Vec<u8>,
    ) -> Result<CredentialModel, OrchestratorError> {
        let now = Utc::now().fixed_offset();

        match self.get_credential(tenant_id, kind).await? {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.ciphertext = Set(ciphertext);
                active.updated_at = Set(now);
                Ok(active.update(self.db).await?)
            }
            None => {
                let credential = CredentialActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(tenant_id),
                    kind: Set(kind.to_string()),
                    ciphertext: Set(ciphertext),
                    last_validated_at: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                Ok(credential.insert(self.db).await?)
            }
        }
    }

    pub async fn mark_validated(
        &self,
        tenant_id: Uuid,
        kind: &str,
    ) -> Result<(), OrchestratorError> {
        if let Some(existing) = self.get_credential(tenant_id, kind).await? {
            let mut active = existing.into_active_model();
            active.last_validated_at = Set(Some(Utc::now().fixed_offset()));
            active.update(self.db).await?;
        }
        Ok(())
    }
}
