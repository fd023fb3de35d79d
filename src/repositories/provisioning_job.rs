//! # Job Repository
//!
//! Registry operations for provisioning-job progress records. Steps are an
//! ordered json list inside the row; the orchestration core drives them
//! through pending -> running -> completed/failed as each phase of an
//! operation runs.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::models::provisioning_job::{
    ActiveModel as JobActiveModel, Entity as ProvisioningJob, JobStep, Model as JobModel, status,
};

/// Repository for provisioning-job records
pub struct JobRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> JobRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a running job with the given ordered step names, all pending.
    /// `tenant_id` is `None` for fleet-wide batch records.
    pub async fn create_job(
        &self,
        tenant_id: Option<Uuid>,
        kind: &str,
        step_names: &[&str],
    ) -> Result<JobModel, OrchestratorError> {
        let steps: Vec<JobStep> = step_names
            .iter()
            .map(|name| JobStep {
                name: (*name).to_string(),
                status: status::PENDING.to_string(),
                started_at: None,
                completed_at: None,
                error: None,
            })
            .collect();

        let job = JobActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            kind: Set(kind.to_string()),
            status: Set(status::RUNNING.to_string()),
            steps: Set(serde_json::to_value(&steps)
                .map_err(|err| OrchestratorError::Validation(err.to_string()))?),
            error: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
            completed_at: Set(None),
        };

        Ok(job.insert(self.db).await?)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<JobModel>, OrchestratorError> {
        Ok(ProvisioningJob::find_by_id(job_id).one(self.db).await?)
    }

    /// Mark a step running.
    pub async fn start_step(&self, job_id: Uuid, name: &str) -> Result<(), OrchestratorError> {
        self.mutate_step(job_id, name, |step| {
            step.status = status::RUNNING.to_string();
            step.started_at = Some(Utc::now());
        })
        .await
    }

    /// Mark a step completed.
    pub async fn complete_step(&self, job_id: Uuid, name: &str) -> Result<(), OrchestratorError> {
        self.mutate_step(job_id, name, |step| {
            step.status = status::COMPLETED.to_string();
            step.completed_at = Some(Utc::now());
        })
        .await
    }

    /// Mark a step failed with an error message.
    pub async fn fail_step(
        &self,
        job_id: Uuid,
        name: &str,
        error: &str,
    ) -> Result<(), OrchestratorError> {
        let error = error.to_string();
        self.mutate_step(job_id, name, move |step| {
            step.status = status::FAILED.to_string();
            step.completed_at = Some(Utc::now());
            step.error = Some(error);
        })
        .await
    }

    /// Record a step as skipped by completing it with a note. Used when an
    /// optional phase (e.g. domain allocation) is not configured.
    pub async fn skip_step(
        &self,
        job_id: Uuid,
        name: &str,
        reason: &str,
    ) -> Result<(), OrchestratorError> {
        let reason = reason.to_string();
        self.mutate_step(job_id, name, move |step| {
            step.status = status::SKIPPED.to_string();
            step.completed_at = Some(Utc::now());
            step.error = Some(reason);
        })
        .await
    }

    /// Terminal success for the whole job.
    pub async fn complete_job(&self, job_id: Uuid) -> Result<(), OrchestratorError> {
        self.finish_job(job_id, status::COMPLETED, None).await
    }

    /// Terminal failure for the whole job.
    pub async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<(), OrchestratorError> {
        self.finish_job(job_id, status::FAILED, Some(error.to_string()))
            .await
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        final_status: &str,
        error: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let job = self.require_job(job_id).await?;
        let mut active = job.into_active_model();
        active.status = Set(final_status.to_string());
        active.error = Set(error);
        active.completed_at = Set(Some(Utc::now().fixed_offset()));
        active.update(self.db).await?;
        Ok(())
    }

    async fn mutate_step<F>(
        &self,
        job_id: Uuid,
        name: &str,
        mutate: F,
    ) -> Result<(), OrchestratorError>
    where
        F: FnOnce(&mut JobStep),
    {
        let job = self.require_job(job_id).await?;

        let mut steps: Vec<JobStep> = serde_json::from_value(job.steps.clone())
            .map_err(|err| OrchestratorError::Validation(err.to_string()))?;

        let step = steps.iter_mut().find(|step| step.name == name).ok_or_else(|| {
            OrchestratorError::Validation(format!("job {} has no step '{}'", job_id, name))
        })?;
        mutate(step);

        let mut active = job.into_active_model();
        active.steps = Set(serde_json::to_value(&steps)
            .map_err(|err| OrchestratorError::Validation(err.to_string()))?);
        active.update(self.db).await?;
        Ok(())
    }

    async fn require_job(&self, job_id: Uuid) -> Result<JobModel, OrchestratorError> {
        self.get_job(job_id).await?.ok_or_else(|| {
            OrchestratorError::Validation(format!("job {} does not exist", job_id))
        })
    }
}
