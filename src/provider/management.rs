//! Database management API client
//!
//! Reqwest client for the remote management service that creates isolated
//! tenant databases, reports their readiness, hands out access credentials,
//! and executes SQL remotely.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AppConfig;
use crate::error::OrchestratorError;
use crate::provider::{DatabaseHost, InstanceKeys, InstanceState, NewInstance};

const SERVICE: &str = "management";

/// Client for the database management API.
#[derive(Clone)]
pub struct ManagementClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    organization_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateInstanceRequest<'a> {
    name: &'a str,
    organization_id: &'a str,
    region: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct InstanceStatusResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

impl ManagementClient {
    /// Build a client from configuration. Credentials may be absent in
    /// local/test profiles; every call checks them and fails fast with a
    /// configuration error when missing.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.management_api_url.trim_end_matches('/').to_string(),
            token: config.management_api_token.clone(),
            organization_id: config.organization_id.clone(),
        }
    }

    fn token(&self) -> Result<&str, OrchestratorError> {
        self.token.as_deref().ok_or_else(|| {
            OrchestratorError::Configuration(
                "management API token is not configured".to_string(),
            )
        })
    }

    fn organization_id(&self) -> Result<&str, OrchestratorError> {
        self.organization_id.as_deref().ok_or_else(|| {
            OrchestratorError::Configuration(
                "organization identifier is not configured".to_string(),
            )
        })
    }

    async fn check_response(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, OrchestratorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.ok();
        Err(OrchestratorError::upstream(SERVICE, status.as_u16(), body))
    }

    fn transport(err: reqwest::Error) -> OrchestratorError {
        OrchestratorError::Transport {
            service: SERVICE.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl DatabaseHost for ManagementClient {
    async fn create_instance(
        &self,
        name: &str,
        region: &str,
        password: &str,
    ) -> Result<NewInstance, OrchestratorError> {
        let token = self.token()?;
        let organization_id = self.organization_id()?;

        debug!(%name, %region, "Creating isolated database instance");

        let response = self
            .http
            .post(format!("{}/v1/databases", self.base_url))
            .bearer_auth(token)
            .json(&CreateInstanceRequest {
                name,
                organization_id,
                region,
                password,
            })
            .send()
            .await
            .map_err(Self::transport)?;

        let response = Self::check_response(response).await?;
        response.json::<NewInstance>().await.map_err(Self::transport)
    }

    async fn instance_state(&self, reference: &str) -> Result<InstanceState, OrchestratorError> {
        let token = self.token()?;

        let response = self
            .http
            .get(format!("{}/v1/databases/{}", self.base_url, reference))
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::transport)?;

        let response = Self::check_response(response).await?;
        let status: InstanceStatusResponse =
            response.json().await.map_err(Self::transport)?;

        Ok(match status.status.as_str() {
            "ready" => InstanceState::Ready,
            "failed" | "removed" => InstanceState::Failed(
                status
                    .message
                    .unwrap_or_else(|| format!("provider reported status '{}'", status.status)),
            ),
            _ => InstanceState::Provisioning,
        })
    }

    async fn instance_keys(&self, reference: &str) -> Result<InstanceKeys, OrchestratorError> {
        let token = self.token()?;

        let response = self
            .http
            .get(format!(
                "{}/v1/databases/{}/credentials",
                self.base_url, reference
            ))
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::transport)?;

        let response = Self::check_response(response).await?;
        response.json::<InstanceKeys>().await.map_err(Self::transport)
    }

    async fn execute_sql(&self, reference: &str, sql: &str) -> Result<(), OrchestratorError> {
        let token = self.token()?;

        let response = self
            .http
            .post(format!(
                "{}/v1/databases/{}/query",
                self.base_url, reference
            ))
            .bearer_auth(token)
            .json(&QueryRequest { query: sql })
            .send()
            .await
            .map_err(Self::transport)?;

        Self::check_response(response).await.map(|_| ())
    }
}
