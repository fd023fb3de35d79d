//! Hosting provider domain API client
//!
//! Manages subdomain attachments on the shared multi-tenant deployment. The
//! hosting integration is optional: in environments without credentials the
//! client reports itself unconfigured and the domain allocator records a
//! skipped step instead of failing provisioning.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::OrchestratorError;
use crate::provider::{AttachOutcome, DomainHost};

const SERVICE: &str = "hosting";

/// Client for the hosting provider's project-domain API.
#[derive(Clone)]
pub struct HostingClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    project: Option<String>,
}

#[derive(Debug, Serialize)]
struct AttachDomainRequest<'a> {
    name: &'a str,
}

impl HostingClient {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.hosting_api_url.trim_end_matches('/').to_string(),
            token: config.hosting_api_token.clone(),
            project: config.hosting_project.clone(),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), OrchestratorError> {
        match (self.token.as_deref(), self.project.as_deref()) {
            (Some(token), Some(project)) => Ok((token, project)),
            _ => Err(OrchestratorError::Configuration(
                "hosting provider credentials are not configured".to_string(),
            )),
        }
    }

    fn domain_url(&self, project: &str, hostname: &str) -> String {
        format!(
            "{}/v1/projects/{}/domains/{}",
            self.base_url, project, hostname
        )
    }

    fn transport(err: reqwest::Error) -> OrchestratorError {
        OrchestratorError::Transport {
            service: SERVICE.to_string(),
            message: err.to_string(),
        }
    }

    async fn upstream_from(response: reqwest::Response) -> OrchestratorError {
        let status = response.status().as_u16();
        let body = response.text().await.ok();
        OrchestratorError::upstream(SERVICE, status, body)
    }
}

#[async_trait]
impl DomainHost for HostingClient {
    fn is_configured(&self) -> bool {
        self.token.is_some() && self.project.is_some()
    }

    async fn domain_exists(&self, hostname: &str) -> Result<bool, OrchestratorError> {
        let (token, project) = self.credentials()?;

        let response = self
            .http
            .get(self.domain_url(project, hostname))
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::upstream_from(response).await),
        }
    }

    async fn attach_domain(&self, hostname: &str) -> Result<AttachOutcome, OrchestratorError> {
        let (token, project) = self.credentials()?;

        debug!(%hostname, "Attaching hostname to shared deployment");

        let response = self
            .http
            .post(format!(
                "{}/v1/projects/{}/domains",
                self.base_url, project
            ))
            .bearer_auth(token)
            .json(&AttachDomainRequest { name: hostname })
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            status if status.is_success() => {
                info!(%hostname, "Attached hostname");
                Ok(AttachOutcome::Attached)
            }
            // The provider rejects duplicates with a conflict; for our
            // purposes the hostname being attached is the desired end state.
            StatusCode::CONFLICT => {
                info!(%hostname, "Hostname already attached");
                Ok(AttachOutcome::AlreadyAttached)
            }
            _ => Err(Self::upstream_from(response).await),
        }
    }

    async fn detach_domain(&self, hostname: &str) -> Result<(), OrchestratorError> {
        let (token, project) = self.credentials()?;

        let response = self
            .http
            .delete(self.domain_url(project, hostname))
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // Already gone; detach is idempotent.
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::upstream_from(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HostingClient {
        let config = AppConfig {
            hosting_api_url: server.uri(),
            hosting_api_token: Some("host-token".to_string()),
            hosting_project: Some("storefronts".to_string()),
            ..Default::default()
        };
        HostingClient::from_config(&config)
    }

    #[tokio::test]
    async fn domain_exists_maps_200_and_404() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/projects/storefronts/domains/acme.sites.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "acme.sites.example.com"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/storefronts/domains/free.sites.example.com"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.domain_exists("acme.sites.example.com").await.unwrap());
        assert!(!client.domain_exists("free.sites.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn attach_conflict_is_treated_as_already_attached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/projects/storefronts/domains"))
            .and(body_partial_json(serde_json::json!({
                "name": "acme.sites.example.com"
            })))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let outcome = client.attach_domain("acme.sites.example.com").await.unwrap();
        assert_eq!(outcome, AttachOutcome::AlreadyAttached);
    }

    #[tokio::test]
    async fn detach_tolerates_missing_domain() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/projects/storefronts/domains/gone.sites.example.com"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.detach_domain("gone.sites.example.com").await.unwrap();
    }

    #[tokio::test]
    async fn server_error_surfaces_as_upstream() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/projects/storefronts/domains"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.attach_domain("x.sites.example.com").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Upstream { status: 502, .. }
        ));
    }

    #[tokio::test]
    async fn unconfigured_client_reports_itself() {
        let client = HostingClient::from_config(&AppConfig::default());
        assert!(!client.is_configured());

        let err = client.domain_exists("a.b.c").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }
}
