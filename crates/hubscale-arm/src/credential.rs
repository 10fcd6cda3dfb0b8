//! Client-credentials token acquisition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use hubscale_autoscale::{CredentialProvider, ResourceController};
use hubscale_core::CredentialsConfig;

use crate::client::ArmIotHubClient;
use crate::error::{ArmError, ArmResult};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Identity and management base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmEndpoints {
    pub authority: String,
    pub management: String,
}

impl Default for ArmEndpoints {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            management: "https://management.azure.com".to_string(),
        }
    }
}

impl ArmEndpoints {
    fn scope(&self) -> String {
        format!("{}/.default", self.management.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Application id + secret for one tenant and subscription.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    endpoints: ArmEndpoints,
    tenant_id: String,
    application_id: String,
    secret: String,
    subscription_id: String,
}

impl ClientSecretCredential {
    pub fn new(credentials: &CredentialsConfig, endpoints: ArmEndpoints) -> ArmResult<Self> {
        let secret = credentials
            .secret
            .clone()
            .ok_or(ArmError::MissingCredential("client secret"))?;
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoints,
            tenant_id: credentials.tenant_id.clone(),
            application_id: credentials.application_id.clone(),
            secret,
            subscription_id: credentials.subscription_id.clone(),
        })
    }

    /// Request a fresh bearer token for the management plane.
    pub async fn acquire_token(&self) -> ArmResult<String> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.endpoints.authority.trim_end_matches('/'),
            self.tenant_id
        );
        let scope = self.endpoints.scope();
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.application_id.as_str()),
            ("client_secret", self.secret.as_str()),
            ("scope", scope.as_str()),
        ];
        debug!(tenant_id = %self.tenant_id, "requesting management token");

        let response = self.http.post(&url).form(&form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "token request rejected");
            return Err(ArmError::Status {
                operation: "token request",
                status,
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(ArmError::Malformed("empty access_token".to_string()));
        }
        debug!(expires_in = ?token.expires_in, "management token acquired");
        Ok(token.access_token)
    }
}

#[async_trait]
impl CredentialProvider for ClientSecretCredential {
    async fn connect(&self) -> anyhow::Result<Arc<dyn ResourceController>> {
        let token = self.acquire_token().await?;
        Ok(Arc::new(ArmIotHubClient::new(
            self.http.clone(),
            &self.endpoints.management,
            &self.subscription_id,
            token,
        )))
    }
}
