use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::providers::{
    FederatedFlowStatus, FederatedPrompt, IdentityProvider, IdentityToken,
};

// Google Identity Toolkit (password flows) and OAuth device flow endpoints
const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEVICE_CODE_URL: &str = "https://oauth2.googleapis.com/device/code";
const DEVICE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEVICE_SCOPES: &str = "openid email profile";

// Response from the Identity Toolkit password endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordFlowResponse {
    id_token: String,
    #[allow(dead_code)]
    email: Option<String>,
}

// Error envelope from the Identity Toolkit
#[derive(Debug, Clone, Deserialize)]
struct IdentityErrorBody {
    error: IdentityErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentityErrorDetail {
    message: String,
}

// Response from the device code endpoint
#[derive(Debug, Clone, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_uri")]
    verification_url: String,
    expires_in: u64,
    interval: u64,
}

// Response from polling the token endpoint
#[derive(Debug, Clone, Deserialize)]
struct DeviceTokenResponse {
    id_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DeviceTokenError {
    error: String,
}

// Active device flow awaiting user approval
#[derive(Debug, Clone)]
struct DeviceFlow {
    device_code: String,
    expires_at: DateTime<Utc>,
}

/// Google-backed identity provider.
///
/// Password flows go through the Identity Toolkit; interactive federated
/// sign-in uses the OAuth device flow, the analog of a browser popup for a
/// client without one.
pub struct GoogleIdentityProvider {
    client: Client,
    api_key: Option<String>,
    oauth_client_id: Option<String>,
    identity_url: String,
    device_code_url: String,
    device_token_url: String,
    active_flows: Arc<RwLock<HashMap<String, DeviceFlow>>>,
}

impl GoogleIdentityProvider {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: None,
            oauth_client_id: None,
            identity_url: IDENTITY_TOOLKIT_URL.to_string(),
            device_code_url: DEVICE_CODE_URL.to_string(),
            device_token_url: DEVICE_TOKEN_URL.to_string(),
            active_flows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Set the Identity Toolkit API key directly instead of reading the
    /// environment.
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Set the OAuth client id directly instead of reading the environment.
    pub fn with_oauth_client_id(mut self, client_id: &str) -> Self {
        self.oauth_client_id = Some(client_id.to_string());
        self
    }

    /// Point all endpoints at a different host (for tests).
    pub fn with_endpoints(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.identity_url = base.to_string();
        self.device_code_url = format!("{}/device/code", base);
        self.device_token_url = format!("{}/token", base);
        self
    }

    fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        match env::var("GOOGLE_IDENTITY_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(anyhow!("GOOGLE_IDENTITY_API_KEY environment variable not set")),
        }
    }

    fn oauth_client_id(&self) -> Result<String> {
        if let Some(id) = &self.oauth_client_id {
            return Ok(id.clone());
        }
        match env::var("GOOGLE_OAUTH_CLIENT_ID") {
            Ok(id) if !id.is_empty() => Ok(id),
            _ => Err(anyhow!("GOOGLE_OAUTH_CLIENT_ID environment variable not set")),
        }
    }

    /// Shared password flow against an Identity Toolkit endpoint.
    async fn password_flow(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<IdentityToken> {
        let api_key = self.api_key()?;
        let url = format!("{}/accounts:{}", self.identity_url, endpoint);

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await
            .with_context(|| format!("Failed to call {}", endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<IdentityErrorBody>(&error_text)
                .map(|body| body.error.message)
                .unwrap_or(error_text);
            return Err(anyhow!("{} failed: HTTP {}: {}", endpoint, status, message));
        }

        let payload = response
            .json::<PasswordFlowResponse>()
            .await
            .with_context(|| format!("Failed to parse {} response", endpoint))?;

        debug!(endpoint = endpoint, "Identity provider issued a token");

        Ok(IdentityToken::new(payload.id_token))
    }

    async fn poll_device_token(&self, device_code: &str) -> Result<FederatedFlowStatus> {
        let client_id = self.oauth_client_id()?;

        let params = [
            ("client_id", client_id.as_str()),
            ("device_code", device_code),
            ("grant_type", DEVICE_GRANT_TYPE),
        ];

        let response = self
            .client
            .post(&self.device_token_url)
            .form(&params)
            .send()
            .await
            .context("Failed to poll for identity token")?;

        match response.status() {
            StatusCode::OK => {
                let payload = response
                    .json::<DeviceTokenResponse>()
                    .await
                    .context("Failed to parse token response")?;
                match payload.id_token {
                    Some(id_token) => Ok(FederatedFlowStatus::Completed {
                        token: IdentityToken::new(id_token),
                    }),
                    None => Ok(FederatedFlowStatus::Failed {
                        reason: "Token response carried no identity token".to_string(),
                    }),
                }
            }
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                let code = serde_json::from_str::<DeviceTokenError>(&error_text)
                    .map(|body| body.error)
                    .unwrap_or_else(|_| error_text.clone());
                match code.as_str() {
                    "authorization_pending" | "slow_down" => Ok(FederatedFlowStatus::Pending),
                    "expired_token" => Ok(FederatedFlowStatus::Expired),
                    "access_denied" => Ok(FederatedFlowStatus::Failed {
                        reason: "User declined the sign-in request".to_string(),
                    }),
                    _ => Ok(FederatedFlowStatus::Failed {
                        reason: format!("HTTP {}: {}", status, code),
                    }),
                }
            }
        }
    }
}

impl Default for GoogleIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityToken> {
        self.password_flow("signInWithPassword", email, password)
            .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<IdentityToken> {
        self.password_flow("signUp", email, password).await
    }

    async fn begin_federated(&self) -> Result<FederatedPrompt> {
        let client_id = self.oauth_client_id()?;

        let params = [
            ("client_id", client_id.as_str()),
            ("scope", DEVICE_SCOPES),
        ];

        let response = self
            .client
            .post(&self.device_code_url)
            .form(&params)
            .send()
            .await
            .context("Failed to request device code")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Failed to start federated sign-in: HTTP {}: {}",
                status,
                error_text
            ));
        }

        let device = response
            .json::<DeviceCodeResponse>()
            .await
            .context("Failed to parse device code response")?;

        let flow_id = uuid::Uuid::new_v4().to_string();
        let expires_at = Utc::now() + chrono::Duration::seconds(device.expires_in as i64);

        self.active_flows.write().await.insert(
            flow_id.clone(),
            DeviceFlow {
                device_code: device.device_code,
                expires_at,
            },
        );

        debug!(
            user_code = %device.user_code,
            verification_url = %device.verification_url,
            expires_in = device.expires_in,
            "Started federated sign-in flow"
        );

        Ok(FederatedPrompt {
            flow_id,
            verification_uri: device.verification_url,
            user_code: device.user_code,
            expires_in: device.expires_in,
            poll_interval: device.interval,
        })
    }

    async fn poll_federated(&self, flow_id: &str) -> Result<FederatedFlowStatus> {
        let flow = {
            let flows = self.active_flows.read().await;
            match flows.get(flow_id) {
                Some(flow) => flow.clone(),
                None => return Err(anyhow!("No active flow with ID {}", flow_id)),
            }
        };

        if Utc::now() > flow.expires_at {
            self.active_flows.write().await.remove(flow_id);
            return Ok(FederatedFlowStatus::Expired);
        }

        let status = self.poll_device_token(&flow.device_code).await?;

        match &status {
            FederatedFlowStatus::Completed { .. } => {
                self.active_flows.write().await.remove(flow_id);
            }
            FederatedFlowStatus::Expired => {
                self.active_flows.write().await.remove(flow_id);
            }
            _ => {}
        }

        Ok(status)
    }

    async fn sign_out(&self) -> Result<()> {
        // Google password sessions are stateless on the client; dropping any
        // in-flight flows is all there is to do.
        self.active_flows.write().await.clear();
        debug!("Identity provider signed out");
        Ok(())
    }
}
