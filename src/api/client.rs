use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::session::state::{Credentials, Role, User};

/// Successful authentication payload from the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Registration payload sent to the backend. The role is already normalized
/// by the time this is built.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
struct VerifyEnvelope {
    user: User,
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    data: User,
}

// Error body shapes the backend is known to produce
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Client for the remote auth API.
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /auth/login`: direct backend password check.
    pub async fn login(&self, credentials: &Credentials) -> SessionResult<AuthResponse> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(credentials)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// `POST /auth/register`
    pub async fn register(&self, request: &RegisterRequest) -> SessionResult<AuthResponse> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// `POST /auth/google-login`: exchange a federated identity token for a
    /// backend session.
    pub async fn google_login(&self, id_token: &str) -> SessionResult<AuthResponse> {
        let response = self
            .http
            .post(self.url("/auth/google-login"))
            .json(&json!({ "idToken": id_token }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// `POST /auth/logout`
    pub async fn logout(&self, token: &str) -> SessionResult<()> {
        let response = self
            .http
            .post(self.url("/auth/logout"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::expect_success(response).await
    }

    /// `GET /auth/verify-token`: validate a stored token. Returns the
    /// canonical user it was issued for.
    pub async fn verify_token(&self, token: &str) -> SessionResult<User> {
        let response = self
            .http
            .get(self.url("/auth/verify-token"))
            .bearer_auth(token)
            .send()
            .await?;
        let envelope: VerifyEnvelope = Self::parse(response).await?;
        Ok(envelope.user)
    }

    /// `GET /users/profile`
    pub async fn get_profile(&self, token: &str) -> SessionResult<User> {
        let response = self
            .http
            .get(self.url("/users/profile"))
            .bearer_auth(token)
            .send()
            .await?;
        let envelope: ProfileEnvelope = Self::parse(response).await?;
        Ok(envelope.data)
    }

    /// `POST /auth/forgot-password`. The backend answers success-shaped
    /// either way; a non-success status here means transport or server
    /// trouble, not "unknown email".
    pub async fn forgot_password(&self, email: &str) -> SessionResult<()> {
        let response = self
            .http
            .post(self.url("/auth/forgot-password"))
            .json(&json!({ "email": email }))
            .send()
            .await?;
        Self::expect_success(response).await
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: Response) -> SessionResult<T> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(response.json::<T>().await?)
    }

    async fn expect_success(response: Response) -> SessionResult<()> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }

    async fn error_from(response: Response) -> SessionError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.message.or(parsed.error))
            .unwrap_or_else(|| {
                if body.is_empty() {
                    "Unknown error".to_string()
                } else {
                    body.clone()
                }
            });

        debug!(status = status, message = %message, "API request failed");

        SessionError::Api { status, message }
    }
}
