use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod google;

pub use google::GoogleIdentityProvider;

/// Opaque identity token issued by a federated provider, exchanged with the
/// backend for a session token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityToken(<redacted>)")
    }
}

/// Prompt returned when an interactive federated sign-in starts: the user
/// must visit the URI and enter the code before the flow can complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedPrompt {
    /// Identifier used to poll the flow.
    pub flow_id: String,
    /// URL to visit to approve the sign-in.
    pub verification_uri: String,
    /// Code to enter on the verification page.
    pub user_code: String,
    /// Seconds until the flow expires.
    pub expires_in: u64,
    /// Seconds to wait between polling attempts.
    pub poll_interval: u64,
}

/// Status of an in-flight federated sign-in flow.
#[derive(Debug, Clone)]
pub enum FederatedFlowStatus {
    /// Still waiting for the user to approve.
    Pending,
    /// Approved; the provider issued an identity token.
    Completed { token: IdentityToken },
    /// The flow expired before approval.
    Expired,
    Failed { reason: String },
}

/// Credential flows a federated identity provider exposes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Password sign-in against the provider's own account database.
    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityToken>;

    /// Provision a provider account for a new user.
    async fn sign_up(&self, email: &str, password: &str) -> Result<IdentityToken>;

    /// Start an interactive federated sign-in.
    async fn begin_federated(&self) -> Result<FederatedPrompt>;

    /// Poll an in-flight federated flow for completion.
    async fn poll_federated(&self, flow_id: &str) -> Result<FederatedFlowStatus>;

    /// Best-effort provider sign-out.
    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}
