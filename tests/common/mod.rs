#![allow(dead_code)]

use std::sync::{Mutex, Once};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use counsel_session::session::providers::{
    FederatedFlowStatus, FederatedPrompt, IdentityProvider, IdentityToken,
};
use counsel_session::{ApiClient, MemorySessionStore, Role, SessionManager, User};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Scripted identity provider: each flow either yields a fixed token or
/// fails with a fixed reason, and every call is recorded.
pub struct StubIdentityProvider {
    sign_in: Result<String, String>,
    sign_up: Result<String, String>,
    federated: Result<String, String>,
    calls: Mutex<Vec<&'static str>>,
}

impl StubIdentityProvider {
    pub fn succeeding(token: &str) -> Arc<Self> {
        Arc::new(Self {
            sign_in: Ok(token.to_string()),
            sign_up: Ok(token.to_string()),
            federated: Ok(token.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            sign_in: Err(reason.to_string()),
            sign_up: Err(reason.to_string()),
            federated: Err(reason.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// All flows succeed except provider account provisioning.
    pub fn with_failing_sign_up(token: &str, reason: &str) -> Arc<Self> {
        Arc::new(Self {
            sign_in: Ok(token.to_string()),
            sign_up: Err(reason.to_string()),
            federated: Ok(token.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IdentityProvider for StubIdentityProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<IdentityToken> {
        self.record("sign_in");
        match &self.sign_in {
            Ok(token) => Ok(IdentityToken::new(token.clone())),
            Err(reason) => Err(anyhow!("{}", reason)),
        }
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<IdentityToken> {
        self.record("sign_up");
        match &self.sign_up {
            Ok(token) => Ok(IdentityToken::new(token.clone())),
            Err(reason) => Err(anyhow!("{}", reason)),
        }
    }

    async fn begin_federated(&self) -> Result<FederatedPrompt> {
        self.record("begin_federated");
        match &self.federated {
            Ok(_) => Ok(FederatedPrompt {
                flow_id: "stub-flow".to_string(),
                verification_uri: "https://example.com/activate".to_string(),
                user_code: "WDJB-MJHT".to_string(),
                expires_in: 60,
                poll_interval: 0,
            }),
            Err(reason) => Err(anyhow!("{}", reason)),
        }
    }

    async fn poll_federated(&self, _flow_id: &str) -> Result<FederatedFlowStatus> {
        self.record("poll_federated");
        match &self.federated {
            Ok(token) => Ok(FederatedFlowStatus::Completed {
                token: IdentityToken::new(token.clone()),
            }),
            Err(reason) => Ok(FederatedFlowStatus::Failed {
                reason: reason.clone(),
            }),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.record("sign_out");
        Ok(())
    }
}

/// Manager wired to a mockito backend and an in-memory store.
pub fn manager_with(
    server: &mockito::ServerGuard,
    provider: Arc<StubIdentityProvider>,
) -> (Arc<SessionManager>, Arc<MemorySessionStore>) {
    init_tracing();
    let api = Arc::new(ApiClient::new(&server.url()));
    let store = Arc::new(MemorySessionStore::new());
    let manager = Arc::new(SessionManager::new(api, provider, store.clone()));
    (manager, store)
}

pub fn user_json(id: &str, name: &str, role: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "email": format!("{}@example.com", id),
        "role": role,
    })
}

pub fn auth_json(token: &str, id: &str, name: &str, role: &str) -> String {
    json!({ "token": token, "user": user_json(id, name, role) }).to_string()
}

pub fn sample_user(id: &str, name: &str) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", id),
        role: Role::Client,
    }
}
