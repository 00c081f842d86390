use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

// Export modules
pub mod api;
pub mod error;
pub mod events;
pub mod session;

pub use api::ApiClient;
pub use error::{ErrorCode, SessionError, SessionResult};
pub use session::{
    Credentials, FileSessionStore, GoogleIdentityProvider, IdentityProvider, MemorySessionStore,
    NewUser, Role, SessionEvent, SessionManager, SessionState, SessionStatus, SessionStore, User,
};

/// Default backend API root.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";
/// File name of the persisted session document.
pub const SESSION_FILE_NAME: &str = "counsel.session.json";

/// Configuration for the session layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend API configuration
    pub api: ApiConfig,
    /// Federated identity provider configuration
    pub identity: IdentityConfig,
    /// Session persistence configuration
    pub storage: StorageConfig,
}

/// Configuration for the backend API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Root URL of the auth API
    pub base_url: String,
}

/// Configuration for the federated identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Identity Toolkit API key
    pub api_key: Option<String>,
    /// OAuth client id for the interactive federated flow
    pub oauth_client_id: Option<String>,
}

/// Configuration for session persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the persisted session document
    pub session_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_file: default_session_file(),
        }
    }
}

fn default_session_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("counsel")
        .join(SESSION_FILE_NAME)
}

impl AppConfig {
    /// Load configuration, letting environment variables (and a `.env` file
    /// if present) override the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(url) = env::var("COUNSEL_API_URL") {
            if !url.is_empty() {
                config.api.base_url = url;
            }
        }
        if let Ok(key) = env::var("GOOGLE_IDENTITY_API_KEY") {
            if !key.is_empty() {
                config.identity.api_key = Some(key);
            }
        }
        if let Ok(id) = env::var("GOOGLE_OAUTH_CLIENT_ID") {
            if !id.is_empty() {
                config.identity.oauth_client_id = Some(id);
            }
        }
        if let Ok(path) = env::var("COUNSEL_SESSION_FILE") {
            if !path.is_empty() {
                config.storage.session_file = PathBuf::from(path);
            }
        }
        config
    }
}

/// Application state wiring the session manager to its collaborators.
///
/// The presentation layer receives this by dependency passing; nothing here
/// is a global.
pub struct AppState {
    /// The session manager, the single source of truth for "who is logged in"
    pub session: Arc<SessionManager>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        let api = Arc::new(ApiClient::new(&config.api.base_url));

        let mut provider = GoogleIdentityProvider::new();
        if let Some(key) = &config.identity.api_key {
            provider = provider.with_api_key(key);
        }
        if let Some(id) = &config.identity.oauth_client_id {
            provider = provider.with_oauth_client_id(id);
        }

        let store = Arc::new(FileSessionStore::new(&config.storage.session_file));
        let session = Arc::new(SessionManager::new(api, Arc::new(provider), store));

        Self { session }
    }

    /// Run startup reconciliation. Call once at process start; the UI should
    /// treat the session as `Loading` until this returns.
    pub async fn initialize(&self) {
        info!("Initializing session layer");
        self.session.reconcile().await;
    }
}
