use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, AuthResponse, RegisterRequest};
use crate::error::{SessionError, SessionResult};
use crate::events::{EventStream, Subscriber, EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER};
use crate::session::providers::{FederatedFlowStatus, IdentityProvider};
use crate::session::state::{Credentials, NewUser, Role, SessionEvent, SessionState, SessionStatus, User};
use crate::session::storage::SessionStore;

/// Single source of truth for "who is logged in".
///
/// Reconciles the durable local session copy with backend verification and
/// mediates two authentication strategies: password-based and
/// federated-identity-based. Constructed explicitly and passed to the
/// presentation layer; there is no ambient global instance.
pub struct SessionManager {
    api: Arc<ApiClient>,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn SessionStore>,
    state: RwLock<SessionState>,
    events: EventStream<SessionEvent>,
    reconciled: AtomicBool,
}

impl SessionManager {
    pub fn new(
        api: Arc<ApiClient>,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            api,
            provider,
            store,
            state: RwLock::new(SessionState::Loading),
            events: EventStream::new(EVENT_CHANNEL_CAPACITY, EVENT_REPLAY_BUFFER),
            reconciled: AtomicBool::new(false),
        }
    }

    /// Snapshot of the current session state.
    pub async fn session(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.user().cloned()
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token().map(str::to_string)
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> Subscriber<SessionEvent> {
        self.events.subscribe()
    }

    /// Startup reconciliation: validate the locally cached session against
    /// the backend. Runs once per process lifetime; later calls are no-ops.
    ///
    /// With no stored token the verify endpoint is never called. A rejected
    /// token silently demotes the session: an expired token is an expected
    /// condition, not an error to surface.
    pub async fn reconcile(&self) {
        if self.reconciled.swap(true, Ordering::SeqCst) {
            debug!("Reconciliation already ran, skipping");
            return;
        }

        let token = match self.store.load_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token");
                None
            }
        };

        let Some(token) = token else {
            // Any stale user copy is dropped without a backend round-trip.
            if let Err(e) = self.store.clear().await {
                warn!(error = %e, "Failed to clear persisted session");
            }
            self.set_state(SessionState::Unauthenticated).await;
            return;
        };

        // Surface the remembered user immediately; verification follows.
        match self.store.load_user().await {
            Ok(Some(user)) => {
                self.set_state(SessionState::OptimisticallyAuthenticated { user })
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read persisted user"),
        }

        match self.api.verify_token(&token).await {
            Ok(user) => {
                // The backend's copy wins over the optimistic one.
                if let Err(e) = self.store.store_user(&user).await {
                    warn!(error = %e, "Failed to persist verified user");
                }
                info!(user_id = %user.id, "Stored session verified");
                self.set_state(SessionState::Authenticated { user, token })
                    .await;
            }
            Err(e) => {
                let invalid = SessionError::SessionInvalid {
                    reason: e.reason(),
                };
                info!(error = %invalid, "Stored session rejected, forcing logout");
                self.events
                    .publish(SessionEvent::SessionInvalidated {
                        reason: invalid.reason(),
                    })
                    .await;
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to clear persisted session");
                }
                self.set_state(SessionState::Unauthenticated).await;
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// Tries the federated provider first and exchanges its identity token
    /// with the backend; on any failure of that branch, falls back to the
    /// backend's own password check with the same credentials. The fallback
    /// ordering is a guarantee: error messages differ by path, and the
    /// fallback's error is the one surfaced.
    pub async fn login(&self, email: &str, password: &str) -> SessionResult<User> {
        match self.federated_login(email, password).await {
            Ok(user) => Ok(user),
            Err(e) => {
                debug!(error = %e, "Federated sign-in failed, falling back to password login");
                let credentials = Credentials::new(email, password);
                let auth = self
                    .api
                    .login(&credentials)
                    .await
                    .map_err(|err| SessionError::authentication(err.reason()))?;
                self.complete_authentication(auth).await
            }
        }
    }

    /// First branch of [`login`](Self::login): provider password sign-in,
    /// then identity-token exchange with the backend.
    async fn federated_login(&self, email: &str, password: &str) -> SessionResult<User> {
        let id_token = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(|e| SessionError::provider(e.to_string()))?;
        let auth = self.api.google_login(id_token.as_str()).await?;
        self.complete_authentication(auth).await
    }

    /// Register a new account.
    ///
    /// The role is normalized before the backend sees it; provider account
    /// provisioning is best-effort because the backend account is canonical.
    pub async fn register(&self, new_user: NewUser) -> SessionResult<User> {
        let role = Role::normalize(&new_user.role);

        if let Err(e) = self
            .provider
            .sign_up(&new_user.email, &new_user.password)
            .await
        {
            warn!(error = %e, "Identity provider account provisioning failed");
        }

        let request = RegisterRequest {
            name: new_user.name,
            email: new_user.email,
            password: new_user.password,
            role,
        };
        let auth = self
            .api
            .register(&request)
            .await
            .map_err(|err| SessionError::registration(err.reason()))?;
        self.complete_authentication(auth).await
    }

    /// Interactive federated sign-in.
    ///
    /// Publishes the verification prompt as a [`SessionEvent`] and polls the
    /// provider until the user approves, then exchanges the identity token
    /// exactly like `login`'s first branch.
    pub async fn login_with_google(&self) -> SessionResult<User> {
        let prompt = self
            .provider
            .begin_federated()
            .await
            .map_err(|e| SessionError::authentication(e.to_string()))?;

        self.events
            .publish(SessionEvent::FederatedPromptReady {
                verification_uri: prompt.verification_uri.clone(),
                user_code: prompt.user_code.clone(),
                expires_in_secs: prompt.expires_in,
            })
            .await;

        let deadline = Instant::now() + Duration::from_secs(prompt.expires_in);
        let id_token = loop {
            let status = self
                .provider
                .poll_federated(&prompt.flow_id)
                .await
                .map_err(|e| SessionError::authentication(e.to_string()))?;

            match status {
                FederatedFlowStatus::Completed { token } => break token,
                FederatedFlowStatus::Pending => {
                    if Instant::now() >= deadline {
                        return Err(SessionError::authentication(
                            "Federated sign-in was not approved in time",
                        ));
                    }
                    sleep(Duration::from_secs(prompt.poll_interval)).await;
                }
                FederatedFlowStatus::Expired => {
                    return Err(SessionError::authentication(
                        "Federated sign-in expired before completion",
                    ));
                }
                FederatedFlowStatus::Failed { reason } => {
                    return Err(SessionError::authentication(reason));
                }
            }
        };

        let auth = self
            .api
            .google_login(id_token.as_str())
            .await
            .map_err(|err| SessionError::authentication(err.reason()))?;
        self.complete_authentication(auth).await
    }

    /// Sign out.
    ///
    /// Provider and backend sign-out are best-effort; whatever happens on
    /// the network, the persisted session is cleared and in-memory state is
    /// reset.
    pub async fn logout(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "Provider sign-out failed");
        }

        if let Some(token) = self.token().await {
            if let Err(e) = self.api.logout(&token).await {
                warn!(error = %e, "Backend logout failed");
            }
        }

        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear persisted session");
        }
        self.set_state(SessionState::Unauthenticated).await;
        info!("Signed out");
    }

    /// Re-fetch the canonical user profile and overwrite the local copy.
    ///
    /// Failures are logged and swallowed: the existing session stays intact,
    /// with no partial overwrite.
    pub async fn refresh_user(&self) {
        let Some(token) = self.token().await else {
            debug!("refresh_user called without an active session");
            return;
        };

        match self.api.get_profile(&token).await {
            Ok(user) => {
                if let Err(e) = self.store.store_user(&user).await {
                    warn!(error = %e, "Failed to persist refreshed user");
                }
                self.set_state(SessionState::Authenticated {
                    user: user.clone(),
                    token,
                })
                .await;
                self.events
                    .publish(SessionEvent::ProfileRefreshed { user })
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Profile refresh failed, keeping existing session");
            }
        }
    }

    /// Request a password-reset email.
    ///
    /// Always completes without error so callers cannot probe which email
    /// addresses are registered.
    pub async fn forgot_password(&self, email: &str) {
        if let Err(e) = self.api.forgot_password(email).await {
            warn!(error = %e, "Forgot-password request failed");
        }
    }

    /// Persist a fresh backend session and move to `Authenticated`.
    async fn complete_authentication(&self, auth: AuthResponse) -> SessionResult<User> {
        self.store
            .store_token(&auth.token)
            .await
            .map_err(|e| SessionError::storage(e.to_string()))?;
        self.store
            .store_user(&auth.user)
            .await
            .map_err(|e| SessionError::storage(e.to_string()))?;

        self.set_state(SessionState::Authenticated {
            user: auth.user.clone(),
            token: auth.token,
        })
        .await;

        Ok(auth.user)
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state.clone();
        self.events
            .publish(SessionEvent::StateChanged { state })
            .await;
    }
}
