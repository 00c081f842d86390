use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Lawyer,
    Client,
}

impl Role {
    /// Coerce a free-form role string into a known role.
    ///
    /// Anything other than the exact strings "lawyer" and "client" maps to
    /// `Client`, matching the backend's registration contract.
    pub fn normalize(raw: &str) -> Role {
        match raw {
            "lawyer" => Role::Lawyer,
            _ => Role::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Lawyer => "lawyer",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical user record.
///
/// Owned by the session: constructed only from backend payloads and read by
/// the rest of the application through the session manager's accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Transient credentials for a single authentication attempt.
///
/// Never persisted; the password is masked in debug output.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration input. `role` is free-form here; the manager normalizes it
/// before the backend ever sees it.
#[derive(Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Session lifecycle state.
///
/// The optimistic phase exists so the UI can render the remembered user
/// immediately while startup reconciliation is still verifying the stored
/// token with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionState {
    /// Process start, before reconciliation has completed.
    Loading,

    /// Persisted user surfaced for immediate display; the stored token is
    /// still being verified.
    OptimisticallyAuthenticated { user: User },

    /// Verified session: the token was issued for this user.
    Authenticated { user: User, token: String },

    Unauthenticated,
}

impl SessionState {
    /// Coarse status for UI consumers. The optimistic phase reports
    /// `Loading`: do not redirect until reconciliation completes.
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Loading | SessionState::OptimisticallyAuthenticated { .. } => {
                SessionStatus::Loading
            }
            SessionState::Authenticated { .. } => SessionStatus::Authenticated,
            SessionState::Unauthenticated => SessionStatus::Unauthenticated,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::OptimisticallyAuthenticated { user }
            | SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

/// Coarse session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Events published by the session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session state transitioned.
    StateChanged { state: SessionState },

    /// Interactive federated sign-in needs the user to visit a URL and enter
    /// a code.
    FederatedPromptReady {
        verification_uri: String,
        user_code: String,
        expires_in_secs: u64,
    },

    /// Stored session was rejected during reconciliation and cleared.
    SessionInvalidated { reason: String },

    /// Profile re-fetched from the backend.
    ProfileRefreshed { user: User },
}
