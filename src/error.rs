use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for session operations.
///
/// `Authentication` and `Registration` are the only variants meant for the
/// presentation layer to show verbatim; everything else is either swallowed
/// by the manager (logout, refresh, reconciliation) or indicates a local
/// fault rather than a credential problem.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("Registration failed: {reason}")]
    Registration { reason: String },

    /// Stored token rejected by backend verification. Triggers a forced
    /// logout during reconciliation; never surfaced to the caller.
    #[error("Stored session rejected by the backend: {reason}")]
    SessionInvalid { reason: String },

    #[error("Identity provider error: {reason}")]
    Provider { reason: String },

    #[error("API request failed: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Session storage error: {reason}")]
    Storage { reason: String },

    #[error("Failed to serialize session data: {reason}")]
    Serialization { reason: String },

    #[error("Required configuration key '{key}' is missing")]
    ConfigMissing { key: String },
}

/// Error codes for programmatic handling in the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AuthenticationFailed,
    RegistrationFailed,
    SessionInvalid,
    ProviderFailed,
    ApiRequestFailed,
    NetworkFailure,
    StorageFailed,
    SerializationFailed,
    ConfigMissing,
}

impl SessionError {
    /// Stable code for this error, independent of the message text.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Authentication { .. } => ErrorCode::AuthenticationFailed,
            SessionError::Registration { .. } => ErrorCode::RegistrationFailed,
            SessionError::SessionInvalid { .. } => ErrorCode::SessionInvalid,
            SessionError::Provider { .. } => ErrorCode::ProviderFailed,
            SessionError::Api { .. } => ErrorCode::ApiRequestFailed,
            SessionError::Network { .. } => ErrorCode::NetworkFailure,
            SessionError::Storage { .. } => ErrorCode::StorageFailed,
            SessionError::Serialization { .. } => ErrorCode::SerializationFailed,
            SessionError::ConfigMissing { .. } => ErrorCode::ConfigMissing,
        }
    }

    /// Whether the presentation layer should display this error to the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SessionError::Authentication { .. } | SessionError::Registration { .. }
        )
    }

    pub fn authentication(reason: impl Into<String>) -> Self {
        SessionError::Authentication {
            reason: reason.into(),
        }
    }

    pub fn registration(reason: impl Into<String>) -> Self {
        SessionError::Registration {
            reason: reason.into(),
        }
    }

    pub fn provider(reason: impl Into<String>) -> Self {
        SessionError::Provider {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        SessionError::Storage {
            reason: reason.into(),
        }
    }

    /// Human-readable reason without the variant prefix, suitable for
    /// re-wrapping into a more specific variant at the operation boundary.
    pub fn reason(&self) -> String {
        match self {
            SessionError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SessionError::Serialization {
                reason: err.to_string(),
            }
        } else {
            SessionError::Network {
                reason: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Storage {
            reason: err.to_string(),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
