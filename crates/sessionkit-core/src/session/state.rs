use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ApiError;
use crate::models::UserIdentity;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle phase of the client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Initializing,
    Restoring,
    Unauthenticated,
    Loading,
    Authenticated,
}

impl SessionStatus {
    /// Whether `self -> next` is an expected transition.
    ///
    /// Anything may fall back to `Unauthenticated`. `Authenticated` may be
    /// re-entered when the identity is replaced, or left for `Loading` on a
    /// re-login.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (_, Unauthenticated)
                | (Initializing, Restoring)
                | (Restoring, Authenticated)
                | (Unauthenticated, Loading)
                | (Loading, Authenticated)
                | (Authenticated, Authenticated)
                | (Authenticated, Loading)
        )
    }

    /// Still working towards a definitive answer
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            SessionStatus::Initializing | SessionStatus::Restoring | SessionStatus::Loading
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::Restoring => "restoring",
            SessionStatus::Unauthenticated => "unauthenticated",
            SessionStatus::Loading => "loading",
            SessionStatus::Authenticated => "authenticated",
        }
    }
}

/// Session state; the identity exists only while authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Restoring,
    Unauthenticated,
    Loading,
    Authenticated(Arc<UserIdentity>),
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Initializing => SessionStatus::Initializing,
            SessionState::Restoring => SessionStatus::Restoring,
            SessionState::Unauthenticated => SessionStatus::Unauthenticated,
            SessionState::Loading => SessionStatus::Loading,
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
        }
    }

    pub fn user(&self) -> Option<&Arc<UserIdentity>> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    InvalidCredentials,
    EmailAlreadyExists,
    ValidationError,
    Unauthorized,
    TokenExpired,
    RefreshTokenExpired,
    NetworkError,
    Timeout,
    Unknown,
}

/// Typed failure recorded on the session snapshot and returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[error("{message}")]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_signed_in() -> Self {
        Self::new(AuthErrorCode::Unauthorized, "Not signed in")
    }

    pub fn session_expired() -> Self {
        Self::new(
            AuthErrorCode::Unauthorized,
            "Session expired, please sign in again",
        )
    }

    /// Login failures: any rejection of the credentials reads as
    /// `InvalidCredentials`.
    pub fn from_login(error: &ApiError) -> Self {
        match error {
            ApiError::Unauthorized | ApiError::AccessDenied(_) => Self::new(
                AuthErrorCode::InvalidCredentials,
                error
                    .server_message()
                    .and_then(non_empty)
                    .unwrap_or("Invalid email or password"),
            ),
            _ => Self::from_api(error),
        }
    }

    /// Registration failures: a conflict means the email is taken.
    pub fn from_register(error: &ApiError) -> Self {
        match error {
            ApiError::Conflict(message) => Self::new(
                AuthErrorCode::EmailAlreadyExists,
                non_empty(message).unwrap_or("An account with this email already exists"),
            ),
            _ => Self::from_api(error),
        }
    }

    pub fn from_api(error: &ApiError) -> Self {
        let code = match error {
            ApiError::Unauthorized => AuthErrorCode::Unauthorized,
            ApiError::Validation(_) | ApiError::Conflict(_) => AuthErrorCode::ValidationError,
            ApiError::Timeout => AuthErrorCode::Timeout,
            ApiError::NetworkError(_) => AuthErrorCode::NetworkError,
            ApiError::RefreshFailed(_) => AuthErrorCode::RefreshTokenExpired,
            _ => AuthErrorCode::Unknown,
        };
        let message = match error.server_message().and_then(non_empty) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        };
        Self::new(code, message)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.trim().is_empty()).then_some(s)
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of the session published to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub error: Option<AuthError>,
}

impl SessionSnapshot {
    pub fn initial() -> Self {
        Self {
            state: SessionState::Initializing,
            error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn user(&self) -> Option<&Arc<UserIdentity>> {
        self.state.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.status() == SessionStatus::Loading
    }

    pub fn is_initializing(&self) -> bool {
        matches!(
            self.status(),
            SessionStatus::Initializing | SessionStatus::Restoring
        )
    }

    pub fn is_pending(&self) -> bool {
        self.status().is_pending()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            status: self.status(),
            user: self.user().map(|u| u.as_ref().clone()),
            error: self.error.clone(),
        }
    }
}

/// Serializable form of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionSummary {
    pub status: SessionStatus,
    pub user: Option<UserIdentity>,
    pub error: Option<AuthError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;
        assert!(Initializing.can_transition_to(Restoring));
        assert!(Initializing.can_transition_to(Unauthenticated));
        assert!(Restoring.can_transition_to(Authenticated));
        assert!(Unauthenticated.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Authenticated));
        assert!(Authenticated.can_transition_to(Authenticated));
        assert!(Authenticated.can_transition_to(Loading));

        assert!(!Unauthenticated.can_transition_to(Authenticated));
        assert!(!Unauthenticated.can_transition_to(Restoring));
        assert!(!Loading.can_transition_to(Restoring));
        assert!(!Authenticated.can_transition_to(Initializing));
    }

    #[test]
    fn test_pending_statuses() {
        assert!(SessionStatus::Initializing.is_pending());
        assert!(SessionStatus::Restoring.is_pending());
        assert!(SessionStatus::Loading.is_pending());
        assert!(!SessionStatus::Authenticated.is_pending());
        assert!(!SessionStatus::Unauthenticated.is_pending());
    }

    #[test]
    fn test_login_error_mapping() {
        let err = AuthError::from_login(&ApiError::Unauthorized);
        assert_eq!(err.code, AuthErrorCode::InvalidCredentials);
        assert_eq!(err.message, "Invalid email or password");

        let err = AuthError::from_login(&ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"message":["email must be an email"]}"#,
        ));
        assert_eq!(err.code, AuthErrorCode::ValidationError);
        assert_eq!(err.message, "email must be an email");

        let err = AuthError::from_login(&ApiError::Timeout);
        assert_eq!(err.code, AuthErrorCode::Timeout);

        let err = AuthError::from_login(&ApiError::ServerError("boom".to_string()));
        assert_eq!(err.code, AuthErrorCode::Unknown);
    }

    #[test]
    fn test_register_conflict_maps_to_email_exists() {
        let err = AuthError::from_register(&ApiError::Conflict(String::new()));
        assert_eq!(err.code, AuthErrorCode::EmailAlreadyExists);
        assert_eq!(err.message, "An account with this email already exists");
    }

    #[test]
    fn test_error_serializes_screaming_snake_code() {
        let err = AuthError::new(AuthErrorCode::InvalidCredentials, "nope");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "INVALID_CREDENTIALS");
        assert_eq!(json["message"], "nope");
    }

    #[test]
    fn test_snapshot_summary() {
        let snapshot = SessionSnapshot::initial();
        assert!(snapshot.is_initializing());
        assert_eq!(snapshot.summary().status, SessionStatus::Initializing);
        assert!(snapshot.summary().user.is_none());
    }
}
