//! Request and response bodies for the `/auth/*` endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::user::{UserIdentity, UserPayload};

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Default, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

/// Credential material issued by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(rename = "expiresIn", default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in,
        }
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Login and register responses come in two shapes depending on the
/// backend version: tokens nested under `tokens`, or flattened beside `user`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum LoginPayload {
    Nested {
        user: UserPayload,
        tokens: AuthTokens,
    },
    Flat {
        user: UserPayload,
        #[serde(flatten)]
        tokens: AuthTokens,
    },
}

/// A freshly established session: who logged in and the credential issued.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: UserIdentity,
    pub tokens: AuthTokens,
}

impl From<LoginPayload> for AuthSession {
    fn from(payload: LoginPayload) -> Self {
        match payload {
            LoginPayload::Nested { user, tokens } | LoginPayload::Flat { user, tokens } => Self {
                user: user.into(),
                tokens,
            },
        }
    }
}

#[derive(Serialize)]
pub(crate) struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RefreshPayload {
    Nested { tokens: AuthTokens },
    Flat(AuthTokens),
}

impl From<RefreshPayload> for AuthTokens {
    fn from(payload: RefreshPayload) -> Self {
        match payload {
            RefreshPayload::Nested { tokens } | RefreshPayload::Flat(tokens) => tokens,
        }
    }
}

/// Generic acknowledgement body: `{message, success}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub success: bool,
}

#[derive(Clone, Serialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "currentPassword")]
    pub current_password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangePasswordRequest { .. }")
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PasswordResetRequest<'a> {
    pub email: &'a str,
}

#[derive(Clone, Serialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

impl fmt::Debug for PasswordResetConfirmRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordResetConfirmRequest { .. }")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyEmailPayload {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<UserPayload>,
}

#[derive(Debug, Clone)]
pub struct VerifyEmailResponse {
    pub message: String,
    pub success: bool,
    pub user: Option<UserIdentity>,
}

impl From<VerifyEmailPayload> for VerifyEmailResponse {
    fn from(p: VerifyEmailPayload) -> Self {
        Self {
            message: p.message,
            success: p.success,
            user: p.user.map(UserIdentity::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_login_response() {
        let json = r#"{"accessToken":"abc","user":{"id":"1","email":"a@b.com"}}"#;
        let payload: LoginPayload = serde_json::from_str(json).unwrap();
        let session = AuthSession::from(payload);
        assert_eq!(session.tokens.access_token, "abc");
        assert_eq!(session.tokens.expires_in, None);
        assert_eq!(session.user.email, "a@b.com");
    }

    #[test]
    fn test_parse_nested_login_response() {
        let json = r#"{"user":{"id":"1","email":"a@b.com"},"tokens":{"accessToken":"xyz","expiresIn":900,"refreshToken":"r1"}}"#;
        let payload: LoginPayload = serde_json::from_str(json).unwrap();
        let session = AuthSession::from(payload);
        assert_eq!(session.tokens.access_token, "xyz");
        assert_eq!(session.tokens.expires_in, Some(900));
        assert_eq!(session.tokens.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn test_parse_refresh_response_shapes() {
        let flat: RefreshPayload =
            serde_json::from_str(r#"{"accessToken":"t1","expiresIn":60}"#).unwrap();
        let nested: RefreshPayload =
            serde_json::from_str(r#"{"tokens":{"accessToken":"t2"}}"#).unwrap();

        assert_eq!(AuthTokens::from(flat), AuthTokens::new("t1", Some(60)));
        assert_eq!(AuthTokens::from(nested), AuthTokens::new("t2", None));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let req = LoginRequest::new("a@b.com", "hunter2");
        let tokens = AuthTokens::new("secret-token", Some(60));
        assert!(!format!("{:?}", req).contains("hunter2"));
        assert!(!format!("{:?}", tokens).contains("secret-token"));
    }

    #[test]
    fn test_register_request_omits_empty_profile() {
        let req = RegisterRequest {
            email: "a@b.com".to_string(),
            password: "pw".to_string(),
            first_name: Some("Ann".to_string()),
            last_name: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"email": "a@b.com", "password": "pw", "firstName": "Ann"})
        );
    }
}
