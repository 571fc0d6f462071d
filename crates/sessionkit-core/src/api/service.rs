//! Typed calls for each authentication endpoint.

use reqwest::Method;
use serde::Serialize;

use super::client::{ApiClient, RequestOptions};
use super::ApiError;
use crate::models::{
    AuthSession, ChangePasswordRequest, LoginPayload, LoginRequest, MessageResponse,
    PasswordResetConfirmRequest, PasswordResetRequest, ProfileUpdate, RegisterRequest,
    UserIdentity, UserPayload, VerifyEmailPayload, VerifyEmailRequest, VerifyEmailResponse,
};

// ============================================================================
// Endpoints
// ============================================================================

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const LOGOUT_ALL_PATH: &str = "/auth/logout-all";
pub const ME_PATH: &str = "/auth/me";
pub const PROFILE_PATH: &str = "/auth/profile";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";
pub const PASSWORD_RESET_REQUEST_PATH: &str = "/auth/password-reset/request";
pub const PASSWORD_RESET_CONFIRM_PATH: &str = "/auth/password-reset/confirm";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";
pub const RESEND_VERIFICATION_PATH: &str = "/auth/verify-email/resend";

/// Authentication endpoints over a shared [`ApiClient`].
///
/// Login, register and logout never trigger a credential refresh: a 401
/// there means bad credentials or an already-dead session.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthSession, ApiError> {
        let payload: LoginPayload = self
            .api
            .request(Method::POST, LOGIN_PATH, Some(credentials), no_refresh())
            .await?;
        Ok(payload.into())
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<AuthSession, ApiError> {
        let payload: LoginPayload = self
            .api
            .request(Method::POST, REGISTER_PATH, Some(data), no_refresh())
            .await?;
        Ok(payload.into())
    }

    pub async fn logout(&self) -> Result<MessageResponse, ApiError> {
        self.acknowledge(LOGOUT_PATH, None::<&()>, no_refresh()).await
    }

    pub async fn logout_all(&self) -> Result<MessageResponse, ApiError> {
        self.acknowledge(LOGOUT_ALL_PATH, None::<&()>, no_refresh())
            .await
    }

    /// Fetch the signed-in user, refreshing the credential on 401.
    pub async fn current_user(&self) -> Result<UserIdentity, ApiError> {
        self.fetch_user(RequestOptions::default()).await
    }

    /// Fetch the signed-in user; a 401 is returned as-is.
    pub async fn current_user_without_refresh(&self) -> Result<UserIdentity, ApiError> {
        self.fetch_user(no_refresh()).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserIdentity, ApiError> {
        let user: UserPayload = self.api.patch(PROFILE_PATH, update).await?;
        Ok(user.into())
    }

    pub async fn change_password(
        &self,
        request: &ChangePasswordRequest,
    ) -> Result<MessageResponse, ApiError> {
        self.acknowledge(CHANGE_PASSWORD_PATH, Some(request), RequestOptions::default())
            .await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, ApiError> {
        self.acknowledge(
            PASSWORD_RESET_REQUEST_PATH,
            Some(&PasswordResetRequest { email }),
            RequestOptions::new().skip_auth(),
        )
        .await
    }

    pub async fn reset_password(
        &self,
        request: &PasswordResetConfirmRequest,
    ) -> Result<MessageResponse, ApiError> {
        self.acknowledge(
            PASSWORD_RESET_CONFIRM_PATH,
            Some(request),
            RequestOptions::new().skip_auth(),
        )
        .await
    }

    pub async fn verify_email(
        &self,
        request: &VerifyEmailRequest,
    ) -> Result<VerifyEmailResponse, ApiError> {
        let payload: VerifyEmailPayload = self.api.post(VERIFY_EMAIL_PATH, request).await?;
        Ok(payload.into())
    }

    pub async fn resend_verification_email(&self) -> Result<MessageResponse, ApiError> {
        self.acknowledge(RESEND_VERIFICATION_PATH, None::<&()>, RequestOptions::default())
            .await
    }

    async fn fetch_user(&self, options: RequestOptions) -> Result<UserIdentity, ApiError> {
        let user: UserPayload = self
            .api
            .request(Method::GET, ME_PATH, None::<&()>, options)
            .await?;
        Ok(user.into())
    }

    /// POST expecting `{message, success}`; an empty body counts as success.
    async fn acknowledge<B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<MessageResponse, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let response: Option<MessageResponse> =
            self.api.request(Method::POST, path, body, options).await?;
        Ok(response.unwrap_or_else(|| MessageResponse {
            message: String::new(),
            success: true,
        }))
    }
}

fn no_refresh() -> RequestOptions {
    RequestOptions::new().skip_refresh()
}
