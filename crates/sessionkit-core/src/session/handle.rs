use std::sync::Arc;

use tokio::sync::watch;

use super::guard::{self, GuardConfig, RouteDecision, RouteRule};
use super::manager::SessionManager;
use super::state::{AuthError, SessionSnapshot, SessionStatus};
use crate::events::Subscription;
use crate::models::{
    ChangePasswordRequest, LoginRequest, MessageResponse, PasswordResetConfirmRequest,
    ProfileUpdate, RegisterRequest, UserIdentity, VerifyEmailResponse,
};

/// What application code gets to see of the session: read-only state, the
/// user-facing operations and route checks.
///
/// Lifecycle control (`initialize`, invalidation, shutdown) stays with the
/// owner of the [`SessionManager`].
#[derive(Clone)]
pub struct SessionHandle {
    manager: SessionManager,
    guard: GuardConfig,
}

impl SessionHandle {
    pub fn new(manager: SessionManager) -> Self {
        Self::with_guard(manager, GuardConfig::default())
    }

    pub fn with_guard(manager: SessionManager, guard: GuardConfig) -> Self {
        Self { manager, guard }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.manager.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.manager.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.manager.status()
    }

    pub fn user(&self) -> Option<Arc<UserIdentity>> {
        self.manager.user()
    }

    pub fn error(&self) -> Option<AuthError> {
        self.manager.error()
    }

    pub fn is_authenticated(&self) -> bool {
        self.manager.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.manager.is_loading()
    }

    pub fn is_initializing(&self) -> bool {
        self.manager.is_initializing()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.manager.has_role(role)
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.manager.has_any_role(roles)
    }

    pub fn on_session_invalid<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.manager.on_session_invalid(callback)
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<Arc<UserIdentity>, AuthError> {
        self.manager.login(credentials).await
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<Arc<UserIdentity>, AuthError> {
        self.manager.register(data).await
    }

    pub async fn logout(&self) {
        self.manager.logout().await
    }

    pub async fn logout_all(&self) {
        self.manager.logout_all().await
    }

    pub async fn refresh_tokens(&self) -> bool {
        self.manager.refresh_tokens().await
    }

    pub async fn refresh_user(&self) -> Result<Arc<UserIdentity>, AuthError> {
        self.manager.refresh_user().await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Arc<UserIdentity>, AuthError> {
        self.manager.update_profile(update).await
    }

    pub async fn change_password(&self, request: &ChangePasswordRequest) -> Result<MessageResponse, AuthError> {
        self.manager.change_password(request).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, AuthError> {
        self.manager.request_password_reset(email).await
    }

    pub async fn reset_password(
        &self,
        request: &PasswordResetConfirmRequest,
    ) -> Result<MessageResponse, AuthError> {
        self.manager.reset_password(request).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<VerifyEmailResponse, AuthError> {
        self.manager.verify_email(token).await
    }

    pub async fn resend_verification_email(&self) -> Result<MessageResponse, AuthError> {
        self.manager.resend_verification_email().await
    }

    pub fn clear_error(&self) {
        self.manager.clear_error()
    }

    /// Decide access from the current snapshot; `Pending` while the session
    /// is still being established.
    pub fn check_route(&self, rule: &RouteRule, path: &str) -> RouteDecision {
        guard::evaluate(rule, path, &self.manager.snapshot(), &self.guard)
    }

    /// Decide access once the session has settled.
    pub async fn resolve_route(&self, rule: &RouteRule, path: &str) -> RouteDecision {
        let mut session = self.manager.subscribe();
        guard::resolve(rule, path, &mut session, &self.guard).await
    }
}
