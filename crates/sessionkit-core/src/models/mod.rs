//! Data models for the identity provider's auth API.
//!
//! This module contains:
//!
//! - `UserIdentity`: the signed-in user, mapped from the wire `UserPayload`
//! - `AuthTokens`, `AuthSession`: credentials issued by login/register/refresh
//! - Request/response bodies for the profile, password and email endpoints

pub mod auth;
pub mod user;

pub use auth::{
    AuthSession, AuthTokens, ChangePasswordRequest, LoginRequest, MessageResponse,
    PasswordResetConfirmRequest, RegisterRequest, VerifyEmailRequest, VerifyEmailResponse,
};
pub(crate) use auth::{
    LoginPayload, PasswordResetRequest, RefreshPayload, RefreshRequest, VerifyEmailPayload,
};
pub use user::{AuthProvider, ProfileUpdate, UserIdentity, UserPayload};
