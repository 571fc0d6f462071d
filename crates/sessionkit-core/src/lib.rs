//! sessionkit - client-side session management for token-authenticated APIs.
//!
//! The pieces, bottom-up:
//! - `auth::TokenStore`: the bearer credential, its expiry and the
//!   "had a session" marker, over pluggable slot storage
//! - `api::ApiClient`: request gateway with coalesced refresh and a single
//!   retry on 401
//! - `session::SessionManager`: restore, login, proactive refresh,
//!   invalidation and logout, published as watchable snapshots
//! - `session::SessionHandle` and `session::guard`: what application code
//!   consumes, including route access decisions

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod events;
pub mod models;
pub mod session;

pub use api::{ApiClient, ApiError, AuthService, RequestOptions};
pub use auth::TokenStore;
pub use config::ClientConfig;
pub use events::Subscription;
pub use models::{AuthTokens, LoginRequest, RegisterRequest, UserIdentity};
pub use session::{
    AuthError, AuthErrorCode, RouteDecision, RouteRule, SessionHandle, SessionManager,
    SessionSnapshot, SessionState, SessionStatus,
};
