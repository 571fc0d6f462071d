//! Client session lifecycle.
//!
//! This module provides:
//! - `SessionManager`: the state machine (restore, login, proactive
//!   refresh, invalidation, logout)
//! - `SessionSnapshot`/`SessionState`: the published, immutable view
//! - `SessionHandle`: the read-only surface handed to application code
//! - `guard`: route access decisions over a snapshot

pub mod guard;
pub mod handle;
pub mod manager;
pub mod state;

pub use guard::{AuthRequirement, GuardConfig, RouteDecision, RouteRule};
pub use handle::SessionHandle;
pub use manager::{SessionManager, MIN_PROACTIVE_REFRESH_DELAY_MS};
pub use state::{
    AuthError, AuthErrorCode, SessionSnapshot, SessionState, SessionStatus, SessionSummary,
};
