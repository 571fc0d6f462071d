//! Route access policy evaluated against the session.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::form_urlencoded::byte_serialize;

use super::state::SessionSnapshot;

/// Where unauthenticated users are sent to sign in
pub const SIGN_IN_PATH: &str = "/auth/signin";

/// Landing page for signed-in users visiting guest-only routes
pub const HOME_PATH: &str = "/app";

/// Where users lacking a required role end up
pub const DENIED_PATH: &str = "/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthRequirement {
    #[default]
    Public,
    /// Only signed-in users
    Required,
    /// Only signed-out users (sign-in, registration pages)
    Guest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    #[serde(default)]
    pub auth: AuthRequirement,
    /// Any one of these roles grants access; empty means no role check
    #[serde(default)]
    pub roles: Vec<String>,
}

impl RouteRule {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Self {
            auth: AuthRequirement::Required,
            roles: Vec::new(),
        }
    }

    pub fn guest() -> Self {
        Self {
            auth: AuthRequirement::Guest,
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub sign_in_path: String,
    pub home_path: String,
    pub denied_path: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sign_in_path: SIGN_IN_PATH.to_string(),
            home_path: HOME_PATH.to_string(),
            denied_path: DENIED_PATH.to_string(),
        }
    }
}

impl GuardConfig {
    /// Sign-in URL carrying the original destination as `from`
    pub fn sign_in_url(&self, from: &str) -> String {
        let from: String = byte_serialize(from.as_bytes()).collect();
        format!("{}?from={}", self.sign_in_path, from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(String),
    /// The session is still being established
    Pending,
}

/// Decide access to `path` for the given snapshot.
pub fn evaluate(
    rule: &RouteRule,
    path: &str,
    snapshot: &SessionSnapshot,
    config: &GuardConfig,
) -> RouteDecision {
    if snapshot.is_pending() {
        return RouteDecision::Pending;
    }

    let user = snapshot.user();
    match (rule.auth, user) {
        (AuthRequirement::Required, None) => {
            return RouteDecision::Redirect(config.sign_in_url(path));
        }
        (AuthRequirement::Guest, Some(_)) => {
            return RouteDecision::Redirect(config.home_path.clone());
        }
        _ => {}
    }

    if rule.roles.is_empty() {
        return RouteDecision::Allow;
    }
    match user {
        None => RouteDecision::Redirect(config.sign_in_url(path)),
        Some(user) if !user.has_any_role(&rule.roles) => {
            RouteDecision::Redirect(config.denied_path.clone())
        }
        Some(_) => RouteDecision::Allow,
    }
}

/// Wait for a definitive session state, then evaluate.
///
/// If the session manager goes away first, the last published snapshot is
/// evaluated as-is.
pub async fn resolve(
    rule: &RouteRule,
    path: &str,
    session: &mut watch::Receiver<SessionSnapshot>,
    config: &GuardConfig,
) -> RouteDecision {
    let waited = session
        .wait_for(|s| !s.is_pending())
        .await
        .map(|snapshot| snapshot.clone());
    let snapshot = match waited {
        Ok(snapshot) => snapshot,
        Err(_) => session.borrow().clone(),
    };
    evaluate(rule, path, &snapshot, config)
}
