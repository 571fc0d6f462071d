use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the account authenticates with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Local,
    Google,
    #[serde(untagged)]
    Other(String),
}

impl AuthProvider {
    pub fn from_str(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("local") => AuthProvider::Local,
            Some("google") => AuthProvider::Google,
            Some(other) => AuthProvider::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthProvider::Local => write!(f, "local"),
            AuthProvider::Google => write!(f, "google"),
            AuthProvider::Other(name) => write!(f, "{}", name),
        }
    }
}

/// User record as the API sends it (`GET /auth/me`, login/register bodies).
/// Internal wire type - use UserIdentity from this module for domain code.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserPayload {
    pub id: String,
    pub email: String,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "avatarUrl", alias = "avatar", default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(rename = "googleId", default)]
    pub google_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(rename = "emailVerified", default)]
    pub email_verified: Option<bool>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

/// The authenticated user as seen by the client.
///
/// Held behind an `Arc` by the session manager and shared with every
/// consumer. It is never mutated in place; profile changes replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: AuthProvider,
    pub google_id: Option<String>,
    pub role: Option<String>,
    pub email_verified: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl From<UserPayload> for UserIdentity {
    fn from(p: UserPayload) -> Self {
        Self {
            created_at: parse_timestamp(p.created_at.as_deref()),
            updated_at: parse_timestamp(p.updated_at.as_deref()),
            provider: AuthProvider::from_str(p.provider.as_deref()),
            id: p.id,
            email: p.email,
            first_name: non_empty(p.first_name),
            last_name: non_empty(p.last_name),
            name: non_empty(p.name),
            avatar_url: non_empty(p.avatar_url),
            google_id: non_empty(p.google_id),
            role: non_empty(p.role),
            email_verified: p.email_verified.unwrap_or(false),
        }
    }
}

impl UserIdentity {
    /// First and last name joined, falling back to the single `name` field
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();

        if !parts.is_empty() {
            Some(parts.join(" "))
        } else {
            self.name.clone()
        }
    }

    /// Two-letter initials for avatars
    pub fn initials(&self) -> String {
        match self.full_name() {
            Some(name) => name
                .split_whitespace()
                .filter_map(|part| part.chars().next())
                .collect::<String>()
                .to_uppercase()
                .chars()
                .take(2)
                .collect(),
            None => self.email.chars().take(2).collect::<String>().to_uppercase(),
        }
    }

    pub fn display_name(&self) -> String {
        self.full_name().unwrap_or_else(|| {
            self.email
                .split('@')
                .next()
                .unwrap_or(&self.email)
                .to_string()
        })
    }

    pub fn is_google_user(&self) -> bool {
        self.provider == AuthProvider::Google
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        match self.role.as_deref() {
            Some(role) => roles.iter().any(|r| r.as_ref() == role),
            None => false,
        }
    }
}

/// Partial user update for `PATCH /auth/profile`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "avatarUrl", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.name.is_none()
            && self.avatar_url.is_none()
    }
}
