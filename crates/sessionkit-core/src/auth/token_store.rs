use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::storage::{MemoryStorage, SlotStorage, SlotWrite};
use crate::clock::{Clock, SystemClock};
use crate::models::AuthTokens;

const ACCESS_TOKEN_KEY: &str = "auth_access_token";
const REFRESH_TOKEN_KEY: &str = "auth_refresh_token";
const TOKEN_EXPIRY_KEY: &str = "auth_token_expiry";
const HAS_SESSION_KEY: &str = "auth_has_session";

/// Buffer before expiry at which a token counts as expired, so renewal
/// happens before the server starts rejecting it.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;

/// Lifetime assumed when the server omits `expiresIn` (15 minutes).
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 15 * 60;

/// How long the "had a session" marker and refresh token outlive the
/// access token (30 days).
pub const SESSION_MARKER_MAX_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub refresh_buffer: Duration,
    pub default_lifetime: Duration,
    pub session_marker_max_age: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::seconds(TOKEN_REFRESH_BUFFER_SECS),
            default_lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS),
            session_marker_max_age: Duration::days(SESSION_MARKER_MAX_AGE_DAYS),
        }
    }
}

/// Holds the access credential and its expiry.
///
/// Every write bumps a generation counter. A refresh that started before a
/// clear or a newer login uses it to avoid writing back a stale credential.
pub struct TokenStore {
    storage: Arc<dyn SlotStorage>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
    generation: AtomicU64,
    writes: Mutex<()>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SlotStorage>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(storage, clock, TokenPolicy::default())
    }

    pub fn with_policy(
        storage: Arc<dyn SlotStorage>,
        clock: Arc<dyn Clock>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            storage,
            clock,
            policy,
            generation: AtomicU64::new(0),
            writes: Mutex::new(()),
        }
    }

    /// Process-local store on the system clock
    pub fn in_memory() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::new(Arc::new(MemoryStorage::new(clock.clone())), clock)
    }

    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn access_token(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.storage.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ms: i64 = self.storage.get(TOKEN_EXPIRY_KEY)?.parse().ok()?;
        Utc.timestamp_millis_opt(ms).single()
    }

    /// True once `now >= expires_at - refresh_buffer`. A token with no
    /// recorded expiry is not considered expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at() {
            Some(expiry) => self.clock.now() >= expiry - self.policy.refresh_buffer,
            None => false,
        }
    }

    pub fn has_valid_tokens(&self) -> bool {
        self.has_access_token() && !self.is_expired()
    }

    /// Whether a silent restore is worth attempting: the session marker
    /// outlives the access token, so a restart after the token lapsed
    /// still tries the refresh endpoint.
    pub fn should_attempt_restore(&self) -> bool {
        self.storage.get(HAS_SESSION_KEY).as_deref() == Some("true") || self.has_access_token()
    }

    /// Time until the credential should be renewed:
    /// `max(0, expires_at - now - refresh_buffer)`, or the default
    /// lifetime when no expiry is recorded.
    pub fn time_until_refresh(&self) -> std::time::Duration {
        let remaining = match self.expires_at() {
            Some(expiry) => expiry - self.clock.now() - self.policy.refresh_buffer,
            None => self.policy.default_lifetime,
        };
        remaining.to_std().unwrap_or(std::time::Duration::ZERO)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store a newly issued credential.
    pub fn set_tokens(&self, tokens: &AuthTokens) {
        let _guard = self.writes.lock();
        self.write_tokens(tokens);
    }

    /// Store a credential only if nothing was written since `generation`
    /// was read. Returns false when the write was discarded.
    pub fn set_tokens_if_current(&self, generation: u64, tokens: &AuthTokens) -> bool {
        let _guard = self.writes.lock();
        if self.generation() != generation {
            debug!(
                expected = generation,
                current = self.generation(),
                "Discarding credential from a superseded refresh"
            );
            return false;
        }
        self.write_tokens(tokens);
        true
    }

    /// Wipe credential, expiry, refresh token and session marker together.
    pub fn clear(&self) {
        let _guard = self.writes.lock();
        self.wipe();
    }

    /// Clear only if nothing was written since `generation` was read.
    /// Returns false when a newer credential was kept.
    pub fn clear_if_current(&self, generation: u64) -> bool {
        let _guard = self.writes.lock();
        if self.generation() != generation {
            debug!(
                expected = generation,
                current = self.generation(),
                "Keeping credential written after a failed refresh began"
            );
            return false;
        }
        self.wipe();
        true
    }

    fn wipe(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.persist(&[
            SlotWrite::Remove { key: ACCESS_TOKEN_KEY },
            SlotWrite::Remove { key: TOKEN_EXPIRY_KEY },
            SlotWrite::Remove { key: REFRESH_TOKEN_KEY },
            SlotWrite::Remove { key: HAS_SESSION_KEY },
        ]);
    }

    fn write_tokens(&self, tokens: &AuthTokens) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let lifetime = tokens
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(Duration::seconds)
            .unwrap_or(self.policy.default_lifetime);
        let expiry = self.clock.now() + lifetime;

        let mut writes = vec![
            SlotWrite::Set {
                key: ACCESS_TOKEN_KEY,
                value: tokens.access_token.clone(),
                max_age: Some(lifetime),
            },
            SlotWrite::Set {
                key: TOKEN_EXPIRY_KEY,
                value: expiry.timestamp_millis().to_string(),
                max_age: Some(lifetime),
            },
            SlotWrite::Set {
                key: HAS_SESSION_KEY,
                value: "true".to_string(),
                max_age: Some(self.policy.session_marker_max_age),
            },
        ];

        // Servers that rotate refresh tokens send a new one; otherwise keep
        // whatever the previous response issued.
        if let Some(ref refresh) = tokens.refresh_token {
            writes.push(SlotWrite::Set {
                key: REFRESH_TOKEN_KEY,
                value: refresh.clone(),
                max_age: Some(self.policy.session_marker_max_age),
            });
        }

        self.persist(&writes);
    }

    fn persist(&self, writes: &[SlotWrite]) {
        if let Err(e) = self.storage.apply(writes) {
            warn!(error = %e, "Failed to persist credential slots");
        }
    }
}
