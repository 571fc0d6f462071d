//! Shared helpers for the wiremock-backed integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sessionkit_core::auth::{MemoryStorage, TokenPolicy, TokenStore};
use sessionkit_core::clock::{Clock, SystemClock};
use sessionkit_core::models::AuthTokens;
use sessionkit_core::ApiClient;
use wiremock::{MockServer, ResponseTemplate};

/// Client-side timeout used by every test client
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

pub fn user_json(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "email": email,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "role": "user",
        "provider": "local",
        "emailVerified": true,
        "createdAt": "2025-01-02T03:04:05Z"
    })
}

/// Flat login/register body: tokens beside the user
pub fn login_json(access_token: &str, expires_in: u64) -> Value {
    json!({
        "accessToken": access_token,
        "expiresIn": expires_in,
        "user": user_json("u1", "ada@example.com")
    })
}

pub fn refresh_json(access_token: &str, expires_in: u64) -> Value {
    json!({ "accessToken": access_token, "expiresIn": expires_in })
}

pub fn json_response(status: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}

pub fn delayed(status: u16, body: Value, delay_ms: u64) -> ResponseTemplate {
    json_response(status, body).set_delay(Duration::from_millis(delay_ms))
}

pub fn memory_tokens() -> Arc<TokenStore> {
    Arc::new(TokenStore::in_memory())
}

/// Token store with a custom refresh buffer, for short proactive timers
pub fn tokens_with_buffer(buffer: chrono::Duration) -> Arc<TokenStore> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = TokenPolicy {
        refresh_buffer: buffer,
        ..TokenPolicy::default()
    };
    Arc::new(TokenStore::with_policy(
        Arc::new(MemoryStorage::new(clock.clone())),
        clock,
        policy,
    ))
}

pub fn signed_in_tokens(access_token: &str) -> Arc<TokenStore> {
    let tokens = memory_tokens();
    tokens.set_tokens(&AuthTokens::new(access_token, Some(900)));
    tokens
}

pub fn api_for(server: &MockServer, tokens: Arc<TokenStore>) -> ApiClient {
    ApiClient::builder(server.uri())
        .timeout(TEST_TIMEOUT)
        .build(tokens)
        .unwrap()
}

/// Shared counter plus a callback that bumps it
pub fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move || {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

pub fn count_of(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
