use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{AuthError, SessionSnapshot, SessionState, SessionStatus};
use crate::api::{ApiClient, ApiError, AuthService, RefreshTrigger};
use crate::auth::TokenStore;
use crate::events::{Listeners, Subscription};
use crate::models::{
    ChangePasswordRequest, LoginRequest, MessageResponse, PasswordResetConfirmRequest,
    ProfileUpdate, RegisterRequest, UserIdentity, VerifyEmailRequest, VerifyEmailResponse,
};

/// Floor on the proactive refresh delay, so a credential whose lifetime is
/// shorter than the refresh buffer does not refresh in a tight loop.
pub const MIN_PROACTIVE_REFRESH_DELAY_MS: u64 = 1000;

struct RefreshTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct ManagerInner {
    auth: AuthService,
    tokens: Arc<TokenStore>,
    state: watch::Sender<SessionSnapshot>,
    timer: Mutex<Option<RefreshTimer>>,
    timer_seq: AtomicU64,
    refresh_floor: Duration,
    invalidated: Listeners<()>,
    hooks: Mutex<Vec<Subscription>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.handle.abort();
        }
        for hook in self.hooks.get_mut().drain(..) {
            hook.unsubscribe();
        }
    }
}

/// Owns the session lifecycle: restore, login, proactive refresh and
/// invalidation.
///
/// State is published as a [`SessionSnapshot`] through a watch channel; only
/// the manager writes to it. Clone is cheap and clones share everything.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Proactive refreshes fire `MIN_PROACTIVE_REFRESH_DELAY_MS` (1s) after
    /// arming at the earliest, even for credentials that are already inside
    /// the refresh buffer.
    pub fn new(api: ApiClient) -> Self {
        Self::with_refresh_floor(api, Duration::from_millis(MIN_PROACTIVE_REFRESH_DELAY_MS))
    }

    /// Like `new`, with a custom floor on the proactive refresh delay
    pub fn with_refresh_floor(api: ApiClient, refresh_floor: Duration) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::initial());
        let inner = Arc::new(ManagerInner {
            tokens: api.tokens().clone(),
            auth: AuthService::new(api.clone()),
            state,
            timer: Mutex::new(None),
            timer_seq: AtomicU64::new(0),
            refresh_floor,
            invalidated: Listeners::new(),
            hooks: Mutex::new(Vec::new()),
        });

        // A refresh that failed on behalf of a rejected request ends the session
        let weak = Arc::downgrade(&inner);
        let on_failure = api.on_auth_failure(move || {
            if let Some(manager) = Self::upgrade(&weak) {
                manager.handle_session_invalid();
            }
        });

        // Whoever triggered it, a new credential gets a new timer
        let weak = Arc::downgrade(&inner);
        let on_refresh = api.on_token_refreshed(move || {
            if let Some(manager) = Self::upgrade(&weak) {
                if manager.snapshot().is_authenticated() {
                    manager.arm_refresh_timer();
                }
            }
        });

        inner.hooks.lock().extend([on_failure, on_refresh]);
        Self { inner }
    }

    fn upgrade(weak: &Weak<ManagerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status()
    }

    pub fn user(&self) -> Option<Arc<UserIdentity>> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn error(&self) -> Option<AuthError> {
        self.inner.state.borrow().error.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    pub fn is_loading(&self) -> bool {
        self.status() == SessionStatus::Loading
    }

    pub fn is_initializing(&self) -> bool {
        self.inner.state.borrow().is_initializing()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user().is_some_and(|u| u.has_role(role))
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.user().is_some_and(|u| u.has_any_role(roles))
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    pub fn api(&self) -> &ApiClient {
        self.inner.auth.api()
    }

    /// Id of the pending proactive refresh, if one is armed
    pub fn scheduled_refresh(&self) -> Option<u64> {
        self.inner.timer.lock().as_ref().map(|t| t.id)
    }

    /// Called whenever an active session is torn down (credential rejected,
    /// proactive refresh failed, logout).
    pub fn on_session_invalid<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.invalidated.subscribe(move |_| callback())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Restore a previous session, if there was one.
    ///
    /// Only acts while `Initializing`; later calls return the current
    /// snapshot.
    pub async fn initialize(&self) -> SessionSnapshot {
        if self.status() != SessionStatus::Initializing {
            debug!(status = self.status().label(), "Session already initialized");
            return self.snapshot();
        }

        if !self.inner.tokens.should_attempt_restore() {
            info!("No previous session to restore");
            self.transition(SessionState::Unauthenticated, None);
            return self.snapshot();
        }

        self.transition(SessionState::Restoring, None);
        match self.restore().await {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored");
                self.set_authenticated(user);
            }
            Err(e) => {
                info!(error = %e, "Session restore failed");
                self.reset(Some(AuthError::session_expired()));
            }
        }
        self.snapshot()
    }

    async fn restore(&self) -> Result<UserIdentity, ApiError> {
        if self.inner.tokens.has_access_token() {
            match self.inner.auth.current_user_without_refresh().await {
                Ok(user) => return Ok(user),
                Err(e) => debug!(error = %e, "Stored credential not accepted, refreshing"),
            }
        }

        self.api()
            .refresh_access_token(RefreshTrigger::Session)
            .await
            .map_err(|e| ApiError::RefreshFailed(e.to_string()))?;
        self.inner.auth.current_user_without_refresh().await
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<Arc<UserIdentity>, AuthError> {
        self.transition(SessionState::Loading, None);
        match self.inner.auth.login(credentials).await {
            Ok(session) => {
                self.inner.tokens.set_tokens(&session.tokens);
                info!(user_id = %session.user.id, "Logged in");
                Ok(self.set_authenticated(session.user))
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                let error = AuthError::from_login(&e);
                self.reset(Some(error.clone()));
                Err(error)
            }
        }
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<Arc<UserIdentity>, AuthError> {
        self.transition(SessionState::Loading, None);
        match self.inner.auth.register(data).await {
            Ok(session) => {
                self.inner.tokens.set_tokens(&session.tokens);
                info!(user_id = %session.user.id, "Registered");
                Ok(self.set_authenticated(session.user))
            }
            Err(e) => {
                warn!(error = %e, "Registration failed");
                let error = AuthError::from_register(&e);
                self.reset(Some(error.clone()));
                Err(error)
            }
        }
    }

    /// Renew the credential, joining any refresh already running.
    ///
    /// Returns false on failure and leaves the session as it is; the
    /// caller decides whether that ends it.
    pub async fn refresh_tokens(&self) -> bool {
        match self.api().refresh_access_token(RefreshTrigger::Session).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Credential refresh failed");
                false
            }
        }
    }

    /// Tear down the session locally and notify invalidation subscribers.
    ///
    /// Safe to call repeatedly: once unauthenticated, later calls only
    /// re-clear the credential.
    pub fn handle_session_invalid(&self) {
        self.cancel_refresh_timer();

        let tokens = &self.inner.tokens;
        let was_active = self.inner.state.send_if_modified(|snapshot| {
            tokens.clear();
            if snapshot.status() == SessionStatus::Unauthenticated {
                return false;
            }
            snapshot.state = SessionState::Unauthenticated;
            true
        });

        if was_active {
            info!("Session invalidated");
            self.inner.invalidated.emit(&());
        } else {
            debug!("Session already invalid");
        }
    }

    pub async fn logout(&self) {
        self.end_session(false).await;
    }

    /// Log out of every device
    pub async fn logout_all(&self) {
        self.end_session(true).await;
    }

    async fn end_session(&self, everywhere: bool) {
        self.cancel_refresh_timer();

        let result = if everywhere {
            self.inner.auth.logout_all().await
        } else {
            self.inner.auth.logout().await
        };
        if let Err(e) = result {
            warn!(error = %e, everywhere, "Logout request failed, clearing local session anyway");
        }

        self.handle_session_invalid();
        info!(everywhere, "Logged out");
    }

    /// Stop background work and detach from the gateway.
    pub fn shutdown(&self) {
        self.cancel_refresh_timer();
        self.inner.invalidated.clear();
        let hooks: Vec<Subscription> = self.inner.hooks.lock().drain(..).collect();
        for hook in hooks {
            hook.unsubscribe();
        }
        debug!("Session manager shut down");
    }

    // ========================================================================
    // Account operations
    // ========================================================================

    /// Re-fetch the identity from the server
    pub async fn refresh_user(&self) -> Result<Arc<UserIdentity>, AuthError> {
        let user = self.inner.auth.current_user().await;
        let user = self.record(user)?;
        self.replace_identity(user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Arc<UserIdentity>, AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::not_signed_in());
        }
        let user = self.inner.auth.update_profile(update).await;
        let user = self.record(user)?;
        info!("Profile updated");
        self.replace_identity(user)
    }

    pub async fn change_password(&self, request: &ChangePasswordRequest) -> Result<MessageResponse, AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::not_signed_in());
        }
        let response = self.inner.auth.change_password(request).await;
        self.record(response)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<MessageResponse, AuthError> {
        let response = self.inner.auth.request_password_reset(email).await;
        self.record(response)
    }

    pub async fn reset_password(
        &self,
        request: &PasswordResetConfirmRequest,
    ) -> Result<MessageResponse, AuthError> {
        let response = self.inner.auth.reset_password(request).await;
        self.record(response)
    }

    /// Confirm an email address. A response carrying the user replaces the
    /// current identity.
    pub async fn verify_email(&self, token: &str) -> Result<VerifyEmailResponse, AuthError> {
        let request = VerifyEmailRequest {
            token: token.to_string(),
        };
        let response = self.inner.auth.verify_email(&request).await;
        let response = self.record(response)?;
        if let Some(ref user) = response.user {
            if self.is_authenticated() {
                self.replace_identity(user.clone())?;
            }
        }
        Ok(response)
    }

    pub async fn resend_verification_email(&self) -> Result<MessageResponse, AuthError> {
        let response = self.inner.auth.resend_verification_email().await;
        self.record(response)
    }

    pub fn clear_error(&self) {
        self.inner
            .state
            .send_if_modified(|snapshot| snapshot.error.take().is_some());
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    fn transition(&self, next: SessionState, error: Option<AuthError>) {
        self.inner.state.send_modify(|snapshot| {
            let from = snapshot.status();
            let to = next.status();
            if from.can_transition_to(to) {
                debug!(from = from.label(), to = to.label(), "Session transition");
            } else {
                warn!(from = from.label(), to = to.label(), "Unexpected session transition");
            }
            snapshot.state = next;
            snapshot.error = error;
        });
    }

    /// Clear credential and identity together, without notifying
    /// invalidation subscribers.
    fn reset(&self, error: Option<AuthError>) {
        self.cancel_refresh_timer();
        let tokens = &self.inner.tokens;
        self.inner.state.send_modify(|snapshot| {
            tokens.clear();
            snapshot.state = SessionState::Unauthenticated;
            snapshot.error = error;
        });
    }

    fn set_authenticated(&self, user: UserIdentity) -> Arc<UserIdentity> {
        let user = Arc::new(user);
        self.transition(SessionState::Authenticated(user.clone()), None);
        self.arm_refresh_timer();
        user
    }

    /// Swap in a new identity without touching the credential or timer.
    fn replace_identity(&self, user: UserIdentity) -> Result<Arc<UserIdentity>, AuthError> {
        let user = Arc::new(user);
        let replaced = self.inner.state.send_if_modified(|snapshot| {
            if snapshot.status() != SessionStatus::Authenticated {
                return false;
            }
            snapshot.state = SessionState::Authenticated(user.clone());
            snapshot.error = None;
            true
        });
        if replaced {
            Ok(user)
        } else {
            Err(AuthError::not_signed_in())
        }
    }

    /// Attach a failed operation's error to the snapshot and hand it back.
    fn record<T>(&self, result: Result<T, ApiError>) -> Result<T, AuthError> {
        result.map_err(|e| {
            let error = AuthError::from_api(&e);
            self.inner.state.send_modify(|snapshot| {
                snapshot.error = Some(error.clone());
            });
            error
        })
    }

    // ========================================================================
    // Proactive refresh
    // ========================================================================

    /// Schedule the next proactive refresh, replacing any pending one.
    fn arm_refresh_timer(&self) {
        let delay = self
            .inner
            .tokens
            .time_until_refresh()
            .max(self.inner.refresh_floor);
        let id = self.inner.timer_seq.fetch_add(1, Ordering::SeqCst) + 1;

        // Hold the slot while spawning so the task cannot look for itself
        // before it is registered
        let mut slot = self.inner.timer.lock();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = Self::upgrade(&weak) {
                manager.on_refresh_timer(id).await;
            }
        });
        if let Some(previous) = slot.replace(RefreshTimer { id, handle }) {
            previous.handle.abort();
        }
        debug!(timer = id, delay_ms = delay.as_millis() as u64, "Proactive refresh scheduled");
    }

    fn cancel_refresh_timer(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.handle.abort();
            debug!(timer = timer.id, "Proactive refresh cancelled");
        }
    }

    async fn on_refresh_timer(&self, id: u64) {
        {
            let mut slot = self.inner.timer.lock();
            if slot.as_ref().map(|t| t.id) != Some(id) {
                debug!(timer = id, "Stale refresh timer ignored");
                return;
            }
            // Leave the slot before refreshing so re-arming doesn't abort us
            slot.take();
        }

        if !self.is_authenticated() {
            return;
        }

        let generation = self.inner.tokens.generation();
        debug!(timer = id, "Proactive refresh firing");
        if let Err(e) = self.api().refresh_access_token(RefreshTrigger::Session).await {
            // A login or logout that raced this refresh owns the session now
            if self.inner.tokens.generation() != generation {
                debug!(error = %e, "Proactive refresh failed on a superseded session");
                return;
            }
            warn!(error = %e, "Proactive refresh failed, ending session");
            self.handle_session_invalid();
        }
    }
}
