//! Session manager with proactive token refresh
//!
//! Owns the session lifecycle:
//! - Password-grant login and logout
//! - Single-flight refresh with terminal/transient failure classification
//! - Refresh timer armed ahead of expiry, with one retry on transient failure
//! - Foreground re-validation after the app was suspended
//! - Optimistic restore of the persisted session on startup
//!
//! Every mutation of the cached session happens under the session write lock,
//! including the storage I/O that accompanies it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};

use crate::config::SessionConfig;
use crate::credentials::CredentialsSource;
use crate::error::{LoginError, StoreError};
use crate::traits::{KeyValueStore, TokenEndpoint};
use crate::types::{AppState, AuthState, Session};

/// Result of one refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    /// New tokens stored
    Refreshed,
    /// Another refresh was already running
    InFlight,
    /// No session, no refresh token, or no client credentials
    Unavailable,
    /// Server rejected the refresh token; the session was cleared
    Rejected,
    /// Transient failure; the session is unchanged
    Failed,
    /// The session was replaced or cleared while the request was in flight
    Superseded,
}

impl RefreshOutcome {
    /// Outcomes after which the current session should not be torn down
    const fn keeps_session(self) -> bool {
        matches!(self, Self::Refreshed | Self::InFlight | Self::Superseded)
    }
}

/// Clears the in-flight flag when dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The armed refresh timer
#[derive(Debug)]
struct ScheduledRefresh {
    cancel: CancellationToken,
    fires_at: DateTime<Utc>,
    generation: u64,
}

struct Inner<E, S> {
    endpoint: E,
    store: S,
    credentials: CredentialsSource,
    config: SessionConfig,
    session: RwLock<Option<Session>>,
    auth_state: watch::Sender<AuthState>,
    refreshing: AtomicBool,
    timer: Mutex<Option<ScheduledRefresh>>,
    generation: AtomicU64,
    app_state: Mutex<AppState>,
}

impl<E, S> Drop for Inner<E, S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.cancel.cancel();
        }
    }
}

/// Session manager
///
/// Cloning is cheap and yields another handle to the same session. Background
/// tasks hold weak references, so dropping the last handle stops them.
///
/// # Examples
/// ```no_run
/// use storefront_session::{
///     CredentialsSource, HttpTokenEndpoint, OAuthCredentials, SessionConfig, SessionManager,
/// };
/// use storefront_session::store::FileStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SessionConfig::from_env()?;
/// let endpoint = HttpTokenEndpoint::new(&config)?;
/// let credentials = CredentialsSource::pending();
/// if let Some(creds) = OAuthCredentials::from_env() {
///     credentials.provide(creds);
/// }
///
/// let manager = SessionManager::new(endpoint, FileStore::new("session.json"), credentials, config);
/// if !manager.restore().await {
///     manager.login("buyer@example.com", "hunter2").await?;
/// }
/// let token = manager.get_valid_access_token().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<E: TokenEndpoint + 'static, S: KeyValueStore + 'static> {
    inner: Arc<Inner<E, S>>,
}

impl<E: TokenEndpoint + 'static, S: KeyValueStore + 'static> Clone for SessionManager<E, S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E: TokenEndpoint + 'static, S: KeyValueStore + 'static> std::fmt::Debug
    for SessionManager<E, S>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("auth_state", &*self.inner.auth_state.borrow())
            .field("storage_key", &self.inner.config.storage_key)
            .finish_non_exhaustive()
    }
}

impl<E: TokenEndpoint + 'static, S: KeyValueStore + 'static> SessionManager<E, S> {
    /// Create a manager in the anonymous state
    ///
    /// Call [`Self::restore`] afterwards to pick up a persisted session.
    pub fn new(endpoint: E, store: S, credentials: CredentialsSource, config: SessionConfig) -> Self {
        let (auth_state, _rx) = watch::channel(AuthState::Anonymous);
        Self {
            inner: Arc::new(Inner {
                endpoint,
                store,
                credentials,
                config,
                session: RwLock::new(None),
                auth_state,
                refreshing: AtomicBool::new(false),
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                app_state: Mutex::new(AppState::Active),
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner<E, S>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Current authentication state
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.inner.auth_state.borrow().clone()
    }

    /// Whether a session is held
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.auth_state.borrow().is_authenticated()
    }

    /// Subscribe to authentication state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.auth_state.subscribe()
    }

    /// Snapshot of the cached session
    pub async fn current_session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    /// When the armed refresh timer fires, if one is armed
    #[must_use]
    pub fn scheduled_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.inner.timer.lock().as_ref().map(|t| t.fires_at)
    }

    /// Shared OAuth client credentials slot
    #[must_use]
    pub fn credentials(&self) -> &CredentialsSource {
        &self.inner.credentials
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Sign in with the password grant
    ///
    /// On success the session is persisted, cached, announced as
    /// [`AuthState::Authenticated`] and the refresh timer is armed. On failure
    /// nothing changes.
    ///
    /// # Errors
    /// Returns [`LoginError::CredentialsNotConfigured`] without contacting the
    /// server when no OAuth client credentials are available, the mapped
    /// endpoint failure otherwise, and [`LoginError::Other`] when the session
    /// could not be persisted.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<(), LoginError> {
        let Some(credentials) = self.inner.credentials.current() else {
            warn!("Login attempted without OAuth client credentials");
            return Err(LoginError::CredentialsNotConfigured);
        };

        let response = self
            .inner
            .endpoint
            .password_grant(&credentials, email, password)
            .await
            .map_err(|e| {
                warn!(error = %e, status = ?e.status(), "Login rejected");
                LoginError::from_endpoint(&e)
            })?;

        let session = Session::from_response(email.to_string(), response, Utc::now());
        self.publish(session).await.map_err(|e| {
            warn!(error = %e, "Failed to persist session after login");
            LoginError::Other(format!("Failed to save session: {e}"))
        })?;

        info!("Signed in");
        Ok(())
    }

    /// Sign out: cancel the refresh timer, remove the persisted record and
    /// clear the cache
    ///
    /// Idempotent. Storage failures are logged and otherwise ignored.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.clear_session(None).await;
    }

    /// Exchange the refresh token for new tokens
    ///
    /// Returns `false` without waiting when a refresh is already running, and
    /// without a network call when there is no refresh token or no client
    /// credentials. A 400/401 answer signs the user out; any other failure
    /// leaves the session untouched.
    #[instrument(skip(self))]
    pub async fn refresh_access_token(&self) -> bool {
        self.refresh().await == RefreshOutcome::Refreshed
    }

    /// Access token that is valid for at least the expiry buffer
    ///
    /// Refreshes first when the cached token is about to expire and returns
    /// `None` if that refresh does not succeed.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let session = self.inner.session.read().await.clone()?;

        if !session.expires_within(self.inner.config.expiry_buffer, Utc::now()) {
            return Some(session.access_token);
        }

        debug!("Access token inside expiry buffer, refreshing");
        if !self.refresh_access_token().await {
            return None;
        }
        self.inner.session.read().await.as_ref().map(|s| s.access_token.clone())
    }

    /// Feed an application lifecycle transition
    ///
    /// Returning to [`AppState::Active`] from the background re-validates a
    /// session that expires within the foreground threshold: the tokens are
    /// refreshed, or the user is signed out if that fails.
    #[instrument(skip(self))]
    pub async fn handle_app_state(&self, next: AppState) {
        let previous = std::mem::replace(&mut *self.inner.app_state.lock(), next);
        if !(previous.is_suspended() && next == AppState::Active) {
            return;
        }

        let Some(session) = self.inner.session.read().await.clone() else {
            return;
        };
        if !session.expires_within(self.inner.config.foreground_threshold, Utc::now()) {
            debug!("Session still fresh after returning to foreground");
            return;
        }

        info!("Re-validating session after returning to foreground");
        self.inner.credentials.wait(self.inner.config.foreground_credentials_wait).await;

        let outcome = self.refresh().await;
        if !outcome.keeps_session() {
            warn!(?outcome, "Foreground refresh failed, signing out");
            self.logout().await;
        }
    }

    /// Spawn a listener that feeds lifecycle changes into
    /// [`Self::handle_app_state`]
    ///
    /// The task ends when the sender is dropped or the manager goes away.
    pub fn watch_app_state(&self, mut app_state: watch::Receiver<AppState>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(
            async move {
                let mut next = *app_state.borrow_and_update();
                loop {
                    let Some(manager) = Self::from_weak(&weak) else { break };
                    manager.handle_app_state(next).await;
                    drop(manager);

                    if app_state.changed().await.is_err() {
                        break;
                    }
                    next = *app_state.borrow_and_update();
                }
                debug!("App state listener stopped");
            }
            .instrument(debug_span!("app_state_listener")),
        )
    }

    /// Load the persisted session, if any
    ///
    /// A valid record is announced as authenticated right away. If it expires
    /// within the restore threshold a background refresh is started, and the
    /// user is signed out if it fails; otherwise the refresh timer is armed.
    /// Returns whether a session was restored. A malformed record is removed.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> bool {
        let key = &self.inner.config.storage_key;

        let raw = match self.inner.store.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No persisted session");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return false;
            }
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding malformed persisted session");
                if let Err(e) = self.inner.store.remove_item(key).await {
                    warn!(error = %e, "Failed to remove malformed session");
                }
                return false;
            }
        };

        let needs_refresh =
            session.expires_within(self.inner.config.restore_threshold, Utc::now());
        let email = session.email.clone();
        let expires_at = session.expires_at;

        {
            let mut slot = self.inner.session.write().await;
            *slot = Some(session);
            self.inner.auth_state.send_replace(AuthState::Authenticated { email });
            if !needs_refresh {
                self.schedule_refresh(expires_at);
            }
        }

        if needs_refresh {
            info!("Restored session is about to expire, validating in background");
            let weak = Arc::downgrade(&self.inner);
            let credentials = self.inner.credentials.clone();
            let budget = self.inner.config.credentials_wait;
            tokio::spawn(
                async move {
                    credentials.wait(budget).await;
                    let Some(manager) = Self::from_weak(&weak) else { return };
                    let outcome = manager.refresh().await;
                    if !outcome.keeps_session() {
                        warn!(?outcome, "Restored session could not be refreshed, signing out");
                        manager.logout().await;
                    }
                }
                .instrument(debug_span!("restore_validation")),
            );
        } else {
            info!("Session restored");
        }

        true
    }

    async fn refresh(&self) -> RefreshOutcome {
        let Some(_in_flight) = InFlightGuard::acquire(&self.inner.refreshing) else {
            debug!("Refresh already in flight");
            return RefreshOutcome::InFlight;
        };

        let Some(current) = self.inner.session.read().await.clone() else {
            debug!("No session to refresh");
            return RefreshOutcome::Unavailable;
        };
        let Some(refresh_token) = current.refresh_token.clone().filter(|t| !t.is_empty()) else {
            debug!("Session has no refresh token");
            return RefreshOutcome::Unavailable;
        };
        let Some(credentials) = self.inner.credentials.current() else {
            warn!("Cannot refresh without OAuth client credentials");
            return RefreshOutcome::Unavailable;
        };

        match self.inner.endpoint.refresh_grant(&credentials, &refresh_token).await {
            Ok(response) => {
                let next = current.refreshed(response, Utc::now());
                if self.persist(next, &refresh_token).await {
                    info!("Access token refreshed");
                    RefreshOutcome::Refreshed
                } else {
                    debug!("Session changed during refresh, discarding response");
                    RefreshOutcome::Superseded
                }
            }
            Err(e) if e.is_terminal() => {
                if !self.clear_session(Some(&refresh_token)).await {
                    debug!("Session changed during refresh, ignoring rejection");
                    return RefreshOutcome::Superseded;
                }
                info!(status = ?e.status(), code = ?e.oauth_code(), "Refresh token rejected, signed out");
                RefreshOutcome::Rejected
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                RefreshOutcome::Failed
            }
        }
    }

    /// Cancel the timer, remove the record, clear the cache and announce
    /// [`AuthState::Anonymous`], all under one session write lock
    ///
    /// With `only_if_refresh_token`, nothing happens unless the cached session
    /// still carries that refresh token. Returns whether the session was
    /// cleared (or was already gone).
    async fn clear_session(&self, only_if_refresh_token: Option<&str>) -> bool {
        let mut slot = self.inner.session.write().await;

        if let Some(expected) = only_if_refresh_token {
            if slot.as_ref().and_then(|s| s.refresh_token.as_deref()) != Some(expected) {
                return false;
            }
        }
        if slot.is_none() && !self.inner.auth_state.borrow().is_authenticated() {
            debug!("Already signed out");
            return true;
        }

        self.cancel_scheduled_refresh();
        if let Err(e) = self.inner.store.remove_item(&self.inner.config.storage_key).await {
            warn!(error = %e, "Failed to remove persisted session");
        }
        *slot = None;

        let changed = self.inner.auth_state.send_if_modified(|state| {
            if state.is_authenticated() {
                *state = AuthState::Anonymous;
                true
            } else {
                false
            }
        });
        drop(slot);

        if changed {
            info!("Signed out");
        }
        true
    }

    /// Store, cache and announce a new session, then arm the refresh timer
    async fn publish(&self, session: Session) -> Result<(), StoreError> {
        let record = serde_json::to_string(&session)?;
        let mut slot = self.inner.session.write().await;

        self.inner.store.set_item(&self.inner.config.storage_key, &record).await?;

        let email = session.email.clone();
        let expires_at = session.expires_at;
        *slot = Some(session);
        self.inner.auth_state.send_replace(AuthState::Authenticated { email });
        self.schedule_refresh(expires_at);
        Ok(())
    }

    /// Replace the session after a refresh without announcing it
    ///
    /// Returns `false` if the cached session no longer carries
    /// `previous_refresh_token`. A storage failure is logged; the cache is
    /// updated regardless.
    async fn persist(&self, session: Session, previous_refresh_token: &str) -> bool {
        let mut slot = self.inner.session.write().await;
        if slot.as_ref().and_then(|s| s.refresh_token.as_deref()) != Some(previous_refresh_token) {
            return false;
        }

        match serde_json::to_string(&session) {
            Ok(record) => {
                if let Err(e) =
                    self.inner.store.set_item(&self.inner.config.storage_key, &record).await
                {
                    warn!(error = %e, "Failed to persist refreshed session");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize refreshed session"),
        }

        let expires_at = session.expires_at;
        *slot = Some(session);
        self.schedule_refresh(expires_at);
        true
    }

    /// Arm the refresh timer `refresh_lead` ahead of `expires_at`
    fn schedule_refresh(&self, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        let lead = chrono::Duration::from_std(self.inner.config.refresh_lead)
            .unwrap_or(chrono::Duration::zero());
        let fires_at = (expires_at - lead).max(now);
        let delay = (fires_at - now).to_std().unwrap_or(Duration::ZERO);

        self.arm_timer(fires_at, delay, false, None);
    }

    /// Replace the armed timer
    ///
    /// With `replaces` set, only arms if that timer generation is still the
    /// armed one. Returns whether a timer was armed.
    fn arm_timer(
        &self,
        fires_at: DateTime<Utc>,
        delay: Duration,
        is_retry: bool,
        replaces: Option<u64>,
    ) -> bool {
        let cancel = CancellationToken::new();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let mut slot = self.inner.timer.lock();
            if let Some(expected) = replaces {
                if slot.as_ref().map(|t| t.generation) != Some(expected) {
                    return false;
                }
            }
            let previous = slot.replace(ScheduledRefresh {
                cancel: cancel.clone(),
                fires_at,
                generation,
            });
            if let Some(previous) = previous {
                previous.cancel.cancel();
            }
        }

        debug!(%fires_at, ?delay, is_retry, "Refresh timer armed");

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(
            async move {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                if let Some(manager) = Self::from_weak(&weak) {
                    manager.run_scheduled_refresh(generation, is_retry, &cancel).await;
                }
            }
            .instrument(debug_span!("scheduled_refresh", generation)),
        );

        true
    }

    async fn run_scheduled_refresh(&self, generation: u64, is_retry: bool, cancel: &CancellationToken) {
        if self.inner.credentials.wait(self.inner.config.credentials_wait).await.is_none() {
            debug!("OAuth client credentials still missing, attempting refresh anyway");
        }
        if cancel.is_cancelled() {
            return;
        }

        let outcome = self.refresh().await;
        debug!(?outcome, "Scheduled refresh finished");

        let retry = outcome == RefreshOutcome::Failed
            && !is_retry
            && self.inner.credentials.current().is_some()
            && self.inner.session.read().await.is_some();

        if retry {
            let delay = self.inner.config.retry_delay;
            let fires_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            if self.arm_timer(fires_at, delay, true, Some(generation)) {
                info!(retry_in = ?delay, "Scheduled refresh failed, retrying");
            }
            return;
        }

        let mut slot = self.inner.timer.lock();
        if slot.as_ref().is_some_and(|t| t.generation == generation) {
            *slot = None;
        }
    }

    fn cancel_scheduled_refresh(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.cancel.cancel();
            debug!(generation = timer.generation, "Refresh timer cancelled");
        }
    }
}
