//! Mock implementations of the session traits
//!
//! Both mocks are cheap to clone; clones share state, so a test can keep a
//! handle after moving one into a [`SessionManager`](crate::SessionManager).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::credentials::OAuthCredentials;
use crate::error::{EndpointError, StoreError};
use crate::traits::{KeyValueStore, TokenEndpoint};
use crate::types::{OAuthErrorBody, TokenResponse};

type Scripted = Arc<Mutex<VecDeque<Result<TokenResponse, EndpointError>>>>;

/// Build a bearer token response
#[must_use]
pub fn token_response(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        token_type: "Bearer".to_string(),
        expires_in,
    }
}

/// Build an HTTP error with an OAuth error body
#[must_use]
pub fn oauth_error(status: u16, error: &str, description: Option<&str>) -> EndpointError {
    EndpointError::Status {
        status,
        body: Some(OAuthErrorBody {
            error: error.to_string(),
            error_description: description.map(str::to_string),
        }),
    }
}

/// In-memory key-value store with call counters and failure injection
///
/// ```
/// use storefront_session::testing::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.insert_raw("session", "{}");
/// assert_eq!(store.value("session").as_deref(), Some("{}"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
    sets: Arc<AtomicUsize>,
    removes: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without counting it as a write
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.data.lock().insert(key.to_string(), value.to_string());
    }

    /// Current value under `key`
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    /// Number of `set_item` calls
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Number of `remove_item` calls
    #[must_use]
    pub fn remove_count(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Make `get_item` fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `set_item` and `remove_item` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected read failure".to_string()));
        }
        Ok(self.value(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check_writes()?;
        self.insert_raw(key, value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.check_writes()?;
        self.data.lock().remove(key);
        Ok(())
    }
}

/// Token endpoint with scripted responses and call counters
///
/// Unscripted calls succeed with a fresh one-hour token pair
/// (`access-N` / `refresh-N`). Latency is measured on the tokio clock, so
/// paused-clock tests can advance through it.
#[derive(Debug, Clone, Default)]
pub struct MockTokenEndpoint {
    password_script: Scripted,
    refresh_script: Scripted,
    password_calls: Arc<AtomicUsize>,
    refresh_calls: Arc<AtomicUsize>,
    latency: Arc<Mutex<Duration>>,
    refresh_latency: Arc<Mutex<Option<Duration>>>,
    last_refresh_token: Arc<Mutex<Option<String>>>,
    last_username: Arc<Mutex<Option<String>>>,
}

impl MockTokenEndpoint {
    /// Create an endpoint with nothing scripted
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted password grant
    pub fn push_password(&self, outcome: Result<TokenResponse, EndpointError>) {
        self.password_script.lock().push_back(outcome);
    }

    /// Queue the outcome of the next unscripted refresh grant
    pub fn push_refresh(&self, outcome: Result<TokenResponse, EndpointError>) {
        self.refresh_script.lock().push_back(outcome);
    }

    /// Delay every answer by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Delay refresh answers by `latency`, overriding [`Self::set_latency`]
    pub fn set_refresh_latency(&self, latency: Duration) {
        *self.refresh_latency.lock() = Some(latency);
    }

    /// Number of password grants received
    #[must_use]
    pub fn password_calls(&self) -> usize {
        self.password_calls.load(Ordering::SeqCst)
    }

    /// Number of refresh grants received
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Refresh token sent with the latest refresh grant
    #[must_use]
    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().clone()
    }

    /// Username sent with the latest password grant
    #[must_use]
    pub fn last_username(&self) -> Option<String> {
        self.last_username.lock().clone()
    }

    async fn answer(
        &self,
        script: &Scripted,
        call: usize,
        latency: Duration,
    ) -> Result<TokenResponse, EndpointError> {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = script.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(token_response(&format!("access-{call}"), Some(&format!("refresh-{call}")), 3600))
        })
    }
}

#[async_trait]
impl TokenEndpoint for MockTokenEndpoint {
    async fn password_grant(
        &self,
        _credentials: &OAuthCredentials,
        username: &str,
        _password: &str,
    ) -> Result<TokenResponse, EndpointError> {
        let call = self.password_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_username.lock() = Some(username.to_string());
        let latency = *self.latency.lock();
        self.answer(&self.password_script, call, latency).await
    }

    async fn refresh_grant(
        &self,
        _credentials: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, EndpointError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_refresh_token.lock() = Some(refresh_token.to_string());
        let latency = (*self.refresh_latency.lock()).unwrap_or(*self.latency.lock());
        self.answer(&self.refresh_script, call, latency).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryStore::new();
        store.set_item("k", "v").await.unwrap();

        store.set_fail_writes(true);
        assert!(store.set_item("k", "w").await.is_err());
        assert!(store.remove_item("k").await.is_err());
        assert_eq!(store.value("k").as_deref(), Some("v"));
        assert_eq!(store.set_count(), 2);
        assert_eq!(store.remove_count(), 1);

        store.set_fail_reads(true);
        assert!(store.get_item("k").await.is_err());
    }

    #[tokio::test]
    async fn test_endpoint_scripts_then_defaults() {
        let endpoint = MockTokenEndpoint::new();
        let creds = OAuthCredentials::new("id", "secret");
        endpoint.push_refresh(Err(oauth_error(401, "invalid_grant", None)));

        assert!(endpoint.refresh_grant(&creds, "R0").await.is_err());
        let second = endpoint.refresh_grant(&creds, "R1").await.unwrap();

        assert_eq!(second.access_token, "access-2");
        assert_eq!(endpoint.refresh_calls(), 2);
        assert_eq!(endpoint.last_refresh_token().as_deref(), Some("R1"));
    }
}
