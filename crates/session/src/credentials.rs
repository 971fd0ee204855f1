//! OAuth client credentials and their late-arriving source
//!
//! Client credentials are often fetched from remote configuration after the
//! app has started. [`CredentialsSource`] lets the session manager await them
//! with a bounded budget instead of polling.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::config::{env_var, ENV_CLIENT_ID, ENV_CLIENT_SECRET};

/// OAuth client id and secret
///
/// The `Debug` implementation masks the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Create credentials (may be empty; see [`Self::is_complete`])
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), client_secret: client_secret.into() }
    }

    /// Read `STOREFRONT_CLIENT_ID` / `STOREFRONT_CLIENT_SECRET`.
    ///
    /// Returns `None` unless both are set and non-empty.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let creds = Self::new(env_var(ENV_CLIENT_ID)?, env_var(ENV_CLIENT_SECRET)?);
        creds.is_complete().then_some(creds)
    }

    /// OAuth client id
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth client secret
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Both values present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"*****")
            .finish()
    }
}

/// Shared, awaitable slot for the OAuth client credentials
///
/// Cloning yields another handle to the same slot. Incomplete credentials
/// (empty id or secret) are treated as absent.
#[derive(Clone)]
pub struct CredentialsSource {
    tx: Arc<watch::Sender<Option<OAuthCredentials>>>,
}

impl CredentialsSource {
    /// A source with no credentials yet
    #[must_use]
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// A source that already holds `credentials`
    #[must_use]
    pub fn ready(credentials: OAuthCredentials) -> Self {
        let source = Self::pending();
        source.provide(credentials);
        source
    }

    /// Publish credentials, waking anyone waiting on them
    pub fn provide(&self, credentials: OAuthCredentials) {
        debug!(client_id = %credentials.client_id(), "OAuth client credentials provided");
        self.tx.send_replace(Some(credentials));
    }

    /// Forget the current credentials
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Credentials available right now
    #[must_use]
    pub fn current(&self) -> Option<OAuthCredentials> {
        self.tx.borrow().clone().filter(OAuthCredentials::is_complete)
    }

    /// Wait up to `budget` for complete credentials
    pub async fn wait(&self, budget: Duration) -> Option<OAuthCredentials> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(
            budget,
            rx.wait_for(|c| c.as_ref().is_some_and(OAuthCredentials::is_complete)),
        )
        .await;

        match waited {
            Ok(Ok(creds)) => creds.clone(),
            _ => {
                debug!(?budget, "OAuth client credentials not ready");
                None
            }
        }
    }
}

impl Default for CredentialsSource {
    fn default() -> Self {
        Self::pending()
    }
}

impl fmt::Debug for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsSource").field("ready", &self.current().is_some()).finish()
    }
}
