//! Platform keychain key-value store
//!
//! Each key becomes one keychain entry under a fixed service name (macOS
//! Keychain Access, Windows Credential Manager, Linux Secret Service).
//!
//! ```no_run
//! use storefront_session::store::KeychainStore;
//!
//! let store = KeychainStore::new("Storefront.session");
//! ```

use async_trait::async_trait;
use keyring::Entry;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::KeyValueStore;

/// Key-value store backed by the platform keychain
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    /// Store whose entries live under `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    /// Keychain service name
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key).map_err(|e| {
            StoreError::Keychain(format!("Failed to create keychain entry for {key}: {e}"))
        })
    }
}

#[async_trait]
impl KeyValueStore for KeychainStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!(service = %self.service_name, key = %key, "Reading keychain entry");

        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Keychain(format!("Failed to read {key}: {e}"))),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Writing keychain entry");

        self.entry(key)?
            .set_password(value)
            .map_err(|e| StoreError::Keychain(format!("Failed to store {key}: {e}")))
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Deleting keychain entry");

        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Keychain(format!("Failed to delete {key}: {e}"))),
        }
    }
}
