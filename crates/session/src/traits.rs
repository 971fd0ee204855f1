//! Traits for token endpoint and storage operations
//!
//! These traits enable dependency injection and testing by abstracting
//! external dependencies (the OAuth token endpoint, persistent storage).

use async_trait::async_trait;

use crate::credentials::OAuthCredentials;
use crate::error::{EndpointError, StoreError};
use crate::types::TokenResponse;

/// Trait for OAuth token endpoint operations
///
/// This trait abstracts the token endpoint to enable testing with mock
/// implementations and to support different transports.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange resource-owner credentials for tokens (password grant)
    ///
    /// # Arguments
    /// * `credentials` - OAuth client id and secret
    /// * `username` - Login identifier, usually an email address
    /// * `password` - User password
    ///
    /// # Errors
    /// Returns [`EndpointError::Status`] when the server rejects the request,
    /// [`EndpointError::NoResponse`] when no answer arrives, and
    /// [`EndpointError::Other`] when the response cannot be parsed
    async fn password_grant(
        &self,
        credentials: &OAuthCredentials,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, EndpointError>;

    /// Exchange a refresh token for new tokens (refresh grant)
    ///
    /// Implementations must bound this call with a transport timeout.
    ///
    /// # Errors
    /// Same classes as [`Self::password_grant`]; a timeout is reported as
    /// [`EndpointError::NoResponse`]
    async fn refresh_grant(
        &self,
        credentials: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, EndpointError>;
}

/// Trait for durable string key-value storage
///
/// Writes must be visible to subsequent reads and survive process restarts.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `None` if absent
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    /// Returns error if the value could not be made durable
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove the value under `key`; removing a missing key is not an error
    ///
    /// # Errors
    /// Returns error if the backend cannot be updated
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}
