//! reqwest-backed OAuth token endpoint
//!
//! Sends form-encoded grant requests to `{base_url}{token_path}` and maps the
//! outcome onto [`EndpointError`]:
//! - non-2xx: [`EndpointError::Status`] with the OAuth error body when parseable
//! - connect failure or timeout: [`EndpointError::NoResponse`]
//! - unparseable success body: [`EndpointError::Other`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, instrument, warn};

use crate::config::SessionConfig;
use crate::credentials::OAuthCredentials;
use crate::error::EndpointError;
use crate::traits::TokenEndpoint;
use crate::types::{OAuthErrorBody, TokenResponse};

/// HTTP token endpoint client
///
/// Password grants use the client's default timeout; refresh grants are
/// bounded by `refresh_timeout`.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: Client,
    token_url: String,
    refresh_timeout: Duration,
}

impl HttpTokenEndpoint {
    /// Create an endpoint client for the configured base URL
    ///
    /// # Errors
    /// Returns [`EndpointError::Other`] if the HTTP client cannot be built
    pub fn new(config: &SessionConfig) -> Result<Self, EndpointError> {
        let client = Client::builder()
            .build()
            .map_err(|e| EndpointError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create an endpoint client around an existing `reqwest::Client`
    #[must_use]
    pub fn with_client(client: Client, config: &SessionConfig) -> Self {
        Self { client, token_url: config.token_url(), refresh_timeout: config.refresh_timeout }
    }

    /// Token endpoint URL requests are sent to
    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    async fn send(&self, request: RequestBuilder) -> Result<TokenResponse, EndpointError> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, timeout = e.is_timeout(), "Token request got no response");
            EndpointError::NoResponse(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<OAuthErrorBody>(&body).ok();
            debug!(status = status.as_u16(), code = ?parsed.as_ref().map(|b| b.error.as_str()), "Token request rejected");
            return Err(EndpointError::Status { status: status.as_u16(), body: parsed });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| EndpointError::Other(format!("Failed to parse token response: {e}")))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    #[instrument(skip(self, credentials, password), fields(url = %self.token_url))]
    async fn password_grant(
        &self,
        credentials: &OAuthCredentials,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, EndpointError> {
        let params = [
            ("grant_type", "password"),
            ("client_id", credentials.client_id()),
            ("client_secret", credentials.client_secret()),
            ("username", username),
            ("password", password),
        ];

        self.send(self.client.post(&self.token_url).form(&params)).await
    }

    #[instrument(skip_all, fields(url = %self.token_url))]
    async fn refresh_grant(
        &self,
        credentials: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, EndpointError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id()),
            ("client_secret", credentials.client_secret()),
            ("refresh_token", refresh_token),
        ];

        let request =
            self.client.post(&self.token_url).form(&params).timeout(self.refresh_timeout);
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_url_from_config() {
        let config = SessionConfig::new("https://shop.example.com");
        let endpoint = HttpTokenEndpoint::new(&config).unwrap();
        assert_eq!(endpoint.token_url(), "https://shop.example.com/oauth2-token");
        assert_eq!(endpoint.refresh_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_no_response() {
        // Port 9 on loopback is closed in test environments
        let config = SessionConfig::new("http://127.0.0.1:9");
        let endpoint = HttpTokenEndpoint::new(&config).unwrap();
        let creds = OAuthCredentials::new("id", "secret");

        let err = endpoint.refresh_grant(&creds, "R").await.unwrap_err();
        assert!(matches!(err, EndpointError::NoResponse(_)));
        assert!(!err.is_terminal());
    }
}
