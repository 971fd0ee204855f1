//! Session manager configuration
//!
//! Timing constants, the persisted-session storage key, and the token
//! endpoint location.
//!
//! ## Loading Strategy
//! - [`SessionConfig::default`]: built-in values
//! - [`SessionConfig::from_env`]: `STOREFRONT_*` variables (a `.env` file is
//!   honoured), unset variables keep their defaults
//! - [`SessionConfig::from_file`]: TOML or JSON, detected by extension;
//!   durations are given in milliseconds
//!
//! ## Environment Variables
//! - `STOREFRONT_BASE_URL`: Backend base URL (required by `from_env`)
//! - `STOREFRONT_TOKEN_PATH`: Token endpoint path (default `/oauth2-token`)
//! - `STOREFRONT_STORAGE_KEY`: Key of the persisted session record
//! - `STOREFRONT_REFRESH_TIMEOUT_MS`: Transport timeout for refresh calls
//! - `STOREFRONT_CREDENTIALS_WAIT_MS`: Budget for late OAuth credentials
//! - `STOREFRONT_CLIENT_ID` / `STOREFRONT_CLIENT_SECRET`: OAuth client
//!   credentials, see [`crate::OAuthCredentials::from_env`]

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::utils::serde::duration_millis;

/// Backend base URL
pub const ENV_BASE_URL: &str = "STOREFRONT_BASE_URL";
/// Token endpoint path override
pub const ENV_TOKEN_PATH: &str = "STOREFRONT_TOKEN_PATH";
/// Storage key override
pub const ENV_STORAGE_KEY: &str = "STOREFRONT_STORAGE_KEY";
/// Refresh transport timeout override, in milliseconds
pub const ENV_REFRESH_TIMEOUT_MS: &str = "STOREFRONT_REFRESH_TIMEOUT_MS";
/// Credentials wait budget override, in milliseconds
pub const ENV_CREDENTIALS_WAIT_MS: &str = "STOREFRONT_CREDENTIALS_WAIT_MS";
/// OAuth client id
pub const ENV_CLIENT_ID: &str = "STOREFRONT_CLIENT_ID";
/// OAuth client secret
pub const ENV_CLIENT_SECRET: &str = "STOREFRONT_CLIENT_SECRET";

/// Default token endpoint path
pub const DEFAULT_TOKEN_PATH: &str = "/oauth2-token";

/// Default key of the persisted session record
pub const DEFAULT_STORAGE_KEY: &str = "storefront.session";

/// Session manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend base URL, e.g. `https://shop.example.com`
    pub base_url: String,

    /// Token endpoint path appended to `base_url`
    pub token_path: String,

    /// Key under which the session record is persisted
    pub storage_key: String,

    /// Tokens expiring sooner than this are refreshed before being handed out
    #[serde(with = "duration_millis")]
    pub expiry_buffer: Duration,

    /// Proactive refresh fires this long before expiry
    #[serde(with = "duration_millis")]
    pub refresh_lead: Duration,

    /// Delay before the single retry of a failed scheduled refresh
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,

    /// Returning to the foreground refreshes tokens expiring within this window
    #[serde(with = "duration_millis")]
    pub foreground_threshold: Duration,

    /// A restored session expiring within this window is refreshed at once
    #[serde(with = "duration_millis")]
    pub restore_threshold: Duration,

    /// How long scheduled and startup refreshes wait for OAuth credentials
    #[serde(with = "duration_millis")]
    pub credentials_wait: Duration,

    /// How long a foreground refresh waits for OAuth credentials
    #[serde(with = "duration_millis")]
    pub foreground_credentials_wait: Duration,

    /// Transport timeout for refresh-grant requests
    #[serde(with = "duration_millis")]
    pub refresh_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            expiry_buffer: Duration::from_secs(5),
            refresh_lead: Duration::from_secs(10),
            retry_delay: Duration::from_secs(5),
            foreground_threshold: Duration::from_secs(30),
            restore_threshold: Duration::from_secs(30),
            credentials_wait: Duration::from_secs(5),
            foreground_credentials_wait: Duration::from_secs(3),
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Defaults pointed at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    /// Load from `STOREFRONT_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] when `STOREFRONT_BASE_URL` is unset and
    /// [`ConfigError::Invalid`] for malformed numeric values.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }

        let mut config = Self::new(env_var(ENV_BASE_URL).ok_or(ConfigError::Missing(ENV_BASE_URL))?);

        if let Some(path) = env_var(ENV_TOKEN_PATH) {
            config.token_path = path;
        }
        if let Some(key) = env_var(ENV_STORAGE_KEY) {
            config.storage_key = key;
        }
        if let Some(timeout) = env_millis(ENV_REFRESH_TIMEOUT_MS)? {
            config.refresh_timeout = timeout;
        }
        if let Some(wait) = env_millis(ENV_CREDENTIALS_WAIT_MS)? {
            config.credentials_wait = wait;
        }

        config.validate()?;
        info!(base_url = %config.base_url, "Session configuration loaded from environment");
        Ok(config)
    }

    /// Load from a TOML or JSON file (by extension)
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Format`] if it cannot be parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading session configuration from file");

        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents, path)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        match extension {
            "toml" => toml::from_str(contents)
                .map_err(|e| ConfigError::Format(format!("Invalid TOML format: {e}"))),
            "json" => serde_json::from_str(contents)
                .map_err(|e| ConfigError::Format(format!("Invalid JSON format: {e}"))),
            other => Err(ConfigError::Format(format!("Unsupported config format: {other}"))),
        }
    }

    /// Reject values the manager cannot work with
    ///
    /// # Errors
    /// Returns [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: format!("'{}' must start with http:// or https://", self.base_url),
            });
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Missing("storage_key"));
        }
        Ok(())
    }

    /// Full token endpoint URL
    #[must_use]
    pub fn token_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.token_path.starts_with('/') {
            format!("{base}{}", self.token_path)
        } else {
            format!("{base}/{}", self.token_path)
        }
    }
}

/// Non-empty environment variable
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_millis(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    env_var(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map(Duration::from_millis).map_err(|e| {
                ConfigError::Invalid { field: name, reason: format!("'{raw}' is not a number: {e}") }
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_match_refresh_policy() {
        let config = SessionConfig::default();
        assert_eq!(config.expiry_buffer, Duration::from_secs(5));
        assert_eq!(config.refresh_lead, Duration::from_secs(10));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.foreground_threshold, Duration::from_secs(30));
        assert_eq!(config.credentials_wait, Duration::from_secs(5));
        assert_eq!(config.foreground_credentials_wait, Duration::from_secs(3));
        assert_eq!(config.refresh_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_token_url_joins_paths() {
        let config = SessionConfig::new("https://shop.example.com/");
        assert_eq!(config.token_url(), "https://shop.example.com/oauth2-token");

        let config =
            SessionConfig { token_path: "api/token".into(), ..SessionConfig::new("http://h") };
        assert_eq!(config.token_url(), "http://h/api/token");
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        assert!(matches!(SessionConfig::default().validate(), Err(ConfigError::Missing(_))));
        assert!(matches!(
            SessionConfig::new("shop.example.com").validate(),
            Err(ConfigError::Invalid { field: "base_url", .. })
        ));
        assert!(SessionConfig::new("https://shop.example.com").validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_uses_millis_and_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "base_url = \"https://shop.example.com\"\nrefresh_lead = 20000\nstorage_key = \"s\""
        )
        .unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.refresh_lead, Duration::from_secs(20));
        assert_eq!(config.storage_key, "s");
        assert_eq!(config.expiry_buffer, Duration::from_secs(5));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"base_url":"http://localhost:8080","retry_delay":1000}}"#).unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.token_url(), "http://localhost:8080/oauth2-token");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(SessionConfig::from_file(file.path()), Err(ConfigError::Format(_))));
    }
}
