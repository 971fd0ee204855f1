//! Session data types
//!
//! Defines the persisted session record, the token endpoint wire formats, and
//! the observable authentication and application states.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default token type when the server omits one
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// The authenticated session: tokens plus the identity used to sign in
///
/// Stored as a single camelCase JSON record. `expires_at` is serialized as
/// epoch milliseconds and always held at millisecond precision, so a record
/// read back from storage compares equal to the one written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bearer token sent on protected API calls
    pub access_token: String,

    /// Token exchanged for a new access token
    pub refresh_token: Option<String>,

    /// Token type reported by the server
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds reported at issuance
    pub expires_in: i64,

    /// Absolute expiry, derived when the tokens were received
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,

    /// Identifier used to sign in (display only)
    pub email: String,
}

impl Session {
    /// Build a session from a token endpoint response received at `issued_at`
    #[must_use]
    pub fn from_response(email: String, response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            expires_at: expiry_from(issued_at, response.expires_in),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            email,
        }
    }

    /// Build the successor of this session from a refresh response.
    ///
    /// The previous refresh token is kept when the server does not rotate it.
    #[must_use]
    pub fn refreshed(&self, response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let refresh_token = response.refresh_token.clone().or_else(|| self.refresh_token.clone());
        Self { refresh_token, ..Self::from_response(self.email.clone(), response, issued_at) }
    }

    /// Time left before expiry (negative once expired)
    #[must_use]
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Whether the access token expires within `window` of `now`
    #[must_use]
    pub fn expires_within(&self, window: std::time::Duration, now: DateTime<Utc>) -> bool {
        let window = Duration::from_std(window).unwrap_or(Duration::MAX);
        self.time_until_expiry(now) < window
    }

    /// Whether a refresh can be attempted at all
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// `issued_at + expires_in` seconds, truncated to milliseconds
///
/// Out-of-range lifetimes clamp towards their sign.
fn expiry_from(issued_at: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    let millis = issued_at.timestamp_millis().saturating_add(expires_in.saturating_mul(1000));
    DateTime::from_timestamp_millis(millis).unwrap_or(if expires_in < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Successful response from the token endpoint (RFC 6749 section 5.1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Issued access token
    pub access_token: String,

    /// Issued refresh token; absent on refresh means "unchanged"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type, normally `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// OAuth error body (RFC 6749 section 5.2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    /// Machine-readable error code, e.g. `invalid_grant`
    pub error: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Externally observable authentication state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No tokens held
    #[default]
    Anonymous,

    /// Tokens held and persisted for this identity
    Authenticated {
        /// Identifier used to sign in
        email: String,
    },
}

impl AuthState {
    /// Whether a session is active
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Application lifecycle states delivered by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    /// Foreground and receiving events
    #[default]
    Active,

    /// Running in the background
    Background,

    /// Transitioning or partially obscured
    Inactive,
}

impl AppState {
    /// Background or inactive: timers may not have fired reliably
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        matches!(self, Self::Background | Self::Inactive)
    }
}

impl FromStr for AppState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "background" => Ok(Self::Background),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("Unknown app state: {other}")),
        }
    }
}
