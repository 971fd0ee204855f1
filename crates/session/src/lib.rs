//! OAuth2 password-grant session management for the storefront client.
//!
//! Signs a buyer in against the backend token endpoint, keeps the tokens in
//! durable storage, refreshes them ahead of expiry, re-validates them when the
//! app returns to the foreground, and restores them on startup.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  SessionManager  │  Session lifecycle + refresh scheduling
//! └────────┬─────────┘
//!          │
//!          ├──► TokenEndpoint       (HttpTokenEndpoint, reqwest)
//!          ├──► KeyValueStore       (FileStore, KeychainStore)
//!          ├──► CredentialsSource   (late-arriving OAuth client credentials)
//!          └──► watch channels      (AuthState out, AppState in)
//! ```
//!
//! # Features
//!
//! - `keychain` (default): [`store::KeychainStore`] backed by the platform
//!   keychain

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod store;
pub mod traits;
pub mod types;
pub mod utils;

// Testing utilities
// ---------------------------------------------------------------
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use config::SessionConfig;
pub use credentials::{CredentialsSource, OAuthCredentials};
pub use endpoint::HttpTokenEndpoint;
pub use error::{ConfigError, EndpointError, LoginError, StoreError};
pub use manager::SessionManager;
pub use traits::{KeyValueStore, TokenEndpoint};
pub use types::{AppState, AuthState, OAuthErrorBody, Session, TokenResponse};
