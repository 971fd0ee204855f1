//! Test doubles and helpers
//!
//! Used by this crate's own tests and available to downstream crates that
//! drive a [`SessionManager`](crate::SessionManager) without a network or a
//! platform keychain.

pub mod async_utils;
pub mod mocks;

pub use async_utils::poll_until;
pub use mocks::{oauth_error, token_response, MemoryStore, MockTokenEndpoint};
