//! Durable [`KeyValueStore`](crate::traits::KeyValueStore) backends
//!
//! - [`FileStore`]: JSON map file, written atomically
//! - [`KeychainStore`]: platform keychain (feature `keychain`)

pub mod file;
#[cfg(feature = "keychain")]
pub mod keychain;

pub use file::FileStore;
#[cfg(feature = "keychain")]
pub use keychain::KeychainStore;
