//! Host integrations for the Streamline pipeline.
//!
//! - [`http`] - Transport backed by reqwest
//! - [`keychain`] - Client identity storage in the system keychain

pub mod http;
pub mod keychain;

// Re-export key types
pub use http::{HttpTransport, HttpTransportBuilder};
pub use keychain::KeychainIdentityProvider;
