//! Client identity storage in the system keychain.
//!
//! The PEM bundle is stored as the secret of a keyring entry:
//! - macOS: Keychain Services
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)

use keyring::Entry;
use tracing::{debug, warn};

use crate::error::IdentityError;
use crate::identity::{ClientIdentity, IdentityProvider};

/// Service name prefix for Streamline entries.
const SERVICE_PREFIX: &str = "streamline";

/// Account under which identities are stored.
const IDENTITY_ACCOUNT: &str = "client_identity";

/// Identity provider backed by the system keychain.
#[derive(Debug, Clone)]
pub struct KeychainIdentityProvider {
    label: String,
}

impl KeychainIdentityProvider {
    /// Creates a provider for the identity stored under `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Label of the stored identity.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Builds the full service name with prefix.
    fn full_service(label: &str) -> String {
        format!("{SERVICE_PREFIX}:{label}")
    }

    fn entry(&self) -> Result<Entry, IdentityError> {
        Entry::new(&Self::full_service(&self.label), IDENTITY_ACCOUNT)
            .map_err(|e| IdentityError::Platform(e.to_string()))
    }

    /// Stores `identity`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the keychain rejects the write.
    pub fn save(&self, identity: &ClientIdentity) -> Result<(), IdentityError> {
        debug!(label = %self.label, "Saving client identity");
        let pem = std::str::from_utf8(identity.pem())
            .map_err(|e| IdentityError::InvalidPem(e.to_string()))?;
        self.entry()?.set_password(pem).map_err(|e| {
            warn!(label = %self.label, error = %e, "Failed to save client identity");
            IdentityError::from(e)
        })
    }

    /// Deletes the stored identity. Deleting a missing one is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the keychain fails.
    pub fn remove(&self) -> Result<(), IdentityError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(label = %self.label, "Client identity removed");
                Ok(())
            }
            Err(e) => {
                warn!(label = %self.label, error = %e, "Failed to remove client identity");
                Err(e.into())
            }
        }
    }

    /// Returns true if an identity is stored.
    pub fn exists(&self) -> bool {
        matches!(self.load_client_identity(), Ok(Some(_)))
    }
}

impl IdentityProvider for KeychainIdentityProvider {
    fn load_client_identity(&self) -> Result<Option<ClientIdentity>, IdentityError> {
        match self.entry()?.get_password() {
            Ok(pem) if !pem.is_empty() => {
                debug!(label = %self.label, "Client identity found");
                ClientIdentity::from_pem(pem).map(Some)
            }
            Ok(_) | Err(keyring::Error::NoEntry) => {
                debug!(label = %self.label, "No client identity stored");
                Ok(None)
            }
            Err(e) => {
                warn!(label = %self.label, error = %e, "Failed to read client identity");
                Err(e.into())
            }
        }
    }
}
