//! Network-path status and the pre-flight connectivity gate.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;
use url::Url;

use crate::error::DispatchError;
use crate::session::SessionProfile;

// ============================================================================
// Network Status
// ============================================================================

/// Current reachability of the network.
pub trait NetworkStatus: Send + Sync {
    /// Returns true if a network path is available.
    fn is_connected(&self) -> bool;
}

/// Reachability flag updated by the embedding application's path monitor.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct SharedNetworkStatus {
    online: Arc<AtomicBool>,
}

impl SharedNetworkStatus {
    /// Creates a status that starts online.
    pub fn new() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Creates a status that starts offline.
    pub fn offline() -> Self {
        let status = Self::new();
        status.set_connected(false);
        status
    }

    /// Updates the flag.
    pub fn set_connected(&self, connected: bool) {
        self.online.store(connected, Ordering::SeqCst);
    }
}

impl Default for SharedNetworkStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkStatus for SharedNetworkStatus {
    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Status that is never offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

// ============================================================================
// Connectivity Observer
// ============================================================================

/// Collaborator told about connectivity problems.
pub trait ConnectivityObserver: Send + Sync {
    /// Session preset the embedding application runs calls under.
    fn configuration(&self) -> SessionProfile;

    /// Called when a task to `url` is waiting for a network path.
    fn network_unavailable(&self, url: &Url);
}

impl fmt::Debug for dyn ConnectivityObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityObserver")
            .field("configuration", &self.configuration())
            .finish()
    }
}

// ============================================================================
// Connectivity Gate
// ============================================================================

/// Rejects foreground calls up front when the network is down.
#[derive(Clone)]
pub struct ConnectivityGate {
    status: Arc<dyn NetworkStatus>,
}

impl ConnectivityGate {
    /// Creates a gate reading `status`.
    pub fn new(status: Arc<dyn NetworkStatus>) -> Self {
        Self { status }
    }

    /// Checks a call about to run under `profile`.
    ///
    /// No profile counts as foreground. Background profiles always pass and
    /// rely on the transport waiting for connectivity instead.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoConnectivity`] for a foreground call while
    /// offline.
    pub fn check(&self, profile: Option<SessionProfile>) -> Result<(), DispatchError> {
        let foreground = profile.is_none_or(|p| p.is_foreground());
        if foreground && !self.status.is_connected() {
            warn!(profile = ?profile, "No network path, failing fast");
            return Err(DispatchError::NoConnectivity);
        }
        Ok(())
    }

    /// Current reachability.
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }
}

impl Default for ConnectivityGate {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysOnline))
    }
}

impl fmt::Debug for ConnectivityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityGate")
            .field("connected", &self.status.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreground_offline_fails() {
        let gate = ConnectivityGate::new(Arc::new(SharedNetworkStatus::offline()));
        assert!(matches!(
            gate.check(Some(SessionProfile::NoBackground)),
            Err(DispatchError::NoConnectivity)
        ));
        assert!(matches!(gate.check(None), Err(DispatchError::NoConnectivity)));
    }

    #[test]
    fn test_background_skips_check() {
        let gate = ConnectivityGate::new(Arc::new(SharedNetworkStatus::offline()));
        assert!(gate.check(Some(SessionProfile::AverageBackground)).is_ok());
    }

    #[test]
    fn test_shared_flag_is_live() {
        let status = SharedNetworkStatus::new();
        let gate = ConnectivityGate::new(Arc::new(status.clone()));
        assert!(gate.check(None).is_ok());
        status.set_connected(false);
        assert!(gate.check(None).is_err());
        status.set_connected(true);
        assert!(gate.is_connected());
    }
}
