//! Token refresh protocol.
//!
//! When a call is rejected with 401 or 406 the dispatcher hands the
//! embedding application's [`AuthorizationProvider`] a [`RefreshReplay`].
//! The provider describes its refresh endpoint and calls
//! [`RefreshReplay::call`], which performs the refresh request, saves the new
//! credentials and replays the original call exactly once.
//!
//! Refreshes are coalesced per service by a [`RefreshCoordinator`]: a call
//! that was sent with credentials that have since been replaced replays
//! directly instead of starting a second refresh.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use streamline_core::status::{CREATED, INTERNAL_SERVER_ERROR, OK};
use streamline_core::{AcknowledgedByApi, AuthFailureKind, RequestDescriptor, ResponseClass};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

// ============================================================================
// Authorization Provider
// ============================================================================

/// Credential collaborator supplied by the embedding application.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Refreshes credentials after a call failed with `kind`.
    ///
    /// Implementations build the descriptor of their refresh endpoint and
    /// pass it to [`RefreshReplay::call`]. The returned outcome carries the
    /// body of the replayed original call.
    async fn refresh_token(
        &self,
        kind: AuthFailureKind,
        replay: RefreshReplay,
    ) -> Result<ReplayOutcome, DispatchError>;

    /// Persists the body of a successful refresh response.
    async fn save(&self, data: &[u8], kind: AuthFailureKind);
}

impl fmt::Debug for dyn AuthorizationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationProvider")
    }
}

// ============================================================================
// Call Chain
// ============================================================================

/// State of one logical call and its replays.
///
/// The flag allows one refresh per chain. The chain lives inside the call's
/// future, so dropping a cancelled call drops the flag with it.
#[derive(Debug, Default)]
pub struct CallChain {
    refreshing: AtomicBool,
}

impl CallChain {
    /// Creates a chain with no refresh underway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once a refresh has started for this chain.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Marks a refresh as started. Returns false if one already was.
    pub fn begin_refresh(&self) -> bool {
        !self.refreshing.swap(true, Ordering::SeqCst)
    }
}

// ============================================================================
// Refresh Coordinator
// ============================================================================

/// Serializes refreshes of one service and counts completed ones.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    lock: Arc<Mutex<()>>,
    generation: AtomicU64,
}

impl RefreshCoordinator {
    /// Creates a coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refreshes completed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) async fn acquire(&self) -> OwnedMutexGuard<()> {
        self.lock.clone().lock_owned().await
    }

    fn complete(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// ============================================================================
// Refresh Replay
// ============================================================================

/// Proof that the original call was replayed. Only [`RefreshReplay::call`]
/// creates one.
#[derive(Debug)]
pub struct ReplayOutcome {
    body: Vec<u8>,
}

impl ReplayOutcome {
    /// Body of the replayed original call.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// One-shot handle performing the refresh call and the replay.
///
/// Holding it keeps other refreshes of the same service waiting.
pub struct RefreshReplay {
    dispatcher: Dispatcher,
    original: RequestDescriptor,
    kind: AuthFailureKind,
    provider: Arc<dyn AuthorizationProvider>,
    guard: OwnedMutexGuard<()>,
}

impl RefreshReplay {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        original: RequestDescriptor,
        kind: AuthFailureKind,
        provider: Arc<dyn AuthorizationProvider>,
        guard: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            dispatcher,
            original,
            kind,
            provider,
            guard,
        }
    }

    /// Why the refresh was triggered.
    pub fn kind(&self) -> AuthFailureKind {
        self.kind
    }

    /// The call that will be replayed.
    pub fn original(&self) -> &RequestDescriptor {
        &self.original
    }

    /// Sends `refresh`; on 200 or 201 saves the response through the
    /// provider and replays the original call once.
    ///
    /// # Errors
    ///
    /// A 500 from the refresh endpoint yields [`DispatchError::Server`], a
    /// 401/406 yields [`DispatchError::AuthFailure`] and any other status a
    /// [`DispatchError::Client`]. Errors of the replayed call are returned
    /// as is and are never refreshed again.
    pub async fn call(self, refresh: RequestDescriptor) -> Result<ReplayOutcome, DispatchError> {
        let Self {
            dispatcher,
            original,
            kind,
            provider,
            guard,
        } = self;

        debug!(kind = %kind, path = %refresh.path(), "Sending refresh request");
        let response = dispatcher.send(&refresh).await?;

        match response.status {
            OK | CREATED => {
                provider.save(&response.body, kind).await;
                let generation = dispatcher.refresh_coordinator().complete();
                drop(guard);
                info!(kind = %kind, generation, "Credentials refreshed, replaying original request");

                let replayed = dispatcher.send(&original).await?;
                let body = Dispatcher::settle(replayed)?;
                Ok(ReplayOutcome { body })
            }
            INTERNAL_SERVER_ERROR => {
                warn!(status = response.status, "Refresh endpoint failed");
                Err(DispatchError::Server {
                    status: response.status,
                })
            }
            status => {
                warn!(status, "Refresh request rejected");
                let acknowledged = AcknowledgedByApi::from_body(&response.body);
                match streamline_core::classify(status) {
                    ResponseClass::AuthRequired(kind) => Err(DispatchError::AuthFailure {
                        kind,
                        status,
                        acknowledged,
                    }),
                    _ => Err(DispatchError::Client {
                        status,
                        acknowledged,
                    }),
                }
            }
        }
    }
}

impl fmt::Debug for RefreshReplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshReplay")
            .field("kind", &self.kind)
            .field("original", &self.original)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_allows_one_refresh() {
        let chain = CallChain::new();
        assert!(!chain.is_refreshing());
        assert!(chain.begin_refresh());
        assert!(!chain.begin_refresh());
        assert!(chain.is_refreshing());
    }

    #[tokio::test]
    async fn test_coordinator_generation() {
        let coordinator = RefreshCoordinator::new();
        assert_eq!(coordinator.generation(), 0);
        let guard = coordinator.acquire().await;
        assert_eq!(coordinator.complete(), 1);
        drop(guard);
        assert_eq!(coordinator.generation(), 1);
    }

    #[tokio::test]
    async fn test_coordinator_serializes() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let guard = coordinator.acquire().await;

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let _guard = coordinator.acquire().await;
                coordinator.generation()
            })
        };

        tokio::task::yield_now().await;
        coordinator.complete();
        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
    }
}
