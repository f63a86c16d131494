//! Transport abstraction over the underlying HTTP client.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::BuiltRequest;
use crate::connectivity::ConnectivityObserver;
use crate::error::TransportError;
use crate::identity::IdentityProvider;
use crate::metrics::TaskMetrics;

/// Response of a completed send task.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Final status code after redirects.
    pub status: u16,
    /// Response headers of the final hop.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
    /// Timing of the task.
    pub metrics: TaskMetrics,
}

/// Result of a completed download task.
///
/// `path` is a temporary file owned by the caller, who moves or deletes it.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Temporary location of the body.
    pub path: PathBuf,
    /// Final status code after redirects.
    pub status: u16,
    /// Timing of the task.
    pub metrics: TaskMetrics,
}

/// Sends built requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and buffers the body.
    async fn send(&self, request: &BuiltRequest) -> Result<TransportResponse, TransportError>;

    /// Sends `request` and streams the body to a temporary file.
    async fn download(&self, request: &BuiltRequest) -> Result<DownloadedFile, TransportError>;

    /// Replaces the client identity source. Transports without TLS client
    /// authentication ignore it.
    fn set_identity_provider(&self, _provider: Option<Arc<dyn IdentityProvider>>) {}

    /// Replaces the collaborator told about connectivity waits.
    fn set_connectivity_observer(&self, _observer: Option<Arc<dyn ConnectivityObserver>>) {}
}

// ============================================================================
// Scripted Transport (tests)
// ============================================================================
