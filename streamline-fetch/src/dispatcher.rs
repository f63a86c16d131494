//! Request dispatcher: send, classify, refresh once, replay, decode.
//!
//! ```text
//! Idle -> Sent -> Decoded
//!              -> ServerFailed | ClientFailed
//!              -> AuthPending -> Refreshing -> Replayed | RefreshFailed
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

use streamline_core::{
    AcknowledgedByApi, AuthFailureKind, CustomBaseUrl, Message, RequestDescriptor, ResponseClass,
    ServiceConfiguration, classify, is_success,
};

use crate::auth::{AuthorizationProvider, CallChain, RefreshCoordinator, RefreshReplay};
use crate::builder::{BuiltRequest, RequestBuilder, RequestInterceptor};
use crate::error::{DispatchError, FailureKind, TransportError};
use crate::metrics::{MetricsCollector, TaskMetrics};
use crate::transport::{Transport, TransportResponse};

/// Directory under the platform data dir used when none is configured.
const DOWNLOAD_SUBDIR: &str = "streamline";

/// Runs calls for one service with a snapshot of its settings.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    config: Arc<ServiceConfiguration>,
    metrics: Arc<MetricsCollector>,
    refresh: Arc<RefreshCoordinator>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    custom_url: Option<CustomBaseUrl>,
    authorization: Option<Arc<dyn AuthorizationProvider>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no interceptor, override or provider.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<ServiceConfiguration>,
        metrics: Arc<MetricsCollector>,
        refresh: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            config,
            metrics,
            refresh,
            interceptor: None,
            custom_url: None,
            authorization: None,
        }
    }

    /// Sets the interceptor.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Option<Arc<dyn RequestInterceptor>>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn with_custom_url(mut self, custom_url: Option<CustomBaseUrl>) -> Self {
        self.custom_url = custom_url;
        self
    }

    /// Sets the authorization provider.
    #[must_use]
    pub fn with_authorization(
        mut self,
        authorization: Option<Arc<dyn AuthorizationProvider>>,
    ) -> Self {
        self.authorization = authorization;
        self
    }

    /// Configuration used to build requests.
    pub fn config(&self) -> &ServiceConfiguration {
        &self.config
    }

    pub(crate) fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Runs `descriptor` and decodes the success body into `T`.
    ///
    /// An empty success body decodes as JSON `null`, so `Option<T>` and
    /// [`streamline_core::EmptyModel`] accept it.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; see [`DispatchError`].
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<T, DispatchError> {
        let body = self.fetch_raw(descriptor).await?;
        decode(&body).inspect_err(|e| warn!(path = %descriptor.path(), error = %e, "Decode failed"))
    }

    /// Runs `descriptor` and returns the raw success body.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; see [`DispatchError`].
    #[instrument(skip(self, descriptor), fields(method = %descriptor.method(), path = %descriptor.path()))]
    pub async fn fetch_raw(&self, descriptor: &RequestDescriptor) -> Result<Vec<u8>, DispatchError> {
        let chain = CallChain::new();
        let result = self.attempt(descriptor, &chain).await;
        match &result {
            Ok(body) => info!(bytes = body.len(), refreshed = chain.is_refreshing(), "Request succeeded"),
            Err(err) => log_failure(err),
        }
        result
    }

    /// Downloads `descriptor` into the download directory as `file_name`,
    /// replacing an existing file. Returns the final path.
    ///
    /// Downloads do not take part in the refresh protocol.
    ///
    /// # Errors
    ///
    /// Any non-2xx status yields [`DispatchError::Client`] with an
    /// acknowledged "unknown error" body.
    #[instrument(skip(self, descriptor), fields(path = %descriptor.path()))]
    pub async fn download(
        &self,
        descriptor: &RequestDescriptor,
        file_name: &str,
    ) -> Result<PathBuf, DispatchError> {
        let file_name = sanitize_file_name(file_name)?;
        let request = self.build(descriptor)?;
        let task = TaskMetrics::start();
        let file = match self.transport.download(&request).await {
            Ok(file) => file,
            Err(err) => return Err(self.transport_failure(&request, task, err)),
        };
        self.metrics
            .collect(&request.url, Some(file.status), &file.metrics);

        if !is_success(file.status) {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                debug!(error = %e, "Could not remove temporary download");
            }
            let err = DispatchError::Client {
                status: file.status,
                acknowledged: Some(AcknowledgedByApi::new(
                    file.status,
                    Message::UnknownError.text(self.config.language),
                )),
            };
            log_failure(&err);
            return Err(err);
        }

        let dir = self.download_dir()?;
        tokio::fs::create_dir_all(&dir).await?;
        let destination = dir.join(file_name);
        if tokio::fs::try_exists(&destination).await? {
            tokio::fs::remove_file(&destination).await?;
        }
        if let Err(e) = tokio::fs::rename(&file.path, &destination).await {
            // Temp dir may sit on another filesystem
            debug!(error = %e, "Rename failed, copying download instead");
            tokio::fs::copy(&file.path, &destination).await?;
            tokio::fs::remove_file(&file.path).await?;
        }

        info!(destination = %destination.display(), "Download stored");
        Ok(destination)
    }

    // ========================================================================
    // Protocol
    // ========================================================================

    pub(crate) fn build(&self, descriptor: &RequestDescriptor) -> Result<BuiltRequest, DispatchError> {
        RequestBuilder::build(
            descriptor,
            &self.config,
            self.custom_url.as_ref(),
            self.interceptor.as_deref(),
        )
    }

    /// Builds, sends and records metrics. No classification.
    pub(crate) async fn send(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<TransportResponse, DispatchError> {
        let request = self.build(descriptor)?;
        debug!(method = %request.method, url = %request.url, "Sending request");
        let task = TaskMetrics::start();
        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(err) => return Err(self.transport_failure(&request, task, err)),
        };
        self.metrics
            .collect(&request.url, Some(response.status), &response.metrics);
        debug!(status = response.status, "Response received");
        Ok(response)
    }

    /// Reports a task that ended without a response as a metric with no
    /// status.
    fn transport_failure(
        &self,
        request: &BuiltRequest,
        mut task: TaskMetrics,
        err: TransportError,
    ) -> DispatchError {
        let sent = request.body.as_ref().map_or(0, |b| b.len() as u64);
        task.fail(request.url.clone(), sent);
        self.metrics.collect(&request.url, None, &task);
        debug!(url = %request.url, error = %err, "Transport failed");
        err.into()
    }

    async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        chain: &CallChain,
    ) -> Result<Vec<u8>, DispatchError> {
        let generation = self.refresh.generation();
        let response = self.send(descriptor).await?;

        match classify(response.status) {
            ResponseClass::AuthRequired(kind) => {
                self.refresh_and_replay(descriptor, chain, kind, generation, response)
                    .await
            }
            _ => Self::settle(response),
        }
    }

    async fn refresh_and_replay(
        &self,
        descriptor: &RequestDescriptor,
        chain: &CallChain,
        kind: AuthFailureKind,
        generation: u64,
        response: TransportResponse,
    ) -> Result<Vec<u8>, DispatchError> {
        let Some(provider) = self.authorization.clone() else {
            return Err(DispatchError::AuthorizationProviderMissing);
        };
        if !chain.begin_refresh() {
            return Self::settle(response);
        }

        let guard = self.refresh.acquire().await;
        if self.refresh.generation() != generation {
            drop(guard);
            debug!(kind = %kind, "Credentials changed while in flight, replaying without refresh");
            return Self::settle(self.send(descriptor).await?);
        }

        warn!(kind = %kind, status = response.status, "Authorization required, refreshing credentials");
        let replay = RefreshReplay::new(self.clone(), descriptor.clone(), kind, provider.clone(), guard);
        let outcome = provider.refresh_token(kind, replay).await?;
        Ok(outcome.into_body())
    }

    /// Terminal classification: success body or a classified error. Never
    /// refreshes.
    pub(crate) fn settle(response: TransportResponse) -> Result<Vec<u8>, DispatchError> {
        let status = response.status;
        match classify(status) {
            ResponseClass::Success => Ok(response.body),
            ResponseClass::AuthRequired(kind) => Err(DispatchError::AuthFailure {
                kind,
                status,
                acknowledged: AcknowledgedByApi::from_body(&response.body),
            }),
            ResponseClass::ServerError => Err(DispatchError::Server { status }),
            ResponseClass::ClientError => Err(DispatchError::Client {
                status,
                acknowledged: AcknowledgedByApi::from_body(&response.body),
            }),
        }
    }

    fn download_dir(&self) -> Result<PathBuf, DispatchError> {
        self.config
            .download_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join(DOWNLOAD_SUBDIR)))
            .ok_or_else(|| {
                DispatchError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no download directory available",
                ))
            })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.config.base_url)
            .field("custom_url", &self.custom_url)
            .field("has_interceptor", &self.interceptor.is_some())
            .field("has_authorization", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, DispatchError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(DispatchError::Decode)
}

fn sanitize_file_name(file_name: &str) -> Result<&str, DispatchError> {
    Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| *name == file_name)
        .ok_or_else(|| {
            DispatchError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid file name: {file_name}"),
            ))
        })
}

fn log_failure(err: &DispatchError) {
    match err.kind() {
        FailureKind::Server => error!(status = ?err.status(), error = %err, "Server error"),
        FailureKind::Transport => warn!(error = %err, "Network failure"),
        FailureKind::Configuration => error!(error = %err, "Request setup failure"),
        FailureKind::Auth | FailureKind::Client | FailureKind::Decode => {
            warn!(status = ?err.status(), error = %err, "Request failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
