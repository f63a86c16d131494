//! HTTP transport backed by reqwest.
//!
//! Redirects are followed here instead of inside reqwest so every hop is
//! timed as its own [`TransactionMetrics`].

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, Method, Response, header, redirect};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use url::Url;

use streamline_core::HttpMethod;
use streamline_core::status::{self, SEE_OTHER};

use crate::builder::BuiltRequest;
use crate::connectivity::{AlwaysOnline, ConnectivityObserver, NetworkStatus};
use crate::error::TransportError;
use crate::identity::IdentityProvider;
use crate::metrics::{TaskMetrics, TransactionMetrics};
use crate::retry::ConnectivityRetry;
use crate::session::SessionProfile;
use crate::transport::{DownloadedFile, Transport, TransportResponse};

/// Maximum number of redirects followed per task.
pub const MAX_REDIRECTS: usize = 10;

static NEXT_DOWNLOAD: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// HTTP Transport
// ============================================================================

/// Transport sending requests with reqwest.
pub struct HttpTransport {
    client: RwLock<Client>,
    profile: SessionProfile,
    network: Arc<dyn NetworkStatus>,
    observer: RwLock<Option<Arc<dyn ConnectivityObserver>>>,
    retry: ConnectivityRetry,
}

impl HttpTransport {
    /// Creates a transport for `profile` with default collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the TLS backend cannot be set up.
    pub fn new(profile: SessionProfile) -> Result<Self, TransportError> {
        Self::builder().profile(profile).build()
    }

    /// Creates a builder.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Session preset of this transport.
    pub fn profile(&self) -> SessionProfile {
        self.profile
    }

    fn client(&self) -> Client {
        match self.client.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn observer(&self) -> Option<Arc<dyn ConnectivityObserver>> {
        match self.observer.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Sends `request`, following redirects, and returns the final response.
    async fn execute(
        &self,
        request: &BuiltRequest,
    ) -> Result<(Response, TaskMetrics), TransportError> {
        let mut task = TaskMetrics::start();
        let mut method = request.method;
        let mut url = request.url.clone();
        let mut body = request.body.clone();
        let mut headers = request.headers.clone();

        loop {
            let sent = body.as_ref().map_or(0, |b| b.len() as u64);
            let mut hop = TransactionMetrics::start(url.clone(), sent);
            let response = match self.send_hop(method, &url, &headers, body.as_ref()).await {
                Ok(response) => response,
                // Only a missing network path waits; a refused connection fails
                Err(err) if err.is_connectivity() && !self.network.is_connected() => {
                    self.wait_for_connectivity(&url, &task).await?;
                    continue;
                }
                Err(err) => return Err(err),
            };
            let status = response.status().as_u16();

            if !status::is_redirect(status) {
                hop.finish(status, response.content_length().unwrap_or(0));
                task.transactions.push(hop);
                return Ok((response, task));
            }

            hop.finish(status, response.content_length().unwrap_or(0));
            task.transactions.push(hop);
            if task.transactions.len() > MAX_REDIRECTS {
                return Err(TransportError::InvalidResponse(format!(
                    "more than {MAX_REDIRECTS} redirects"
                )));
            }

            let next = redirect_target(&url, &response)?;
            debug!(status, from = %url, to = %next, "Following redirect");

            if changes_to_get(status, method) {
                method = HttpMethod::Get;
                body = None;
                headers.retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
            }
            if next.host_str() != url.host_str() {
                headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
            }
            url = next;
        }
    }

    async fn send_hop(
        &self,
        method: HttpMethod,
        url: &Url,
        headers: &[(String, String)],
        body: Option<&Vec<u8>>,
    ) -> Result<Response, TransportError> {
        let mut builder = self.client().request(to_reqwest_method(method), url.clone());
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body.clone());
        }
        builder
            .send()
            .await
            .map_err(|e| self.with_request_timeout(e.into()))
    }

    /// Stamps the per-request timeout on a timeout raised by reqwest.
    fn with_request_timeout(&self, err: TransportError) -> TransportError {
        match err {
            TransportError::Timeout(_) => TransportError::Timeout(self.profile.request_timeout()),
            err => err,
        }
    }

    /// Profile reported by the observer, else the one this transport was
    /// built with.
    fn active_profile(&self) -> SessionProfile {
        self.observer()
            .map_or(self.profile, |observer| observer.configuration())
    }

    /// Handles a connection failure: the observer is told, foreground
    /// sessions cancel, background sessions wait within the resource timeout.
    async fn wait_for_connectivity(&self, url: &Url, task: &TaskMetrics) -> Result<(), TransportError> {
        if let Some(observer) = self.observer() {
            observer.network_unavailable(url);
        }

        let profile = self.active_profile();
        if profile.is_foreground() {
            warn!(url = %url, ?profile, "Waiting for connectivity in foreground session, cancelling");
            return Err(TransportError::Cancelled);
        }

        let elapsed = task.started.elapsed();
        let budget = profile.resource_timeout().saturating_sub(elapsed);
        debug!(url = %url, ?profile, budget_secs = budget.as_secs(), "Waiting for connectivity");
        if self.retry.wait_until_connected(self.network.as_ref(), budget).await {
            Ok(())
        } else {
            Err(TransportError::Timeout(profile.resource_timeout()))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: &BuiltRequest) -> Result<TransportResponse, TransportError> {
        let (response, mut task) = self.execute(request).await?;
        let status = response.status().as_u16();
        let headers = collect_headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| self.with_request_timeout(e.into()))?
            .to_vec();

        if let Some(last) = task.transactions.last_mut() {
            last.response_bytes = body.len() as u64;
        }
        task.finish();
        debug!(status, bytes = body.len(), "Response received");

        Ok(TransportResponse {
            status,
            headers,
            body,
            metrics: task,
        })
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn download(&self, request: &BuiltRequest) -> Result<DownloadedFile, TransportError> {
        let (mut response, mut task) = self.execute(request).await?;
        let status = response.status().as_u16();

        let path = temp_download_path();
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.with_request_timeout(e.into()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(last) = task.transactions.last_mut() {
            last.response_bytes = written;
        }
        task.finish();
        debug!(status, bytes = written, path = %path.display(), "Download received");

        Ok(DownloadedFile {
            path,
            status,
            metrics: task,
        })
    }

    fn set_identity_provider(&self, provider: Option<Arc<dyn IdentityProvider>>) {
        match build_client(self.profile, provider.as_deref()) {
            Ok(client) => match self.client.write() {
                Ok(mut guard) => *guard = client,
                Err(poisoned) => *poisoned.into_inner() = client,
            },
            Err(e) => warn!(error = %e, "Failed to rebuild HTTP client, keeping previous one"),
        }
    }

    fn set_connectivity_observer(&self, observer: Option<Arc<dyn ConnectivityObserver>>) {
        match self.observer.write() {
            Ok(mut guard) => *guard = observer,
            Err(poisoned) => *poisoned.into_inner() = observer,
        }
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("profile", &self.profile)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`HttpTransport`].
#[derive(Default)]
pub struct HttpTransportBuilder {
    profile: SessionProfile,
    identity: Option<Arc<dyn IdentityProvider>>,
    network: Option<Arc<dyn NetworkStatus>>,
    observer: Option<Arc<dyn ConnectivityObserver>>,
    retry: Option<ConnectivityRetry>,
}

impl HttpTransportBuilder {
    /// Sets the session preset.
    #[must_use]
    pub fn profile(mut self, profile: SessionProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the client identity source.
    #[must_use]
    pub fn identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Sets the network status polled while waiting for connectivity.
    #[must_use]
    pub fn network_status(mut self, status: Arc<dyn NetworkStatus>) -> Self {
        self.network = Some(status);
        self
    }

    /// Sets the connectivity observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ConnectivityObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sets the backoff used while waiting for connectivity.
    #[must_use]
    pub fn retry(mut self, retry: ConnectivityRetry) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the HTTP client cannot be built.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let client = build_client(self.profile, self.identity.as_deref())?;
        Ok(HttpTransport {
            client: RwLock::new(client),
            profile: self.profile,
            network: self.network.unwrap_or_else(|| Arc::new(AlwaysOnline)),
            observer: RwLock::new(self.observer),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds a reqwest client for `profile`. An identity that cannot be loaded
/// falls back to default TLS handling.
fn build_client(
    profile: SessionProfile,
    identity: Option<&dyn IdentityProvider>,
) -> Result<Client, TransportError> {
    let mut builder = Client::builder()
        .use_rustls_tls()
        .redirect(redirect::Policy::none())
        .read_timeout(profile.request_timeout())
        .timeout(profile.resource_timeout());

    match identity.map(|provider| provider.load_client_identity()) {
        Some(Ok(Some(identity))) => match reqwest::Identity::from_pem(identity.pem()) {
            Ok(identity) => {
                debug!("Using client identity for TLS");
                builder = builder.identity(identity);
            }
            Err(e) => warn!(error = %e, "Client identity rejected, using default TLS handling"),
        },
        Some(Ok(None)) | None => debug!("No client identity, using default TLS handling"),
        Some(Err(e)) => warn!(error = %e, "Failed to load client identity, using default TLS handling"),
    }

    builder
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// 303 always switches to GET; 301/302 switch non-GET methods to GET.
/// 307/308 keep the method and body.
fn changes_to_get(status: u16, method: HttpMethod) -> bool {
    match status {
        SEE_OTHER => true,
        status::MOVED_PERMANENTLY | status::FOUND => method != HttpMethod::Get,
        _ => false,
    }
}

fn redirect_target(current: &Url, response: &Response) -> Result<Url, TransportError> {
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TransportError::InvalidResponse("redirect without location".to_string()))?;
    current
        .join(location)
        .map_err(|e| TransportError::InvalidResponse(format!("bad redirect location {location}: {e}")))
}

fn collect_headers(response: &Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn temp_download_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "streamline-{}-{}.download",
        std::process::id(),
        NEXT_DOWNLOAD.fetch_add(1, Ordering::Relaxed)
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use streamline_core::{ApiError, Language, RequestDescriptor, ServiceConfiguration};
    use tokio::io::AsyncReadExt;

    use crate::builder::RequestBuilder;
    use crate::connectivity::SharedNetworkStatus;
    use crate::error::DispatchError;

    /// Observer reporting a fixed profile and counting lost paths.
    struct RecordingObserver {
        profile: SessionProfile,
        unavailable: AtomicUsize,
    }

    impl RecordingObserver {
        fn new(profile: SessionProfile) -> Arc<Self> {
            Arc::new(Self {
                profile,
                unavailable: AtomicUsize::new(0),
            })
        }
    }

    impl ConnectivityObserver for RecordingObserver {
        fn configuration(&self) -> SessionProfile {
            self.profile
        }

        fn network_unavailable(&self, _url: &Url) {
            self.unavailable.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn request_to(port: u16) -> BuiltRequest {
        let config = ServiceConfiguration::builder("http://127.0.0.1")
            .port(port)
            .build()
            .unwrap();
        RequestBuilder::build(&RequestDescriptor::get("ping"), &config, None, None).unwrap()
    }

    #[test]
    fn test_method_switch_on_redirect() {
        assert!(changes_to_get(303, HttpMethod::Put));
        assert!(changes_to_get(302, HttpMethod::Post));
        assert!(!changes_to_get(302, HttpMethod::Get));
        assert!(!changes_to_get(307, HttpMethod::Post));
        assert!(!changes_to_get(308, HttpMethod::Delete));
    }

    #[test]
    fn test_build_for_every_profile() {
        for profile in SessionProfile::ALL {
            let transport = HttpTransport::new(profile).unwrap();
            assert_eq!(transport.profile(), profile);
        }
    }

    #[test]
    fn test_temp_paths_are_unique() {
        assert_ne!(temp_download_path(), temp_download_path());
    }

    #[test]
    fn test_observer_profile_wins_over_built_profile() {
        let transport = HttpTransport::new(SessionProfile::NoBackground).unwrap();
        assert_eq!(transport.active_profile(), SessionProfile::NoBackground);

        transport.set_connectivity_observer(Some(RecordingObserver::new(
            SessionProfile::AverageBackground,
        )));
        assert_eq!(transport.active_profile(), SessionProfile::AverageBackground);
    }

    #[test]
    fn test_reqwest_timeouts_carry_request_timeout() {
        let transport = HttpTransport::new(SessionProfile::LightBackground).unwrap();

        let err = transport.with_request_timeout(TransportError::Timeout(Duration::ZERO));
        assert!(matches!(
            err,
            TransportError::Timeout(d) if d == SessionProfile::LightBackground.request_timeout()
        ));
        assert_eq!(err.to_string(), "Request timed out after 900s");

        let err = transport.with_request_timeout(TransportError::Connection("reset".into()));
        assert!(matches!(err, TransportError::Connection(ref detail) if detail == "reset"));
    }

    #[tokio::test]
    async fn test_offline_foreground_cancels_and_notifies() {
        let observer = RecordingObserver::new(SessionProfile::NoBackground);
        let transport = HttpTransport::builder()
            .network_status(Arc::new(SharedNetworkStatus::offline()))
            .observer(observer.clone())
            .build()
            .unwrap();

        let err = transport.send(&request_to(unused_port())).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(observer.unavailable.load(Ordering::SeqCst), 1);
        assert_eq!(
            DispatchError::from(err).into_api_error(Language::EnUs),
            ApiError::NoInternetConnection
        );
    }

    #[tokio::test]
    async fn test_offline_background_waits_then_resumes() {
        let port = unused_port();
        let network = SharedNetworkStatus::offline();
        let observer = RecordingObserver::new(SessionProfile::LightBackground);
        let transport = HttpTransport::builder()
            .network_status(Arc::new(network.clone()))
            .observer(observer.clone())
            .retry(
                ConnectivityRetry::new(Duration::from_millis(5))
                    .with_max_delay(Duration::from_millis(20)),
            )
            .build()
            .unwrap();

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
                .await
                .unwrap();
            network.set_connected(true);
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let response = transport.send(&request_to(port)).await.unwrap();
        server.await.unwrap();

        assert_eq!(response.status, 204);
        assert_eq!(observer.unavailable.load(Ordering::SeqCst), 1);
        assert_eq!(response.metrics.transactions.len(), 1);
    }
}
