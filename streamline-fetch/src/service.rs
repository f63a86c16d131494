//! Service facade and factory.
//!
//! A [`Service`] owns its transport and per-service settings. Every call
//! takes a snapshot of the settings, so reconfiguring a service never
//! affects calls already in flight.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use streamline_core::{
    ApiError, CustomBaseUrl, NetworkMetric, RequestDescriptor, ServiceConfiguration,
};

use crate::auth::{AuthorizationProvider, RefreshCoordinator};
use crate::builder::RequestInterceptor;
use crate::connectivity::{AlwaysOnline, ConnectivityGate, ConnectivityObserver, NetworkStatus};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, TransportError};
use crate::host::http::HttpTransport;
use crate::identity::IdentityProvider;
use crate::metrics::MetricsCollector;
use crate::session::SessionProfile;
use crate::transport::Transport;

// ============================================================================
// Settings
// ============================================================================

/// Mutable per-service collaborators, guarded by one lock.
#[derive(Clone, Default)]
struct ServiceSettings {
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    authorization: Option<Arc<dyn AuthorizationProvider>>,
    custom_url: Option<CustomBaseUrl>,
    certificate: Option<Arc<dyn IdentityProvider>>,
    observer: Option<Arc<dyn ConnectivityObserver>>,
}

// ============================================================================
// Service
// ============================================================================

/// Public entry point for API calls.
pub struct Service {
    config: Arc<ServiceConfiguration>,
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsCollector>,
    refresh: Arc<RefreshCoordinator>,
    gate: ConnectivityGate,
    profile: SessionProfile,
    settings: RwLock<ServiceSettings>,
}

impl Service {
    /// Creates a service over `transport`.
    pub fn new(
        config: Arc<ServiceConfiguration>,
        transport: Arc<dyn Transport>,
        gate: ConnectivityGate,
    ) -> Self {
        Self {
            config,
            transport,
            metrics: Arc::new(MetricsCollector::new()),
            refresh: Arc::new(RefreshCoordinator::new()),
            gate,
            profile: SessionProfile::default(),
            settings: RwLock::new(ServiceSettings::default()),
        }
    }

    /// Configuration shared by this service.
    pub fn config(&self) -> &ServiceConfiguration {
        &self.config
    }

    // ========================================================================
    // Chainable setup
    // ========================================================================

    /// Sets the session preset used when no observer reports one.
    #[must_use]
    pub fn session_profile(mut self, profile: SessionProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the request interceptor.
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.settings.get_mut().interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Sets the authorization provider.
    #[must_use]
    pub fn authorization(mut self, provider: Arc<dyn AuthorizationProvider>) -> Self {
        self.settings.get_mut().authorization = Some(provider);
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn custom_url(mut self, custom_url: CustomBaseUrl) -> Self {
        self.settings.get_mut().custom_url = Some(custom_url);
        self
    }

    /// Sets the client identity source used for TLS client authentication.
    #[must_use]
    pub fn certificate(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.transport.set_identity_provider(Some(provider.clone()));
        self.settings.get_mut().certificate = Some(provider);
        self
    }

    /// Sets the connectivity observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ConnectivityObserver>) -> Self {
        self.transport.set_connectivity_observer(Some(observer.clone()));
        self.settings.get_mut().observer = Some(observer);
        self
    }

    // ========================================================================
    // Runtime reconfiguration
    // ========================================================================

    /// Replaces the request interceptor.
    pub async fn set_interceptor(&self, interceptor: Option<Arc<dyn RequestInterceptor>>) {
        self.settings.write().await.interceptor = interceptor;
    }

    /// Replaces the authorization provider.
    pub async fn set_authorization(&self, provider: Option<Arc<dyn AuthorizationProvider>>) {
        self.settings.write().await.authorization = provider;
    }

    /// Replaces the base URL override.
    pub async fn set_custom_url(&self, custom_url: Option<CustomBaseUrl>) {
        self.settings.write().await.custom_url = custom_url;
    }

    /// Replaces the client identity source.
    pub async fn set_certificate(&self, provider: Option<Arc<dyn IdentityProvider>>) {
        let mut settings = self.settings.write().await;
        self.transport.set_identity_provider(provider.clone());
        settings.certificate = provider;
    }

    /// Replaces the connectivity observer.
    pub async fn set_observer(&self, observer: Option<Arc<dyn ConnectivityObserver>>) {
        let mut settings = self.settings.write().await;
        self.transport.set_connectivity_observer(observer.clone());
        settings.observer = observer;
    }

    /// Registers the callback receiving one metric per completed network
    /// task. Replaces any previous callback.
    pub fn on_metric(&self, callback: impl Fn(NetworkMetric) + Send + Sync + 'static) {
        self.metrics.set_observer(Some(Arc::new(callback)));
    }

    /// Stops metric delivery.
    pub fn clear_metric_observer(&self) {
        self.metrics.set_observer(None);
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Runs `descriptor` and decodes the success body into `T`.
    ///
    /// # Errors
    ///
    /// Every failure is folded into one of the four [`ApiError`] variants,
    /// with messages in the configured language.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<T, ApiError> {
        let dispatcher = self.prepare().await?;
        dispatcher
            .fetch(descriptor)
            .await
            .map_err(|e| self.api_error(e))
    }

    /// Like [`Service::fetch`], but resolves as cancelled as soon as `cancel`
    /// fires. The in-flight call is dropped.
    ///
    /// # Errors
    ///
    /// See [`Service::fetch`]. Cancellation yields [`ApiError::Info`].
    pub async fn fetch_with_cancel<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(path = %descriptor.path(), "Request cancelled by caller");
                Err(self.api_error(DispatchError::Cancelled))
            }
            result = self.fetch(descriptor) => result,
        }
    }

    /// Runs `descriptor` on a new task and hands the result to `callback`.
    pub fn spawn_fetch<T, F>(
        self: &Arc<Self>,
        descriptor: RequestDescriptor,
        callback: F,
    ) -> JoinHandle<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T, ApiError>) + Send + 'static,
    {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.fetch::<T>(&descriptor).await;
            callback(result);
        })
    }

    /// Downloads `descriptor` into the download directory as `file_name`.
    ///
    /// # Errors
    ///
    /// See [`Service::fetch`].
    pub async fn download(
        &self,
        descriptor: &RequestDescriptor,
        file_name: &str,
    ) -> Result<PathBuf, ApiError> {
        let dispatcher = self.prepare().await?;
        dispatcher
            .download(descriptor, file_name)
            .await
            .map_err(|e| self.api_error(e))
    }

    /// Checks connectivity and snapshots the settings into a dispatcher.
    async fn prepare(&self) -> Result<Dispatcher, ApiError> {
        let settings = self.settings.read().await.clone();

        let profile = settings
            .observer
            .as_ref()
            .map_or(self.profile, |o| o.configuration());
        self.gate
            .check(Some(profile))
            .map_err(|e| self.api_error(e))?;

        Ok(Dispatcher::new(
            self.transport.clone(),
            self.config.clone(),
            self.metrics.clone(),
            self.refresh.clone(),
        )
        .with_interceptor(settings.interceptor)
        .with_custom_url(settings.custom_url)
        .with_authorization(settings.authorization))
    }

    fn api_error(&self, err: DispatchError) -> ApiError {
        err.into_api_error(self.config.language)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// Former name of [`Service`].
#[deprecated(note = "use `Service`")]
pub type NsService = Service;

/// Former name of [`ApiError`].
#[deprecated(note = "use `ApiError`")]
pub type NsApiError = ApiError;

// ============================================================================
// Factory
// ============================================================================

/// Wires services from a configuration.
#[derive(Clone)]
pub struct ServiceFactory {
    config: Arc<ServiceConfiguration>,
    profile: SessionProfile,
    network: Arc<dyn NetworkStatus>,
}

impl ServiceFactory {
    /// Creates a factory for `config`.
    pub fn new(config: impl Into<Arc<ServiceConfiguration>>) -> Self {
        Self {
            config: config.into(),
            profile: SessionProfile::default(),
            network: Arc::new(AlwaysOnline),
        }
    }

    /// Sets the session preset of HTTP services.
    #[must_use]
    pub fn with_profile(mut self, profile: SessionProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the network status read by the connectivity gate and the
    /// transport.
    #[must_use]
    pub fn with_network_status(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = network;
        self
    }

    /// Builds a service over a reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn make_http_service(&self) -> Result<Service, TransportError> {
        let transport = HttpTransport::builder()
            .profile(self.profile)
            .network_status(self.network.clone())
            .build()?;
        Ok(self.make_http_service_with(Arc::new(transport)))
    }

    /// Builds a service over `transport`.
    pub fn make_http_service_with(&self, transport: Arc<dyn Transport>) -> Service {
        Service::new(
            self.config.clone(),
            transport,
            ConnectivityGate::new(self.network.clone()),
        )
        .session_profile(self.profile)
    }
}

impl fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFactory")
            .field("config", &self.config)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;
    use streamline_core::{AuthFailureKind, EmptyModel, Language};
    use url::Url;

    use crate::auth::{RefreshReplay, ReplayOutcome};
    use crate::builder::BuiltRequest;
    use crate::connectivity::SharedNetworkStatus;
    use crate::transport::scripted::ScriptedTransport;

    #[derive(Debug, Deserialize)]
    struct Post {
        id: u32,
    }

    struct BackgroundObserver;

    impl ConnectivityObserver for BackgroundObserver {
        fn configuration(&self) -> SessionProfile {
            SessionProfile::AverageBackground
        }

        fn network_unavailable(&self, _url: &Url) {}
    }

    fn factory() -> ServiceFactory {
        ServiceFactory::new(ServiceConfiguration::new("https://api.example.com"))
    }

    #[tokio::test]
    async fn test_offline_foreground_skips_transport() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, "{}"));
        let service = factory()
            .with_network_status(Arc::new(SharedNetworkStatus::offline()))
            .make_http_service_with(transport.clone());

        let err = service
            .fetch::<EmptyModel>(&RequestDescriptor::get("posts"))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NoInternetConnection);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_offline_background_goes_to_transport() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, r#"{"id": 4}"#));
        let service = factory()
            .with_network_status(Arc::new(SharedNetworkStatus::offline()))
            .make_http_service_with(transport.clone())
            .observer(Arc::new(BackgroundObserver));

        let post: Post = service.fetch(&RequestDescriptor::get("posts")).await.unwrap();
        assert_eq!(post.id, 4);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_background_profile_goes_to_transport() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, r#"{"id": 5}"#));
        let service = factory()
            .with_profile(SessionProfile::AverageBackground)
            .with_network_status(Arc::new(SharedNetworkStatus::offline()))
            .make_http_service_with(transport.clone());

        let post: Post = service.fetch(&RequestDescriptor::get("posts")).await.unwrap();
        assert_eq!(post.id, 5);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_observer_profile_overrides_factory_profile() {
        struct ForegroundObserver;

        impl ConnectivityObserver for ForegroundObserver {
            fn configuration(&self) -> SessionProfile {
                SessionProfile::NoBackground
            }

            fn network_unavailable(&self, _url: &Url) {}
        }

        let transport = Arc::new(ScriptedTransport::new().respond(200, "{}"));
        let service = factory()
            .with_profile(SessionProfile::LightBackground)
            .with_network_status(Arc::new(SharedNetworkStatus::offline()))
            .make_http_service_with(transport.clone())
            .observer(Arc::new(ForegroundObserver));

        let err = service
            .fetch::<EmptyModel>(&RequestDescriptor::get("posts"))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NoInternetConnection);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_interceptor_and_custom_url() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, "{}"));
        let service = factory()
            .make_http_service_with(transport.clone())
            .interceptor(|request: &mut BuiltRequest| {
                request.set_header("authorization", "Bearer abc");
            })
            .custom_url(CustomBaseUrl::new("https://staging.example.com").with_port(8443));

        let _: EmptyModel = service.fetch(&RequestDescriptor::get("posts")).await.unwrap();
        let sent = &transport.requests()[0];
        assert_eq!(sent.url.as_str(), "https://staging.example.com:8443/posts");
        assert_eq!(sent.header("Authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_runtime_reconfiguration() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(200, "{}")
                .respond(200, "{}"),
        );
        let service = factory().make_http_service_with(transport.clone());

        let _: EmptyModel = service.fetch(&RequestDescriptor::get("a")).await.unwrap();
        service
            .set_custom_url(Some(CustomBaseUrl::new("http://localhost")))
            .await;
        let _: EmptyModel = service.fetch(&RequestDescriptor::get("b")).await.unwrap();

        let urls: Vec<_> = transport
            .requests()
            .iter()
            .map(|r| r.url.to_string())
            .collect();
        assert_eq!(urls, vec!["https://api.example.com/a", "http://localhost/b"]);
    }

    #[tokio::test]
    async fn test_errors_use_configured_language() {
        let config = ServiceConfiguration::builder("https://api.example.com")
            .language(Language::PtBr)
            .build()
            .unwrap();
        let transport = Arc::new(ScriptedTransport::new().respond(500, ""));
        let service = ServiceFactory::new(config).make_http_service_with(transport);

        let err = service
            .fetch::<EmptyModel>(&RequestDescriptor::get("posts"))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Info("Erro interno do servidor.".into()));
    }

    #[tokio::test]
    async fn test_missing_provider_surfaces_info() {
        let transport = Arc::new(ScriptedTransport::new().respond(401, ""));
        let service = factory().make_http_service_with(transport);

        let err = service
            .fetch::<EmptyModel>(&RequestDescriptor::get("posts"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Info("Authorization provider not implemented.".into())
        );
    }

    #[tokio::test]
    async fn test_cancelled_call() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, "{}"));
        let service = factory().make_http_service_with(transport);
        let token = CancellationToken::new();
        token.cancel();

        let err = service
            .fetch_with_cancel::<EmptyModel>(&RequestDescriptor::get("posts"), &token)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Info("The request was cancelled.".into()));
    }

    #[tokio::test]
    async fn test_spawn_fetch_invokes_callback() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, r#"{"id": 9}"#));
        let service = Arc::new(factory().make_http_service_with(transport));
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle =
            service.spawn_fetch::<Post, _>(RequestDescriptor::get("posts"), move |result| {
                let _ = tx.send(result.map(|post| post.id));
            });
        handle.await.unwrap();
        assert_eq!(rx.await.unwrap(), Ok(9));
    }

    #[tokio::test]
    async fn test_metric_callback() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, "{}"));
        let service = factory().make_http_service_with(transport);
        let seen: Arc<Mutex<Vec<NetworkMetric>>> = Arc::default();
        let sink = seen.clone();
        service.on_metric(move |metric| sink.lock().unwrap().push(metric));

        let _: EmptyModel = service.fetch(&RequestDescriptor::get("posts")).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url_path, "/posts");
        assert_eq!(seen[0].status_code, Some(200));
    }

    #[tokio::test]
    async fn test_failed_task_still_reports_metric() {
        let transport = Arc::new(
            ScriptedTransport::new().fail(TransportError::Timeout(Duration::from_secs(60))),
        );
        let service = factory().make_http_service_with(transport);
        let seen: Arc<Mutex<Vec<NetworkMetric>>> = Arc::default();
        let sink = seen.clone();
        service.on_metric(move |metric| sink.lock().unwrap().push(metric));

        let err = service
            .fetch::<EmptyModel>(&RequestDescriptor::get("posts"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::UnknownError(Some("Request timed out after 60s".into()))
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url_path, "/posts");
        assert_eq!(seen[0].status_code, None);
    }

    /// Provider whose first refresh never completes.
    #[derive(Default)]
    struct StallingProvider {
        invocations: AtomicUsize,
    }

    #[async_trait]
    impl AuthorizationProvider for StallingProvider {
        async fn refresh_token(
            &self,
            _kind: AuthFailureKind,
            replay: RefreshReplay,
        ) -> Result<ReplayOutcome, DispatchError> {
            if self.invocations.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            replay.call(RequestDescriptor::post("auth/refresh")).await
        }

        async fn save(&self, _data: &[u8], _kind: AuthFailureKind) {}
    }

    #[tokio::test]
    async fn test_cancel_during_refresh_releases_refresh() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(401, "")
                .respond(401, "")
                .respond(200, r#"{"token": "new"}"#)
                .respond(200, "{}"),
        );
        let provider = Arc::new(StallingProvider::default());
        let service = factory()
            .make_http_service_with(transport.clone())
            .authorization(provider.clone());

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = service
            .fetch_with_cancel::<EmptyModel>(&RequestDescriptor::get("profile"), &token)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Info("The request was cancelled.".into()));
        assert_eq!(provider.invocations.load(Ordering::SeqCst), 1);

        let _: EmptyModel = tokio::time::timeout(
            Duration::from_secs(5),
            service.fetch(&RequestDescriptor::get("profile")),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(provider.invocations.load(Ordering::SeqCst), 2);
        assert_eq!(transport.calls(), 4);
    }
}
