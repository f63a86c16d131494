// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Streamline Fetch
//!
//! Request building, transport and dispatch for the Streamline pipeline.
//!
//! ## Pipeline
//!
//! A call flows through these pieces in order:
//!
//! - [`connectivity::ConnectivityGate`] - Fails foreground calls fast when offline
//! - [`builder::RequestBuilder`] - Turns a descriptor into a concrete request
//! - [`transport::Transport`] - Sends it and reports per-hop timing
//! - [`dispatcher::Dispatcher`] - Classifies the response, refreshes credentials on
//!   401/406 and replays the call once
//! - [`metrics::MetricsCollector`] - Emits one [`NetworkMetric`] per task
//!
//! ## Host APIs
//!
//! - [`host::http`] - reqwest transport with session presets and client identity
//! - [`host::keychain`] - Client identity stored in the system keychain
//!
//! ## Example
//!
//! ```ignore
//! use streamline_core::{RequestDescriptor, ServiceConfiguration};
//! use streamline_fetch::ServiceFactory;
//!
//! let config = ServiceConfiguration::new("https://api.example.com");
//! let service = ServiceFactory::new(config).make_http_service()?;
//!
//! let posts: Vec<Post> = service.fetch(&RequestDescriptor::get("posts")).await?;
//! ```

// Core modules
pub mod auth;
pub mod builder;
pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod identity;
pub mod metrics;
pub mod retry;
pub mod service;
pub mod session;
pub mod transport;

// Re-export key types at crate root

// Errors
pub use error::{DispatchError, FailureKind, IdentityError, TransportError};
pub use streamline_core::{ApiError, NetworkMetric};

// Request building
pub use builder::{API_KEY_HEADER, BuiltRequest, CachePolicy, RequestBuilder, RequestInterceptor};

// Transport & host APIs
pub use host::{HttpTransport, HttpTransportBuilder, KeychainIdentityProvider};
pub use identity::{ClientIdentity, IdentityProvider, StaticIdentityProvider};
pub use session::SessionProfile;
pub use transport::{DownloadedFile, Transport, TransportResponse};

// Dispatch
pub use auth::{AuthorizationProvider, CallChain, RefreshCoordinator, RefreshReplay, ReplayOutcome};
pub use connectivity::{
    AlwaysOnline, ConnectivityGate, ConnectivityObserver, NetworkStatus, SharedNetworkStatus,
};
pub use dispatcher::Dispatcher;
pub use metrics::{MetricObserver, MetricsCollector, TaskMetrics, TransactionMetrics};
pub use retry::ConnectivityRetry;
pub use service::{Service, ServiceFactory};
