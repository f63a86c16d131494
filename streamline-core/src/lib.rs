// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Streamline Core
//!
//! Core types for the Streamline request pipeline.
//!
//! This crate holds the plain values shared by every other Streamline
//! crate. Nothing in here performs I/O beyond reading a configuration file.
//!
//! ## Key Types
//!
//! ### Requests
//! - [`RequestDescriptor`] - One logical API call (method, path, body, query)
//! - [`HttpMethod`] - GET, POST, PUT or DELETE
//! - [`QueryKey`] - Well-known query keys plus custom ones
//! - [`ApiPath`] - Anything usable as a path key
//!
//! ### Configuration
//! - [`ServiceConfiguration`] - Base URL, port, API key and language
//! - [`CustomBaseUrl`] - Per-service base URL override
//! - [`Language`] - Supported message languages
//!
//! ### Responses
//! - [`ResponseClass`] - Result of [`classify`]
//! - [`ApiError`] - The four caller-visible failures
//! - [`NetworkMetric`] - Timing snapshot of one network task
//! - [`Pagination`] - Generic list envelope

pub mod config;
pub mod descriptor;
pub mod error;
pub mod i18n;
pub mod metric;
pub mod models;
pub mod status;

// Re-export error types
pub use error::{AcknowledgedByApi, ApiError, CoreError};

// Requests
pub use descriptor::{ApiPath, HttpMethod, QueryKey, RequestDescriptor};

// Configuration
pub use config::{CustomBaseUrl, DEFAULT_USER_AGENT, Language, ServiceConfiguration};

// Responses
pub use i18n::Message;
pub use metric::NetworkMetric;
pub use models::{EmptyModel, Links, Metadata, Pagination};
pub use status::{AuthFailureKind, ResponseClass, classify, is_success};
