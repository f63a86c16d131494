//! Error types for Streamline.
//!
//! [`ApiError`] is the only error callers of the service facade ever see.
//! Every internal failure is folded into one of its four variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::Language;
use crate::i18n::Message;

// ============================================================================
// Acknowledged By API
// ============================================================================

/// Structured error body returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgedByApi {
    /// Status code reported by the backend.
    pub status_code: u16,
    /// Human-readable message from the backend.
    pub message: String,
}

impl AcknowledgedByApi {
    /// Creates an acknowledged error.
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// Parses a response body, returning `None` if it is not a structured error.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

// ============================================================================
// API Error
// ============================================================================

/// Caller-visible error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Unclassified failure with an optional detail message.
    UnknownError(Option<String>),
    /// Informational message describing the failure.
    Info(String),
    /// The backend answered with a structured error.
    AcknowledgedByApi(AcknowledgedByApi),
    /// No network path was available.
    NoInternetConnection,
}

impl ApiError {
    /// Returns the message to show the user in `language`.
    pub fn message(&self, language: Language) -> String {
        match self {
            Self::UnknownError(Some(message)) | Self::Info(message) => message.clone(),
            Self::UnknownError(None) => Message::UnknownError.text(language).to_string(),
            Self::AcknowledgedByApi(ack) => ack.message.clone(),
            Self::NoInternetConnection => Message::NoInternetConnection.text(language).to_string(),
        }
    }

    /// Status code reported by the backend, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::AcknowledgedByApi(ack) => Some(ack.status_code),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message(Language::EnUs))
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// Core Error
// ============================================================================

/// Errors raised inside the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
