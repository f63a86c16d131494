//! Dispatch, transport and identity error types.

use std::time::Duration;
use thiserror::Error;

use streamline_core::{AcknowledgedByApi, ApiError, AuthFailureKind, Language, Message};

// ============================================================================
// Failure Kind
// ============================================================================

/// Coarse failure category, used for logging and by callers that need to
/// tell setup bugs apart from runtime faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection, TLS, timeout or cancellation.
    Transport,
    /// 401/406 that survived the refresh protocol.
    Auth,
    /// 500.
    Server,
    /// Any other non-success status.
    Client,
    /// Body did not match the expected model.
    Decode,
    /// Missing collaborator or invalid request setup.
    Configuration,
}

// ============================================================================
// Dispatch Error
// ============================================================================

/// Error produced by the dispatcher before it is folded into [`ApiError`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credentials were still rejected after one refresh.
    #[error("Authorization failed ({kind}) with status {status}")]
    AuthFailure {
        /// Why the backend rejected the call.
        kind: AuthFailureKind,
        /// Status code of the rejected call.
        status: u16,
        /// Structured error body, when the backend sent one.
        acknowledged: Option<AcknowledgedByApi>,
    },

    /// The server answered 500.
    #[error("Server error with status {status}")]
    Server {
        /// Status code.
        status: u16,
    },

    /// Any other non-success status.
    #[error("Client error with status {status}")]
    Client {
        /// Status code.
        status: u16,
        /// Structured error body, when the backend sent one.
        acknowledged: Option<AcknowledgedByApi>,
    },

    /// The success body did not decode into the requested model.
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    /// A 401/406 arrived and no authorization provider is configured.
    #[error("Authorization provider not implemented")]
    AuthorizationProviderMissing,

    /// The request URL could not be composed.
    #[error("Invalid URL: {0}")]
    UrlConstruction(String),

    /// The connectivity gate found no network path.
    #[error("No network connection")]
    NoConnectivity,

    /// The caller cancelled the call.
    #[error("Request cancelled")]
    Cancelled,

    /// Moving a downloaded file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request body could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl DispatchError {
    /// Returns the failure category.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) | Self::NoConnectivity | Self::Cancelled | Self::Io(_) => {
                FailureKind::Transport
            }
            Self::AuthFailure { .. } => FailureKind::Auth,
            Self::Server { .. } => FailureKind::Server,
            Self::Client { .. } => FailureKind::Client,
            Self::Decode(_) => FailureKind::Decode,
            Self::AuthorizationProviderMissing
            | Self::UrlConstruction(_)
            | Self::Serialization(_) => FailureKind::Configuration,
        }
    }

    /// Status code of the response that caused the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthFailure { status, .. }
            | Self::Server { status }
            | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Folds the error into one of the four caller-visible variants, with
    /// messages in `language`.
    pub fn into_api_error(self, language: Language) -> ApiError {
        match self {
            Self::Transport(err) if err.is_cancelled() || err.is_connectivity() => {
                ApiError::NoInternetConnection
            }
            Self::NoConnectivity => ApiError::NoInternetConnection,
            Self::Transport(err) => ApiError::UnknownError(Some(err.to_string())),
            Self::AuthFailure { acknowledged, .. } | Self::Client { acknowledged, .. } => {
                acknowledged.map_or(ApiError::UnknownError(None), ApiError::AcknowledgedByApi)
            }
            Self::Server { .. } => {
                ApiError::Info(Message::InternalServerError.text(language).to_string())
            }
            Self::Decode(_) => {
                ApiError::UnknownError(Some(Message::DecodeFailed.text(language).to_string()))
            }
            Self::AuthorizationProviderMissing => {
                ApiError::Info(Message::AuthorizationProviderMissing.text(language).to_string())
            }
            Self::UrlConstruction(_) => {
                ApiError::UnknownError(Some(Message::InvalidUrl.text(language).to_string()))
            }
            Self::Cancelled => ApiError::Info(Message::Cancelled.text(language).to_string()),
            Self::Io(err) => ApiError::UnknownError(Some(err.to_string())),
            Self::Serialization(err) => ApiError::UnknownError(Some(err.to_string())),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        err.into_api_error(Language::default())
    }
}

// ============================================================================
// Transport Error
// ============================================================================

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection could be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// TLS handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The request or resource timeout expired.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The task was cancelled while waiting for connectivity.
    #[error("Request cancelled")]
    Cancelled,

    /// The request could not be sent as built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The response could not be read.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("Client build failed: {0}")]
    Build(String),

    /// IO error while writing a download.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns true if the transport cancelled the task itself.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the failure means the network path is down.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(Duration::ZERO);
        }
        if err.is_builder() {
            return Self::InvalidRequest(err.to_string());
        }
        let detail = error_chain(&err);
        if err.is_connect() {
            let lower = detail.to_ascii_lowercase();
            if lower.contains("certificate") || lower.contains("tls") || lower.contains("handshake")
            {
                return Self::Tls(detail);
            }
            return Self::Connection(detail);
        }
        if err.is_body() || err.is_decode() {
            return Self::InvalidResponse(detail);
        }
        Self::Connection(detail)
    }
}

/// Joins an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

// ============================================================================
// Identity Error
// ============================================================================

/// Error type for client identity lookups.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Access to the secure store was denied.
    #[error("Access denied to keychain")]
    AccessDenied,

    /// The secure store failed.
    #[error("Platform error: {0}")]
    Platform(String),

    /// The stored identity is not a usable PEM bundle.
    #[error("Invalid identity: {0}")]
    InvalidPem(String),

    /// Reading an identity file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("Keychain error: {0}")]
    Other(String),
}

impl From<keyring::Error> for IdentityError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::PlatformFailure(e) => IdentityError::Platform(e.to_string()),
            keyring::Error::NoStorageAccess(_) => IdentityError::AccessDenied,
            _ => IdentityError::Other(err.to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_maps_to_no_internet() {
        let err: ApiError = DispatchError::NoConnectivity.into();
        assert_eq!(err, ApiError::NoInternetConnection);

        let err: ApiError = DispatchError::Transport(TransportError::Cancelled).into();
        assert_eq!(err, ApiError::NoInternetConnection);

        let err: ApiError =
            DispatchError::Transport(TransportError::Connection("refused".into())).into();
        assert_eq!(err, ApiError::NoInternetConnection);
    }

    #[test]
    fn test_other_transport_errors_are_unknown() {
        let err: ApiError = DispatchError::Transport(TransportError::Tls("bad cert".into())).into();
        assert!(matches!(err, ApiError::UnknownError(Some(_))));
    }

    #[test]
    fn test_caller_cancel_is_info() {
        let err = DispatchError::Cancelled.into_api_error(Language::PtBr);
        assert_eq!(err, ApiError::Info("A requisição foi cancelada.".into()));
    }

    #[test]
    fn test_client_error_mapping() {
        let err: ApiError = DispatchError::Client {
            status: 422,
            acknowledged: Some(AcknowledgedByApi::new(422, "invalid")),
        }
        .into();
        assert_eq!(err.status_code(), Some(422));

        let err: ApiError = DispatchError::Client {
            status: 404,
            acknowledged: None,
        }
        .into();
        assert_eq!(err, ApiError::UnknownError(None));
    }

    #[test]
    fn test_configuration_failures() {
        let err = DispatchError::AuthorizationProviderMissing;
        assert_eq!(err.kind(), FailureKind::Configuration);
        assert_eq!(
            ApiError::from(err),
            ApiError::Info("Authorization provider not implemented.".into())
        );
    }

    #[test]
    fn test_server_error_is_info() {
        let err = DispatchError::Server { status: 500 };
        assert_eq!(err.kind(), FailureKind::Server);
        assert_eq!(err.status(), Some(500));
        assert_eq!(
            err.into_api_error(Language::EnUs),
            ApiError::Info("Internal server error.".into())
        );
    }
}
