//! Status code constants and response classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 200 OK.
pub const OK: u16 = 200;
/// 201 Created.
pub const CREATED: u16 = 201;
/// 204 No Content.
pub const NO_CONTENT: u16 = 204;
/// 301 Moved Permanently.
pub const MOVED_PERMANENTLY: u16 = 301;
/// 302 Found.
pub const FOUND: u16 = 302;
/// 303 See Other.
pub const SEE_OTHER: u16 = 303;
/// 307 Temporary Redirect.
pub const TEMPORARY_REDIRECT: u16 = 307;
/// 308 Permanent Redirect.
pub const PERMANENT_REDIRECT: u16 = 308;
/// 400 Bad Request.
pub const BAD_REQUEST: u16 = 400;
/// 401 Unauthorized.
pub const UNAUTHORIZED: u16 = 401;
/// 403 Forbidden.
pub const FORBIDDEN: u16 = 403;
/// 404 Not Found.
pub const NOT_FOUND: u16 = 404;
/// 406 Not Acceptable. The backend uses it to signal a rejected client certificate.
pub const NOT_ACCEPTABLE: u16 = 406;
/// 500 Internal Server Error.
pub const INTERNAL_SERVER_ERROR: u16 = 500;

/// Returns true for 200..=299.
pub fn is_success(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// Returns true for redirects the transport follows itself.
pub fn is_redirect(status: u16) -> bool {
    matches!(
        status,
        MOVED_PERMANENTLY | FOUND | SEE_OTHER | TEMPORARY_REDIRECT | PERMANENT_REDIRECT
    )
}

// ============================================================================
// Auth Failure Kind
// ============================================================================

/// Why the backend asked for new credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureKind {
    /// 401.
    Unauthorized,
    /// 406.
    CertificateError,
}

impl fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("unauthorized"),
            Self::CertificateError => f.write_str("certificate error"),
        }
    }
}

// ============================================================================
// Response Class
// ============================================================================

/// Outcome category of a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx.
    Success,
    /// 401 or 406; triggers the refresh protocol.
    AuthRequired(AuthFailureKind),
    /// 500; terminal.
    ServerError,
    /// Everything else; terminal.
    ClientError,
}

/// Classifies a status code.
pub fn classify(status: u16) -> ResponseClass {
    match status {
        s if is_success(s) => ResponseClass::Success,
        UNAUTHORIZED => ResponseClass::AuthRequired(AuthFailureKind::Unauthorized),
        NOT_ACCEPTABLE => ResponseClass::AuthRequired(AuthFailureKind::CertificateError),
        INTERNAL_SERVER_ERROR => ResponseClass::ServerError,
        _ => ResponseClass::ClientError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        for status in 200..=299 {
            assert_eq!(classify(status), ResponseClass::Success, "status {status}");
        }
    }

    #[test]
    fn test_auth_triggers() {
        assert_eq!(
            classify(401),
            ResponseClass::AuthRequired(AuthFailureKind::Unauthorized)
        );
        assert_eq!(
            classify(406),
            ResponseClass::AuthRequired(AuthFailureKind::CertificateError)
        );
    }

    #[test]
    fn test_server_and_client_errors() {
        assert_eq!(classify(500), ResponseClass::ServerError);
        // Only 500 is a server error; other 5xx fall through
        assert_eq!(classify(502), ResponseClass::ClientError);
        assert_eq!(classify(404), ResponseClass::ClientError);
        assert_eq!(classify(302), ResponseClass::ClientError);
        assert_eq!(classify(199), ResponseClass::ClientError);
        assert_eq!(classify(300), ResponseClass::ClientError);
    }

    #[test]
    fn test_redirect_detection() {
        assert!(is_redirect(301));
        assert!(is_redirect(308));
        assert!(!is_redirect(304));
        assert!(!is_redirect(200));
    }
}
