//! Request descriptors.
//!
//! A [`RequestDescriptor`] is the caller's description of one logical API
//! call. It is an immutable value once built; the fetch crate turns it into
//! a transport-ready request.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::error::CoreError;

// ============================================================================
// HTTP Method
// ============================================================================

/// HTTP verb for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    /// GET. Never carries a body.
    #[default]
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// DELETE.
    Delete,
}

impl HttpMethod {
    /// Returns the wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Query Keys
// ============================================================================

/// Key of a query string item.
///
/// The well-known keys cover the backend's pagination and search
/// conventions; anything else goes through [`QueryKey::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// Page number.
    Page,
    /// Items per page.
    Limit,
    /// Sort criteria.
    SortBy,
    /// Free-text search.
    Search,
    /// Search by an unspecified field. The backend expects the literal key `undefined`.
    SearchBy,
    /// Filter expression.
    Filter,
    /// Field selection.
    Select,
    /// Any other key.
    Custom(String),
}

impl QueryKey {
    /// Returns the key as it appears in the URL.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Page => "page",
            Self::Limit => "limit",
            Self::SortBy => "sortBy",
            Self::Search => "search",
            Self::SearchBy => "undefined",
            Self::Filter => "filter",
            Self::Select => "select",
            Self::Custom(key) => key,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for QueryKey {
    fn from(key: &str) -> Self {
        match key {
            "page" => Self::Page,
            "limit" => Self::Limit,
            "sortBy" => Self::SortBy,
            "search" => Self::Search,
            "undefined" => Self::SearchBy,
            "filter" => Self::Filter,
            "select" => Self::Select,
            other => Self::Custom(other.to_string()),
        }
    }
}

// ============================================================================
// Path Keys
// ============================================================================

/// Anything that names an API path.
///
/// Applications usually implement this for an enum of their endpoints.
pub trait ApiPath {
    /// Path relative to the base URL, without a leading slash.
    fn path(&self) -> &str;
}

impl ApiPath for str {
    fn path(&self) -> &str {
        self
    }
}

impl ApiPath for String {
    fn path(&self) -> &str {
        self
    }
}

impl<T: ApiPath + ?Sized> ApiPath for &T {
    fn path(&self) -> &str {
        (**self).path()
    }
}

// ============================================================================
// Request Descriptor
// ============================================================================

/// Description of one logical API call.
///
/// The body is serialized eagerly so the descriptor stays a plain value that
/// can be replayed after a token refresh. For [`HttpMethod::Get`] the body is
/// dropped no matter what the caller passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: HttpMethod,
    path: String,
    path_param: Option<String>,
    query: HashMap<QueryKey, String>,
    body: Option<serde_json::Value>,
}

impl RequestDescriptor {
    /// Creates a descriptor for `method` on `path`.
    pub fn new(method: HttpMethod, path: impl ApiPath) -> Self {
        Self {
            method,
            path: path.path().trim_matches('/').to_string(),
            path_param: None,
            query: HashMap::new(),
            body: None,
        }
    }

    /// Shorthand for a GET descriptor.
    pub fn get(path: impl ApiPath) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Shorthand for a POST descriptor.
    pub fn post(path: impl ApiPath) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// Shorthand for a PUT descriptor.
    pub fn put(path: impl ApiPath) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    /// Shorthand for a DELETE descriptor.
    pub fn delete(path: impl ApiPath) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Attaches a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if the payload cannot be encoded.
    pub fn with_body<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, CoreError> {
        if self.method == HttpMethod::Get {
            return Ok(self);
        }
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attaches an already encoded JSON body.
    #[must_use]
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        if self.method != HttpMethod::Get {
            self.body = Some(body);
        }
        self
    }

    /// Adds a query item. Later values for the same key replace earlier ones.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<QueryKey>, value: impl fmt::Display) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    /// Sets the path parameter appended as `/value`.
    #[must_use]
    pub fn with_path_param(mut self, param: impl fmt::Display) -> Self {
        self.path_param = Some(param.to_string());
        self
    }

    /// HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Path key relative to the base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Optional path parameter.
    pub fn path_param(&self) -> Option<&str> {
        self.path_param.as_deref()
    }

    /// Query items. Iteration order is unspecified.
    pub fn query(&self) -> &HashMap<QueryKey, String> {
        &self.query
    }

    /// JSON body, always `None` for GET.
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Full relative path including the path parameter.
    pub fn full_path(&self) -> String {
        match &self.path_param {
            Some(param) => format!("{}/{}", self.path, param),
            None => self.path.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
