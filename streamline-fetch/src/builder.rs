//! Turns a [`RequestDescriptor`] into a transport-ready [`BuiltRequest`].
//!
//! Header order is fixed: defaults, then `X-API-Key`, then the interceptor.
//! The interceptor always runs last so it can overwrite anything.

use std::fmt;

use tracing::debug;
use url::Url;

use streamline_core::{CustomBaseUrl, HttpMethod, RequestDescriptor, ServiceConfiguration};

use crate::error::DispatchError;

/// Header carrying the configured API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

// ============================================================================
// Built Request
// ============================================================================

/// How the transport treats local caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Always go to the network.
    #[default]
    IgnoreLocalCache,
}

/// Fully resolved request, owned by a single in-flight call.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL including query.
    pub url: Url,
    /// Headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Encoded body; always `None` for GET.
    pub body: Option<Vec<u8>>,
    /// Cache policy.
    pub cache_policy: CachePolicy,
}

impl BuiltRequest {
    /// Returns the value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets `name`, replacing any existing value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Removes `name` and returns its value.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let index = self
            .headers
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(index).1)
    }
}

// ============================================================================
// Interceptor
// ============================================================================

/// Hook that rewrites a built request right before it is sent.
pub trait RequestInterceptor: Send + Sync {
    /// Mutates the request. May touch any header or the body.
    fn intercept(&self, request: &mut BuiltRequest);
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut BuiltRequest) + Send + Sync,
{
    fn intercept(&self, request: &mut BuiltRequest) {
        self(request);
    }
}

impl fmt::Debug for dyn RequestInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequestInterceptor")
    }
}

// ============================================================================
// Request Builder
// ============================================================================

/// Builds requests from descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBuilder;

impl RequestBuilder {
    /// Builds a request.
    ///
    /// The override, when present, replaces both base URL and port of the
    /// configuration. A missing port means no port segment at all.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UrlConstruction`] if the composed URL does not
    /// parse and [`DispatchError::Serialization`] if the body cannot be
    /// encoded.
    pub fn build(
        descriptor: &RequestDescriptor,
        config: &ServiceConfiguration,
        custom_url: Option<&CustomBaseUrl>,
        interceptor: Option<&dyn RequestInterceptor>,
    ) -> Result<BuiltRequest, DispatchError> {
        let url = Self::compose_url(descriptor, config, custom_url)?;

        let body = match (descriptor.method(), descriptor.body()) {
            (HttpMethod::Get, _) | (_, None) => None,
            (_, Some(value)) => {
                Some(serde_json::to_vec(value).map_err(DispatchError::Serialization)?)
            }
        };

        let mut request = BuiltRequest {
            method: descriptor.method(),
            url,
            headers: Vec::with_capacity(7),
            body,
            cache_policy: CachePolicy::IgnoreLocalCache,
        };

        request.set_header("user-agent", config.user_agent.as_str());
        request.set_header("content-type", "application/json");
        request.set_header("accept", "application/json");
        request.set_header("lang", config.language.locale_tag());
        if let Some(api_key) = config.api_key.as_deref() {
            request.set_header(API_KEY_HEADER, api_key);
        }
        request.set_header("cache-control", "no-cache");

        if let Some(interceptor) = interceptor {
            interceptor.intercept(&mut request);
        }

        // Interceptors may add a body, GET still never carries one
        if request.method == HttpMethod::Get {
            request.body = None;
        }

        debug!(method = %request.method, url = %request.url, "Built request");
        Ok(request)
    }

    fn compose_url(
        descriptor: &RequestDescriptor,
        config: &ServiceConfiguration,
        custom_url: Option<&CustomBaseUrl>,
    ) -> Result<Url, DispatchError> {
        let (base, port) = match custom_url {
            Some(custom) => (custom.base_url.as_str(), custom.port),
            None => (config.base_url.as_str(), config.port),
        };
        let base = base.trim().trim_end_matches('/');

        let raw = match port {
            Some(port) => format!("{base}:{port}/{}", descriptor.full_path()),
            None => format!("{base}/{}", descriptor.full_path()),
        };

        let mut url = Url::parse(&raw).map_err(|e| {
            DispatchError::UrlConstruction(format!("{raw}: {e}"))
        })?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(DispatchError::UrlConstruction(raw));
        }

        if !descriptor.query().is_empty() {
            let mut items: Vec<_> = descriptor.query().iter().collect();
            items.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            let mut pairs = url.query_pairs_mut();
            for (key, value) in items {
                pairs.append_pair(key.as_str(), value);
            }
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
