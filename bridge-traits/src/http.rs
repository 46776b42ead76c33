//! HTTP Client Abstraction
//!
//! Read-only HTTP access through a host-provided client. Implementations
//! perform exactly one attempt per `execute`; throttling and retries belong to
//! the caller.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
}

/// Outgoing request. Catalog APIs are read-only, so requests carry no body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Overrides the client's default timeout for this call
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Raw response; non-2xx statuses are data, not errors.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 429 Too Many Requests
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Retry-After` interpreted as delay-seconds. HTTP-date values are not
    /// used by the catalog APIs and yield `None`.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("Retry-After")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Host HTTP client.
///
/// Timeouts and connection failures must be reported through
/// [`BridgeError::Timeout`](crate::error::BridgeError::Timeout) and
/// [`BridgeError::Connection`](crate::error::BridgeError::Connection) so that
/// callers can tell them apart from permanent failures.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request` once
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}
