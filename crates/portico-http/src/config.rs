//! Endpoint and portal configuration.

use std::time::Duration;

/// Header used for [`Auth::ApiKey`] when none is configured.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Authentication applied to every outbound request.
///
/// A closed enum: there is no "unknown auth type" failure mode left to
/// handle at call time.
#[derive(Debug, Clone)]
pub enum Auth {
    Bearer(String),
    Basic { username: String, password: String },
    ApiKey { header: Option<String>, key: String },
}

impl Auth {
    /// API-key auth with the default header name.
    pub fn api_key(key: impl Into<String>) -> Self {
        Auth::ApiKey {
            header: None,
            key: key.into(),
        }
    }
}

/// Bounded retry behavior for the client call path.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts; values below 1 behave as 1.
    pub max_retries: u32,
    /// Fixed sleep between attempts (not after the last).
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Outbound endpoint configuration.
#[derive(Debug, Clone, Default)]
pub struct HttpEndpoint {
    /// When set, the request URL is `base_url` + `path`; otherwise the
    /// resolved address itself is dialed.
    pub base_url: Option<String>,
    pub path: Option<String>,
    /// Defaults to POST.
    pub method: Option<http::Method>,
    /// Static headers applied to every request.
    pub headers: Vec<(String, String)>,
    /// Static query parameters appended to every request.
    pub query: Vec<(String, String)>,
    pub auth: Option<Auth>,
    /// Per-request deadline; falls back to the portal default.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub retry: RetryPolicy,
}

impl HttpEndpoint {
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for [`crate::HttpPortal`].
#[derive(Debug, Clone)]
pub struct HttpPortalConfig {
    pub host: String,
    /// 0 binds an ephemeral port.
    pub port: u16,
    /// Deadline for outbound calls whose endpoint sets none.
    pub default_timeout: Option<Duration>,
    /// Endpoint defaults used when resolving remote addresses.
    pub endpoint: HttpEndpoint,
}

impl Default for HttpPortalConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            default_timeout: Some(Duration::from_secs(30)),
            endpoint: HttpEndpoint::default(),
        }
    }
}
