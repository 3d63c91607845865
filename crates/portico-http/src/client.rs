//! Outbound call path: build, sign, retry, classify.

use std::sync::Arc;
use std::time::Duration;

use http::header::{ACCEPT, USER_AGENT};
use http::Method;
use portico_types::{Address, BoxFuture, CallError, Handler};
use serde_json::Value;
use tracing::debug;

use crate::config::{HttpEndpoint, DEFAULT_API_KEY_HEADER};
use crate::middleware::{RequestMiddleware, ResponseMiddleware};

/// One configured outbound target.
///
/// Implements [`Handler`], so a resolved remote function is just a
/// `Function` wrapping one of these.
pub struct HttpCaller {
    client: reqwest::Client,
    url: String,
    address_query: Vec<(String, String)>,
    endpoint: HttpEndpoint,
    default_timeout: Option<Duration>,
    request_middleware: Vec<Arc<dyn RequestMiddleware>>,
    response_middleware: Vec<Arc<dyn ResponseMiddleware>>,
}

impl HttpCaller {
    pub fn new(
        client: reqwest::Client,
        address: &Address,
        endpoint: HttpEndpoint,
        default_timeout: Option<Duration>,
        request_middleware: Vec<Arc<dyn RequestMiddleware>>,
        response_middleware: Vec<Arc<dyn ResponseMiddleware>>,
    ) -> Self {
        // URL from endpoint base_url + path when configured, else the
        // address itself.
        let url = match (&endpoint.base_url, &endpoint.path) {
            (Some(base), Some(path)) => {
                format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
            }
            (Some(base), None) => base.clone(),
            _ => format!(
                "{}://{}{}",
                address.scheme(),
                address.authority(),
                address.path()
            ),
        };
        let address_query = address
            .query()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            client,
            url,
            address_query,
            endpoint,
            default_timeout,
            request_middleware,
            response_middleware,
        }
    }

    fn build_request(&self, params: &Value) -> Result<reqwest::Request, CallError> {
        let method = self.endpoint.method.clone().unwrap_or(Method::POST);
        let mut builder = self
            .client
            .request(method, &self.url)
            .json(params)
            .header(ACCEPT, "application/json");

        if let Some(agent) = &self.endpoint.user_agent {
            builder = builder.header(USER_AGENT, agent);
        }
        for (name, value) in &self.endpoint.headers {
            builder = builder.header(name, value);
        }
        if !self.address_query.is_empty() {
            builder = builder.query(&self.address_query);
        }
        if !self.endpoint.query.is_empty() {
            builder = builder.query(&self.endpoint.query);
        }

        builder = match &self.endpoint.auth {
            Some(crate::config::Auth::Bearer(token)) => builder.bearer_auth(token),
            Some(crate::config::Auth::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            Some(crate::config::Auth::ApiKey { header, key }) => builder.header(
                header.as_deref().unwrap_or(DEFAULT_API_KEY_HEADER),
                key,
            ),
            None => builder,
        };

        builder
            .build()
            .map_err(|e| CallError::network("build", e.to_string()))
    }

    /// Perform the call: middleware, bounded retries, status classification,
    /// response parsing.
    pub async fn call(&self, params: Value) -> Result<Value, CallError> {
        let mut request = self.build_request(&params)?;

        // Middleware runs once on the built request; retries clone the
        // already-decorated request.
        for middleware in &self.request_middleware {
            if let Err(e) = middleware.on_request(&mut request).await {
                return Err(CallError::network("request", e.to_string()));
            }
        }

        let attempts = self.endpoint.retry.max_retries.max(1);
        let deadline = self.endpoint.timeout.or(self.default_timeout);
        let mut last_error = CallError::network("send", "no attempt made");

        for attempt in 1..=attempts {
            // Bodies are single-use; every attempt gets a fresh clone.
            let Some(cloned) = request.try_clone() else {
                return Err(CallError::network("clone", "request body is not cloneable"));
            };

            let outcome = match deadline {
                Some(limit) => match tokio::time::timeout(limit, self.client.execute(cloned)).await
                {
                    Ok(result) => result.map_err(classify_transport),
                    Err(_) => Err(CallError::Timeout { stage: "http" }),
                },
                None => self.client.execute(cloned).await.map_err(classify_transport),
            };

            let error = match outcome {
                Ok(response) => {
                    self.observe_response(&response).await;
                    let status = response.status();
                    if status.is_success() {
                        return parse_body(response).await;
                    }
                    let body = response.text().await.unwrap_or_default();
                    classify_status(status.as_u16(), body)
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }
            debug!(attempt, attempts, error = %error, "attempt failed");
            last_error = error;
            if attempt < attempts {
                tokio::time::sleep(self.endpoint.retry.retry_delay).await;
            }
        }

        Err(CallError::Exhausted {
            attempts,
            last: Box::new(last_error),
        })
    }

    async fn observe_response(&self, response: &reqwest::Response) {
        for middleware in &self.response_middleware {
            if let Err(e) = middleware.on_response(response).await {
                debug!(error = %e, "response middleware error ignored");
            }
        }
    }
}

impl Handler for HttpCaller {
    fn call(&self, params: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin(HttpCaller::call(self, params))
    }
}

fn classify_transport(e: reqwest::Error) -> CallError {
    if e.is_timeout() {
        CallError::Timeout { stage: "http" }
    } else if e.is_decode() {
        CallError::Serialization(e.to_string())
    } else {
        CallError::network("send", e.to_string())
    }
}

fn classify_status(status: u16, body: String) -> CallError {
    match status {
        400..=499 => CallError::Client { status, body },
        500..=599 => CallError::Server { status, body },
        _ => CallError::Http { status, body },
    }
}

async fn parse_body(response: reqwest::Response) -> Result<Value, CallError> {
    let body = response
        .text()
        .await
        .map_err(|e| CallError::network("read", e.to_string()))?;
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| CallError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Auth, RetryPolicy};
    use serde_json::json;

    fn caller(endpoint: HttpEndpoint) -> HttpCaller {
        let address = Address::parse("http://127.0.0.1:9/call/echo?tenant=t1").unwrap();
        HttpCaller::new(
            reqwest::Client::new(),
            &address,
            endpoint,
            None,
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn builds_post_with_json_body_by_default() {
        let caller = caller(HttpEndpoint::default());
        let request = caller.build_request(&json!({"a": 1})).unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/call/echo");
        assert!(request.body().is_some());
        assert_eq!(
            request.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(
            request.headers().get("accept").and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        // Address query parameters carry over.
        assert!(request.url().query().unwrap_or("").contains("tenant=t1"));
    }

    #[test]
    fn endpoint_url_overrides_address() {
        let endpoint = HttpEndpoint {
            base_url: Some("http://gateway:8000/api/".to_string()),
            path: Some("/invoke".to_string()),
            method: Some(Method::PUT),
            ..Default::default()
        };
        let caller = caller(endpoint);
        let request = caller.build_request(&Value::Null).unwrap();
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.url().as_str().trim_end_matches('?'), "http://gateway:8000/api/invoke");
    }

    #[test]
    fn bearer_auth_header() {
        let endpoint = HttpEndpoint {
            auth: Some(Auth::Bearer("tok-123".to_string())),
            ..Default::default()
        };
        let request = caller(endpoint).build_request(&Value::Null).unwrap();
        assert_eq!(
            request.headers().get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer tok-123")
        );
    }

    #[test]
    fn api_key_uses_default_header() {
        let endpoint = HttpEndpoint {
            auth: Some(Auth::api_key("secret")),
            ..Default::default()
        };
        let request = caller(endpoint).build_request(&Value::Null).unwrap();
        assert_eq!(
            request.headers().get(DEFAULT_API_KEY_HEADER).and_then(|v| v.to_str().ok()),
            Some("secret")
        );
    }

    #[test]
    fn api_key_header_is_configurable() {
        let endpoint = HttpEndpoint {
            auth: Some(Auth::ApiKey {
                header: Some("X-Custom-Key".to_string()),
                key: "secret".to_string(),
            }),
            ..Default::default()
        };
        let request = caller(endpoint).build_request(&Value::Null).unwrap();
        assert!(request.headers().contains_key("X-Custom-Key"));
    }

    #[test]
    fn basic_auth_header() {
        let endpoint = HttpEndpoint {
            auth: Some(Auth::Basic {
                username: "user".to_string(),
                password: "pass".to_string(),
            }),
            ..Default::default()
        };
        let request = caller(endpoint).build_request(&Value::Null).unwrap();
        let header = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(header.starts_with("Basic "));
    }

    #[tokio::test]
    async fn connection_refused_is_retryable_and_exhausts() {
        // Nothing listens on this address; every attempt is a network error.
        let endpoint = HttpEndpoint::default().retry(RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        });
        let caller = caller(endpoint);
        match caller.call(Value::Null).await {
            Err(CallError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.is_retryable());
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
