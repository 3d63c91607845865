//! HTTP portal.
//!
//! Outbound calls go through [`HttpCaller`]: request building, auth, an
//! ordered request-middleware chain, and a bounded retry loop with the exact
//! retryability policy callers depend on (network/timeout/5xx retry, 4xx
//! never). Inbound calls are served by an axum router exposing applied
//! functions at `POST /call/{name}` plus a `GET /health` probe.

#![deny(unsafe_code)]

mod client;
mod config;
mod middleware;
mod portal;
mod server;

pub use client::HttpCaller;
pub use config::{Auth, HttpEndpoint, HttpPortalConfig, RetryPolicy, DEFAULT_API_KEY_HEADER};
pub use middleware::{RequestMiddleware, ResponseMiddleware};
pub use portal::HttpPortal;
