//! Error taxonomy for the invocation core.
//!
//! [`CallError`] is the user-visible result of any call and carries the
//! retry policy callers and wrappers depend on: network, timeout, and 5xx
//! failures are retryable; 4xx and serialization failures never are.
//! [`ConnectionError`] and [`RegistryError`] are the narrower layer errors.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::AddressError;

/// Structured error payload carried on the wire and returned by handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric code, HTTP-flavored (404 unknown function, 400 bad request...).
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Error from invoking a function through a portal.
///
/// Every failing call resolves to one of these variants; the variant
/// identifies the failing stage, and [`CallError::is_retryable`] encodes
/// whether a wrapper may safely try again.
#[derive(Debug)]
pub enum CallError {
    /// The address could not be parsed or routed.
    Address(AddressError),
    /// Transport-level failure. `stage` names where it happened.
    Network { stage: &'static str, message: String },
    /// A deadline elapsed. `stage` names the bounded operation.
    Timeout { stage: &'static str },
    /// Encoding or decoding a payload failed.
    Serialization(String),
    /// HTTP 4xx: the request is wrong and retrying cannot fix it.
    Client { status: u16, body: String },
    /// HTTP 5xx: the remote end failed and may recover.
    Server { status: u16, body: String },
    /// Any other non-success HTTP status.
    Http { status: u16, body: String },
    /// The remote handler returned a structured error.
    Function(ErrorBody),
    /// No function is known at the resolved address.
    NotFound { name: String },
    /// No portal is registered for the address scheme.
    NoPortal { scheme: String },
    /// The portal or connection has been closed.
    Closed,
    /// Retry budget spent; wraps the last failure.
    Exhausted { attempts: u32, last: Box<CallError> },
}

impl CallError {
    /// Shorthand for a network error at a named stage.
    pub fn network(stage: &'static str, message: impl Into<String>) -> Self {
        CallError::Network {
            stage,
            message: message.into(),
        }
    }

    /// The retry policy. Wrappers depend on this being exact:
    /// network/timeout and 5xx are retryable, everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CallError::Network { .. } | CallError::Timeout { .. } | CallError::Server { .. }
        )
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Address(e) => write!(f, "address error: {e}"),
            CallError::Network { stage, message } => {
                write!(f, "network error ({stage}): {message}")
            }
            CallError::Timeout { stage } => write!(f, "timed out ({stage})"),
            CallError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            CallError::Client { status, body } => write!(f, "client error {status}: {body}"),
            CallError::Server { status, body } => write!(f, "server error {status}: {body}"),
            CallError::Http { status, body } => write!(f, "http error {status}: {body}"),
            CallError::Function(body) => write!(f, "function error: {body}"),
            CallError::NotFound { name } => write!(f, "function not found: {name}"),
            CallError::NoPortal { scheme } => {
                write!(f, "no portal registered for scheme: {scheme}")
            }
            CallError::Closed => write!(f, "portal closed"),
            CallError::Exhausted { attempts, last } => {
                write!(f, "all {attempts} attempts failed, last: {last}")
            }
        }
    }
}

impl std::error::Error for CallError {}

impl From<AddressError> for CallError {
    fn from(e: AddressError) -> Self {
        CallError::Address(e)
    }
}

impl From<serde_json::Error> for CallError {
    fn from(e: serde_json::Error) -> Self {
        CallError::Serialization(e.to_string())
    }
}

impl From<ConnectionError> for CallError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::Closed => CallError::Closed,
            ConnectionError::Rejected { reason } => CallError::network("connect", reason),
            ConnectionError::Protocol(msg) => CallError::network("protocol", msg),
            ConnectionError::Io(e) => CallError::network("transport", e.to_string()),
        }
    }
}

/// Error scoped to one connection's lifecycle.
#[derive(Debug)]
pub enum ConnectionError {
    /// The connection was (or is being) torn down.
    Closed,
    /// Connection middleware refused the connection.
    Rejected { reason: String },
    /// The peer violated the framing layer.
    Protocol(String),
    /// Underlying socket failure.
    Io(io::Error),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Closed => write!(f, "connection closed"),
            ConnectionError::Rejected { reason } => write!(f, "connection rejected: {reason}"),
            ConnectionError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ConnectionError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

/// Error from registry operations.
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// The name is already registered; the original is untouched.
    Conflict { name: String },
    /// The name is not registered.
    NotFound { name: String },
    /// The underlying portal refused the operation.
    Portal(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Conflict { name } => write!(f, "name already registered: {name}"),
            RegistryError::NotFound { name } => write!(f, "name not registered: {name}"),
            RegistryError::Portal(msg) => write!(f, "portal error: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<CallError> for RegistryError {
    fn from(e: CallError) -> Self {
        RegistryError::Portal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_is_exact() {
        assert!(CallError::network("send", "refused").is_retryable());
        assert!(CallError::Timeout { stage: "http" }.is_retryable());
        assert!(CallError::Server { status: 503, body: String::new() }.is_retryable());

        assert!(!CallError::Client { status: 404, body: String::new() }.is_retryable());
        assert!(!CallError::Serialization("bad json".into()).is_retryable());
        assert!(!CallError::Closed.is_retryable());
        let exhausted = CallError::Exhausted {
            attempts: 3,
            last: Box::new(CallError::Timeout { stage: "http" }),
        };
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn error_body_serde_shape() {
        let body = ErrorBody::new(404, "function not found: echo");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"code": 404, "message": "function not found: echo"}));
    }
}
