//! Request and response middleware for the client path.

use portico_types::{BoxFuture, CallError};

/// Runs after the request is fully built, before the first attempt.
///
/// An error aborts the call as a network error in the "request" stage;
/// middleware never participates in the retry loop.
pub trait RequestMiddleware: Send + Sync {
    fn on_request<'a>(
        &'a self,
        request: &'a mut reqwest::Request,
    ) -> BoxFuture<'a, Result<(), CallError>>;
}

/// Observes each received response. Best-effort: errors are logged and
/// ignored, the caller-visible outcome never changes.
pub trait ResponseMiddleware: Send + Sync {
    fn on_response<'a>(
        &'a self,
        response: &'a reqwest::Response,
    ) -> BoxFuture<'a, Result<(), CallError>>;
}
