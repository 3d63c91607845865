//! Connection and message middleware.
//!
//! Middleware is split per concern into small closed traits: connection
//! middleware can reject a new connection (fatal to that connection only),
//! message middleware can reject an individual frame (non-fatal), and
//! disconnect notification is best-effort. Transport request middleware
//! lives with the HTTP portal, next to the types it operates on.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use portico_types::{BoxFuture, ErrorBody, Frame};

/// Which side of a connection this end is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This end dialed out.
    Initiator,
    /// This end accepted the connection.
    Acceptor,
}

/// What middleware gets to see about a connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub role: Role,
    pub remote: Option<SocketAddr>,
    /// `Origin` header for accepted browser connections.
    pub origin: Option<String>,
}

/// Reason for rejecting a connection or a message.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub code: RejectionCode,
    pub message: String,
}

/// Standard rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RejectionCode {
    Unauthenticated,
    PermissionDenied,
    RateLimited,
    InvalidRequest,
    Internal,
}

impl Rejection {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            code: RejectionCode::Unauthenticated,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self {
            code: RejectionCode::PermissionDenied,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            code: RejectionCode::RateLimited,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: RejectionCode::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: RejectionCode::Internal,
            message: message.into(),
        }
    }

    /// HTTP-flavored numeric code for wire error bodies.
    pub fn status(&self) -> i64 {
        match self.code {
            RejectionCode::Unauthenticated => 401,
            RejectionCode::PermissionDenied => 403,
            RejectionCode::RateLimited => 429,
            RejectionCode::InvalidRequest => 400,
            RejectionCode::Internal => 500,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl From<Rejection> for ErrorBody {
    fn from(r: Rejection) -> Self {
        ErrorBody::new(r.status(), r.message)
    }
}

/// Observes connection lifecycle; may veto new connections.
pub trait ConnectionMiddleware: Send + Sync {
    /// Called before a new connection is served. `Err` aborts it.
    fn on_connect<'a>(
        &'a self,
        info: &'a ConnectionInfo,
    ) -> BoxFuture<'a, Result<(), Rejection>>;

    /// Called after teardown. Notification only; the connection is gone.
    fn on_disconnect<'a>(&'a self, info: &'a ConnectionInfo) -> BoxFuture<'a, ()> {
        let _ = info;
        Box::pin(async {})
    }
}

/// Inspects individual frames; may reject one without harming the connection.
pub trait MessageMiddleware: Send + Sync {
    fn on_message<'a>(
        &'a self,
        info: &'a ConnectionInfo,
        frame: &'a Frame,
    ) -> BoxFuture<'a, Result<(), Rejection>>;
}

/// Ordered stack of connection middleware; first added runs first.
#[derive(Default, Clone)]
pub struct ConnectionMiddlewareStack {
    layers: Vec<Arc<dyn ConnectionMiddleware>>,
}

impl ConnectionMiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn ConnectionMiddleware>) {
        self.layers.push(middleware);
    }

    pub async fn connect(&self, info: &ConnectionInfo) -> Result<(), Rejection> {
        for layer in &self.layers {
            layer.on_connect(info).await?;
        }
        Ok(())
    }

    pub async fn disconnect(&self, info: &ConnectionInfo) {
        for layer in &self.layers {
            layer.on_disconnect(info).await;
        }
    }
}

/// Ordered stack of message middleware; first added runs first.
#[derive(Default, Clone)]
pub struct MessageMiddlewareStack {
    layers: Vec<Arc<dyn MessageMiddleware>>,
}

impl MessageMiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn MessageMiddleware>) {
        self.layers.push(middleware);
    }

    pub async fn message(&self, info: &ConnectionInfo, frame: &Frame) -> Result<(), Rejection> {
        for layer in &self.layers {
            layer.on_message(info, frame).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Gate {
        allow: bool,
        seen: AtomicUsize,
    }

    impl ConnectionMiddleware for Gate {
        fn on_connect<'a>(
            &'a self,
            _info: &'a ConnectionInfo,
        ) -> BoxFuture<'a, Result<(), Rejection>> {
            Box::pin(async move {
                self.seen.fetch_add(1, Ordering::SeqCst);
                if self.allow {
                    Ok(())
                } else {
                    Err(Rejection::unauthenticated("no token"))
                }
            })
        }
    }

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            id: 1,
            role: Role::Acceptor,
            remote: None,
            origin: None,
        }
    }

    #[tokio::test]
    async fn stack_runs_in_order_and_short_circuits() {
        let first = Arc::new(Gate {
            allow: true,
            seen: AtomicUsize::new(0),
        });
        let second = Arc::new(Gate {
            allow: false,
            seen: AtomicUsize::new(0),
        });
        let third = Arc::new(Gate {
            allow: true,
            seen: AtomicUsize::new(0),
        });

        let mut stack = ConnectionMiddlewareStack::new();
        stack.push(first.clone());
        stack.push(second.clone());
        stack.push(third.clone());

        let rejection = stack.connect(&info()).await.unwrap_err();
        assert_eq!(rejection.code, RejectionCode::Unauthenticated);
        assert_eq!(first.seen.load(Ordering::SeqCst), 1);
        assert_eq!(second.seen.load(Ordering::SeqCst), 1);
        assert_eq!(third.seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejection_status_codes() {
        assert_eq!(Rejection::unauthenticated("x").status(), 401);
        assert_eq!(Rejection::rate_limited("x").status(), 429);
        let body: ErrorBody = Rejection::invalid_request("bad frame").into();
        assert_eq!(body.code, 400);
    }
}
