//! portico - transport-agnostic, addressable function invocation.
//!
//! Register a callable once and invoke it by address, whether it lives
//! in-process, behind an HTTP endpoint, or behind a persistent WebSocket
//! connection. This crate is the unified surface; users should depend on it
//! rather than on the individual component crates.
//!
//! The pieces, bottom up:
//! - [`Address`] / [`AddressBuilder`] - URL-shaped function identifiers;
//!   the scheme is the sole dispatch key.
//! - [`FunctionPortal`] - the capability surface every transport implements,
//!   with [`NetworkPortal`] layered on portals that bind a listener.
//! - [`LocalPortal`], [`HttpPortal`], [`WebSocketPortal`],
//!   [`TestingPortal`] - the transport variants.
//! - [`Registry`] - name ↔ address bookkeeping over one portal.
//! - [`Consumer`] - scheme-keyed dispatch across many portals.

#![deny(unsafe_code)]

// Value types: addresses, wire frames, errors, callable contracts.
pub use portico_types::{
    Address, AddressBuilder, AddressError, BoxFuture, CallError, ConnectionError, ErrorBody,
    Frame, FrameMeta, Function, Handler, RegistryError, Service,
};

// The opaque schema collaborator contract.
pub use portico_types::{AnySchema, Schema, SchemaMetadata, ValidationError, ValidationResult};

// Portal capability traits, the in-process portal, registry, and consumer.
pub use portico_core::{
    Consumer, FunctionPortal, LocalPortal, NetworkPortal, Registry,
};

// Middleware seams.
pub use portico_core::{
    ConnectionInfo, ConnectionMiddleware, ConnectionMiddlewareStack, MessageMiddleware,
    MessageMiddlewareStack, Rejection, RejectionCode, Role,
};

// HTTP transport.
pub use portico_http::{
    Auth, HttpCaller, HttpEndpoint, HttpPortal, HttpPortalConfig, RequestMiddleware,
    ResponseMiddleware, RetryPolicy, DEFAULT_API_KEY_HEADER,
};

// WebSocket transport.
pub use portico_websocket::{FunctionRegistration, WebSocketPortal, WsConfig, WsConnection};

// Deterministic test double.
pub use portico_testkit::{CallRecord, TestingPortal};
