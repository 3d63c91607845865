//! Portal capability traits.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use portico_types::{Address, BoxFuture, CallError, Function, Service};

/// Transport-specific boundary for registering and invoking functions.
///
/// The trait is object-safe so a [`crate::Consumer`] can hold a mixed bag of
/// portals behind `Arc<dyn FunctionPortal>`; async methods return boxed
/// futures for that reason. Optional capability is layered through safe
/// queries like [`FunctionPortal::as_network`], never inheritance.
pub trait FunctionPortal: Send + Sync {
    /// Register a function and return the address it is reachable at.
    fn apply(&self, function: Function) -> BoxFuture<'_, Result<Address, CallError>>;

    /// Register a service (a named group of functions) as one unit.
    fn apply_service(&self, service: Service) -> BoxFuture<'_, Result<Address, CallError>>;

    /// Resolve an address to an invocable function.
    fn resolve_function<'a>(
        &'a self,
        address: &'a Address,
    ) -> BoxFuture<'a, Result<Function, CallError>>;

    /// Resolve an address to a service.
    fn resolve_service<'a>(
        &'a self,
        address: &'a Address,
    ) -> BoxFuture<'a, Result<Service, CallError>>;

    /// Produce the address a function named `name` would be registered at.
    /// `metadata` entries become query parameters.
    fn generate_address<'a>(
        &'a self,
        name: &'a str,
        metadata: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<Address, CallError>>;

    /// Every scheme this portal owns (e.g. `["http", "https"]`).
    fn schemes(&self) -> Vec<String>;

    /// Liveness check; `Err` means the portal cannot currently serve calls.
    fn health(&self) -> BoxFuture<'_, Result<(), CallError>>;

    /// Release all resources. Idempotent; operations after close fail
    /// immediately with [`CallError::Closed`] rather than hang.
    fn close(&self) -> BoxFuture<'_, Result<(), CallError>>;

    /// Network capability, when this portal has one.
    fn as_network(&self) -> Option<&dyn NetworkPortal> {
        None
    }
}

/// Capability layered onto portals that bind a listener.
pub trait NetworkPortal: FunctionPortal {
    /// Bind and start serving. Idempotent once started.
    fn start(&self) -> BoxFuture<'_, Result<(), CallError>>;

    /// Stop serving; existing registrations are kept.
    fn stop(&self) -> BoxFuture<'_, Result<(), CallError>>;

    /// The bound socket address, once started.
    fn listen_address(&self) -> Option<SocketAddr>;

    /// Base URL clients should dial, once started.
    fn base_url(&self) -> Option<String>;
}
