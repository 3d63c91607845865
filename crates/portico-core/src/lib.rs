//! Portal capability traits, the in-process portal, the registry, and the
//! scheme-keyed consumer.
//!
//! A portal is a transport-specific boundary for registering and invoking
//! functions. This crate defines the capability surface every portal
//! implements ([`FunctionPortal`]), the optional network capability
//! ([`NetworkPortal`]), and the two pieces that sit on top of portals:
//! [`Registry`] (name ↔ address bookkeeping over one portal) and
//! [`Consumer`] (call-by-address dispatch across many portals).

#![deny(unsafe_code)]

mod consumer;
mod local;
mod middleware;
mod portal;
mod registry;

pub use consumer::Consumer;
pub use local::LocalPortal;
pub use middleware::{
    ConnectionInfo, ConnectionMiddleware, ConnectionMiddlewareStack, MessageMiddleware,
    MessageMiddlewareStack, Rejection, RejectionCode, Role,
};
pub use portal::{FunctionPortal, NetworkPortal};
pub use registry::Registry;
