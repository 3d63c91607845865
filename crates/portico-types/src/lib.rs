//! Core value types for portico.
//!
//! This crate holds everything the transport crates share: the [`Address`]
//! model, the JSON wire [`Frame`] envelope, the error taxonomy, the opaque
//! [`Schema`] collaborator contract, and the [`Function`]/[`Service`]
//! callable types. It deliberately knows nothing about any transport.

#![deny(unsafe_code)]

mod address;
mod error;
mod frame;
mod function;
mod schema;

pub use address::{Address, AddressBuilder, AddressError};
pub use error::{CallError, ConnectionError, ErrorBody, RegistryError};
pub use frame::{Frame, FrameMeta};
pub use function::{BoxFuture, Function, Handler, Service};
pub use schema::{AnySchema, Schema, SchemaMetadata, ValidationError, ValidationResult};
