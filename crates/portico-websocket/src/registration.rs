//! Function registrations held by a WebSocket portal.

use std::fmt;
use std::sync::Arc;

use portico_types::{Address, Function, Schema};

/// One function the portal can dispatch inbound calls to.
///
/// Local registrations come from `apply`; remote ones are created when a
/// peer sends a `register` frame, and their handler calls back over the
/// registering connection.
#[derive(Clone)]
pub struct FunctionRegistration {
    name: String,
    address: Address,
    function: Function,
    origin: Option<u64>,
}

impl FunctionRegistration {
    pub(crate) fn local(name: impl Into<String>, address: Address, function: Function) -> Self {
        Self {
            name: name.into(),
            address,
            function,
            origin: None,
        }
    }

    pub(crate) fn remote(
        name: impl Into<String>,
        address: Address,
        function: Function,
        connection_id: u64,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            function,
            origin: Some(connection_id),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn schema(&self) -> Option<&Arc<dyn Schema>> {
        self.function.schema()
    }

    /// Id of the connection that registered this function, when remote.
    pub fn origin(&self) -> Option<u64> {
        self.origin
    }
}

impl fmt::Debug for FunctionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistration")
            .field("name", &self.name)
            .field("address", &self.address.to_string())
            .field("origin", &self.origin)
            .finish()
    }
}
