//! In-process portal.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use portico_types::{Address, BoxFuture, CallError, Function, Service};
use portico_types::AddressError;
use tracing::debug;

use crate::portal::FunctionPortal;

const SCHEME: &str = "local";

#[derive(Default)]
struct LocalState {
    functions: HashMap<String, Function>,
    services: HashMap<String, Service>,
    closed: bool,
}

/// Portal whose functions live in this process.
///
/// Doubles as an in-process registry: `apply` stores the function under
/// `local://<instance>/<name>` and `resolve_function` looks it up directly.
pub struct LocalPortal {
    instance: String,
    state: RwLock<LocalState>,
}

impl LocalPortal {
    pub fn new() -> Self {
        Self::with_instance("main")
    }

    /// A named instance; the name becomes the address authority, so two
    /// instances in one process generate distinct addresses.
    pub fn with_instance(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            state: RwLock::new(LocalState::default()),
        }
    }

    fn address_for(&self, name: &str, metadata: &BTreeMap<String, String>) -> Address {
        let mut builder = Address::builder(SCHEME)
            .authority(self.instance.clone())
            .path(name);
        for (k, v) in metadata {
            builder = builder.query_param(k, v);
        }
        // Scheme is non-empty by construction.
        builder.build().unwrap_or_else(|_| {
            unreachable!("local address build cannot fail with a fixed scheme")
        })
    }

    fn guard_open(state: &LocalState) -> Result<(), CallError> {
        if state.closed {
            Err(CallError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for LocalPortal {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionPortal for LocalPortal {
    fn apply(&self, function: Function) -> BoxFuture<'_, Result<Address, CallError>> {
        Box::pin(async move {
            let address = self.address_for(function.name(), &BTreeMap::new());
            let mut state = self.state.write().unwrap();
            Self::guard_open(&state)?;
            debug!(name = function.name(), %address, "local apply");
            state.functions.insert(function.name().to_string(), function);
            Ok(address)
        })
    }

    fn apply_service(&self, service: Service) -> BoxFuture<'_, Result<Address, CallError>> {
        Box::pin(async move {
            let address = self.address_for(service.name(), &BTreeMap::new());
            let mut state = self.state.write().unwrap();
            Self::guard_open(&state)?;
            for function in service.functions() {
                let key = format!("{}/{}", service.name(), function.name());
                state.functions.insert(key, function.clone());
            }
            state.services.insert(service.name().to_string(), service);
            Ok(address)
        })
    }

    fn resolve_function<'a>(
        &'a self,
        address: &'a Address,
    ) -> BoxFuture<'a, Result<Function, CallError>> {
        Box::pin(async move {
            if address.scheme() != SCHEME {
                return Err(AddressError::UnsupportedScheme(address.scheme().to_string()).into());
            }
            let key = address.path().trim_start_matches('/');
            let state = self.state.read().unwrap();
            Self::guard_open(&state)?;
            state
                .functions
                .get(key)
                .cloned()
                .ok_or_else(|| CallError::NotFound {
                    name: key.to_string(),
                })
        })
    }

    fn resolve_service<'a>(
        &'a self,
        address: &'a Address,
    ) -> BoxFuture<'a, Result<Service, CallError>> {
        Box::pin(async move {
            if address.scheme() != SCHEME {
                return Err(AddressError::UnsupportedScheme(address.scheme().to_string()).into());
            }
            let key = address.path().trim_start_matches('/');
            let state = self.state.read().unwrap();
            Self::guard_open(&state)?;
            state
                .services
                .get(key)
                .cloned()
                .ok_or_else(|| CallError::NotFound {
                    name: key.to_string(),
                })
        })
    }

    fn generate_address<'a>(
        &'a self,
        name: &'a str,
        metadata: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<Address, CallError>> {
        Box::pin(async move { Ok(self.address_for(name, metadata)) })
    }

    fn schemes(&self) -> Vec<String> {
        vec![SCHEME.to_string()]
    }

    fn health(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            Self::guard_open(&state)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            if !state.closed {
                debug!(instance = %self.instance, "closing local portal");
                state.closed = true;
                state.functions.clear();
                state.services.clear();
            }
            Ok(())
        })
    }
}
