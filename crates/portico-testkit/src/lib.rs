//! Deterministic portal double for tests.
//!
//! [`TestingPortal`] implements the full portal surface for the `test`
//! scheme with canned behavior per function name. Every invocation made
//! through a resolved function is recorded, so tests can assert how often
//! and with what parameters a function was called.

#![deny(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use portico_core::FunctionPortal;
use portico_types::{
    Address, AddressError, BoxFuture, CallError, ErrorBody, Function, Handler, Service,
};
use serde_json::Value;
use tracing::debug;

const SCHEME: &str = "test";

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub function: String,
    pub params: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct MockState {
    functions: HashMap<String, Function>,
    services: HashMap<String, Service>,
    closed: bool,
}

/// In-memory portal double.
///
/// Functions are mocked by name; resolution wraps each mock in a recording
/// handler so the history reflects actual calls, not lookups.
pub struct TestingPortal {
    instance: String,
    state: RwLock<MockState>,
    history: Arc<Mutex<Vec<CallRecord>>>,
}

impl TestingPortal {
    pub fn new() -> Self {
        Self::with_instance("mock")
    }

    pub fn with_instance(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            state: RwLock::new(MockState::default()),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mock a function with full control over its behavior.
    pub fn mock(&self, function: Function) {
        debug!(name = function.name(), "mock installed");
        self.state
            .write()
            .unwrap()
            .functions
            .insert(function.name().to_string(), function);
    }

    /// Mock a function that always succeeds with `value`.
    pub fn mock_value(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.mock(Function::from_fn(name, move |_| {
            let value = value.clone();
            async move { Ok(value) }
        }));
    }

    /// Mock a function that always fails with `error`.
    pub fn mock_error(&self, name: impl Into<String>, error: ErrorBody) {
        let name = name.into();
        self.mock(Function::from_fn(name, move |_| {
            let error = error.clone();
            async move { Err(CallError::Function(error)) }
        }));
    }

    /// How many times `name` has been called.
    pub fn call_count(&self, name: &str) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.function == name)
            .count()
    }

    /// Whether `name` was called exactly `times` times.
    #[must_use]
    pub fn verify(&self, name: &str, times: usize) -> bool {
        self.call_count(name) == times
    }

    /// Snapshot of every recorded invocation, in call order.
    pub fn call_history(&self) -> Vec<CallRecord> {
        self.history.lock().unwrap().clone()
    }

    /// The recorded invocations of one function, in call order.
    pub fn calls_to(&self, name: &str) -> Vec<CallRecord> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.function == name)
            .cloned()
            .collect()
    }

    /// Drop every mock and the whole call history.
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        state.functions.clear();
        state.services.clear();
        self.history.lock().unwrap().clear();
    }

    fn address_for(&self, name: &str, metadata: &BTreeMap<String, String>) -> Address {
        let mut builder = Address::builder(SCHEME)
            .authority(self.instance.clone())
            .path(name);
        for (k, v) in metadata {
            builder = builder.query_param(k, v);
        }
        // Scheme is non-empty by construction.
        builder
            .build()
            .unwrap_or_else(|_| unreachable!("test address build cannot fail with a fixed scheme"))
    }

    fn guard_open(state: &MockState) -> Result<(), CallError> {
        if state.closed {
            Err(CallError::Closed)
        } else {
            Ok(())
        }
    }

    fn recording(&self, inner: Function) -> Function {
        let name = inner.name().to_string();
        let schema = inner.schema().cloned();
        let handler = Recording {
            name: name.clone(),
            history: Arc::clone(&self.history),
            inner,
        };
        Function::new(name, schema, Arc::new(handler))
    }
}

impl Default for TestingPortal {
    fn default() -> Self {
        Self::new()
    }
}

struct Recording {
    name: String,
    history: Arc<Mutex<Vec<CallRecord>>>,
    inner: Function,
}

impl Handler for Recording {
    fn call(&self, params: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin(async move {
            self.history.lock().unwrap().push(CallRecord {
                function: self.name.clone(),
                params: params.clone(),
                timestamp: Utc::now(),
            });
            self.inner.call(params).await
        })
    }
}

impl FunctionPortal for TestingPortal {
    fn apply(&self, function: Function) -> BoxFuture<'_, Result<Address, CallError>> {
        Box::pin(async move {
            let address = self.address_for(function.name(), &BTreeMap::new());
            let mut state = self.state.write().unwrap();
            Self::guard_open(&state)?;
            state
                .functions
                .insert(function.name().to_string(), function);
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
            let inner = state
                .functions
                .get(key)
                .cloned()
                .ok_or_else(|| CallError::NotFound {
                    name: key.to_string(),
                })?;
            Ok(self.recording(inner))
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
                state.closed = true;
                state.functions.clear();
                state.services.clear();
            }
            Ok(())
        })
    }
}
