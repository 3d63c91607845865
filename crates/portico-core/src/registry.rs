//! Name → (address, function) bookkeeping over one portal.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use portico_types::{Address, Function, Handler, RegistryError, Schema};
use tracing::debug;

use crate::portal::FunctionPortal;

#[derive(Default)]
struct RegistryState {
    functions: HashMap<String, Function>,
    addresses: HashMap<String, Address>,
    anon_seq: u64,
}

/// Registry of named functions layered on one portal.
///
/// One name maps to exactly one address; a duplicate `register` fails with
/// [`RegistryError::Conflict`] and leaves the original registration
/// untouched. Both maps are updated under a single write lock so no partial
/// state is ever externally visible.
pub struct Registry {
    portal: Arc<dyn FunctionPortal>,
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new(portal: Arc<dyn FunctionPortal>) -> Self {
        Self {
            portal,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn portal(&self) -> &Arc<dyn FunctionPortal> {
        &self.portal
    }

    /// Register `handler` under `name`.
    pub async fn register(
        &self,
        name: &str,
        schema: Option<Arc<dyn Schema>>,
        handler: Arc<dyn Handler>,
    ) -> Result<Address, RegistryError> {
        // Fail fast without touching the portal. The authoritative check is
        // re-run under the write lock below.
        {
            let state = self.state.read().unwrap();
            if state.functions.contains_key(name) {
                return Err(RegistryError::Conflict {
                    name: name.to_string(),
                });
            }
        }

        let function = Function::new(name, schema, handler);
        let address = self
            .portal
            .generate_address(name, &BTreeMap::new())
            .await?;
        self.portal.apply(function.clone()).await?;

        let mut state = self.state.write().unwrap();
        if state.functions.contains_key(name) {
            // A concurrent register won the race; the winner's entry stays.
            return Err(RegistryError::Conflict {
                name: name.to_string(),
            });
        }
        debug!(name, %address, "registered");
        state.functions.insert(name.to_string(), function);
        state.addresses.insert(name.to_string(), address.clone());
        Ok(address)
    }

    /// Register under a generated name that never collides with any prior
    /// name in this registry.
    pub async fn register_anon(
        &self,
        schema: Option<Arc<dyn Schema>>,
        handler: Arc<dyn Handler>,
    ) -> Result<(String, Address), RegistryError> {
        loop {
            let name = {
                let mut state = self.state.write().unwrap();
                loop {
                    state.anon_seq += 1;
                    let candidate = format!("anon-{}", state.anon_seq);
                    if !state.functions.contains_key(&candidate) {
                        break candidate;
                    }
                }
            };
            match self.register(&name, schema.clone(), handler.clone()).await {
                Ok(address) => return Ok((name, address)),
                // Someone grabbed the name between drawing it and
                // registering; the counter is monotonic, so draw again.
                Err(RegistryError::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn get_address(&self, name: &str) -> Result<Address, RegistryError> {
        let state = self.state.read().unwrap();
        state
            .addresses
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn get_function(&self, name: &str) -> Result<Function, RegistryError> {
        let state = self.state.read().unwrap();
        state
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    /// Remove a registration; both maps drop the entry together.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let mut state = self.state.write().unwrap();
        if state.functions.remove(name).is_none() {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }
        state.addresses.remove(name);
        debug!(name, "removed");
        Ok(())
    }

    /// Snapshot of currently registered names.
    pub fn names(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut names: Vec<String> = state.functions.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalPortal;
    use portico_types::{BoxFuture, CallError};
    use serde_json::Value;

    struct Echo;

    impl Handler for Echo {
        fn call(&self, params: Value) -> BoxFuture<'_, Result<Value, CallError>> {
            Box::pin(async move { Ok(params) })
        }
    }

    fn registry() -> Registry {
        Registry::new(Arc::new(LocalPortal::new()))
    }

    #[tokio::test]
    async fn register_and_look_up() {
        let registry = registry();
        let address = registry.register("echo", None, Arc::new(Echo)).await.unwrap();
        assert_eq!(registry.get_address("echo").unwrap(), address);
        assert_eq!(registry.get_function("echo").unwrap().name(), "echo");
    }

    #[tokio::test]
    async fn duplicate_register_conflicts_and_keeps_original() {
        let registry = registry();
        let first = registry.register("f", None, Arc::new(Echo)).await.unwrap();

        let err = registry.register("f", None, Arc::new(Echo)).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { ref name } if name == "f"));

        // Original registration unchanged.
        assert_eq!(registry.get_address("f").unwrap(), first);
    }

    #[tokio::test]
    async fn register_anon_never_collides() {
        let registry = registry();
        // Occupy a name the counter would otherwise produce.
        registry.register("anon-2", None, Arc::new(Echo)).await.unwrap();

        let mut seen = std::collections::HashSet::new();
        seen.insert("anon-2".to_string());
        for _ in 0..10 {
            let (name, _) = registry.register_anon(None, Arc::new(Echo)).await.unwrap();
            assert!(seen.insert(name.clone()), "collision on {name}");
        }
    }

    #[tokio::test]
    async fn remove_then_not_found() {
        let registry = registry();
        registry.register("f", None, Arc::new(Echo)).await.unwrap();
        registry.remove("f").unwrap();

        assert!(matches!(
            registry.get_address("f"),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            registry.remove("f"),
            Err(RegistryError::NotFound { .. })
        ));

        // The name is free again.
        registry.register("f", None, Arc::new(Echo)).await.unwrap();
    }
}
