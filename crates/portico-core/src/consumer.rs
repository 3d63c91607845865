//! Scheme-keyed dispatch across portals.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use portico_types::{Address, AddressError, CallError};
use serde_json::Value;
use tracing::debug;

use crate::portal::FunctionPortal;

/// Routes call-by-address to the portal owning the address scheme.
///
/// One portal owns each scheme; registering another portal for the same
/// scheme replaces the previous owner (last write wins).
#[derive(Default)]
pub struct Consumer {
    portals: RwLock<HashMap<String, Arc<dyn FunctionPortal>>>,
}

impl Consumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every scheme the portal reports to the portal.
    pub fn register_portal(&self, portal: Arc<dyn FunctionPortal>) {
        let mut portals = self.portals.write().unwrap();
        for scheme in portal.schemes() {
            debug!(%scheme, "portal registered");
            portals.insert(scheme, Arc::clone(&portal));
        }
    }

    /// Point-in-time snapshot of registered schemes.
    pub fn portals(&self) -> Vec<String> {
        let portals = self.portals.read().unwrap();
        let mut schemes: Vec<String> = portals.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Resolve `address` through the owning portal and invoke the function.
    pub async fn call_at(&self, address: &str, params: Value) -> Result<Value, CallError> {
        let scheme = extract_scheme(address)?;
        let portal = {
            let portals = self.portals.read().unwrap();
            portals.get(&scheme).cloned()
        }
        .ok_or(CallError::NoPortal { scheme })?;

        let address = Address::parse(address)?;
        let function = portal.resolve_function(&address).await?;
        function.call(params).await
    }
}

/// Pull the scheme out of an address string: the literal `scheme://` prefix
/// when present, generic URL parsing as the fallback.
fn extract_scheme(address: &str) -> Result<String, CallError> {
    if let Some((scheme, _)) = address.split_once("://") {
        if !scheme.is_empty() {
            return Ok(scheme.to_ascii_lowercase());
        }
    }
    match url::Url::parse(address) {
        Ok(parsed) => Ok(parsed.scheme().to_ascii_lowercase()),
        Err(_) => Err(AddressError::MissingScheme.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalPortal;
    use portico_types::Function;
    use serde_json::json;

    async fn consumer_with_local() -> (Consumer, String) {
        let portal = Arc::new(LocalPortal::new());
        let address = portal
            .apply(Function::from_fn("echo", |p| async move { Ok(p) }))
            .await
            .unwrap();
        let consumer = Consumer::new();
        consumer.register_portal(portal);
        (consumer, address.to_string())
    }

    #[tokio::test]
    async fn routes_to_owning_portal() {
        let (consumer, address) = consumer_with_local().await;
        let result = consumer.call_at(&address, json!({"n": 1})).await.unwrap();
        assert_eq!(result, json!({"n": 1}));
    }

    #[tokio::test]
    async fn unknown_scheme_is_not_registered() {
        let (consumer, _) = consumer_with_local().await;
        match consumer.call_at("wss://elsewhere/f", json!(null)).await {
            Err(CallError::NoPortal { scheme }) => assert_eq!(scheme, "wss"),
            other => panic!("expected NoPortal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn schemeless_address_is_an_address_error() {
        let (consumer, _) = consumer_with_local().await;
        assert!(matches!(
            consumer.call_at("not an address", json!(null)).await,
            Err(CallError::Address(_))
        ));
    }

    #[tokio::test]
    async fn last_portal_wins_per_scheme() {
        let first = Arc::new(LocalPortal::with_instance("first"));
        let second = Arc::new(LocalPortal::with_instance("second"));
        second
            .apply(Function::from_fn("only-on-second", |_| async {
                Ok(json!("second"))
            }))
            .await
            .unwrap();

        let consumer = Consumer::new();
        consumer.register_portal(first);
        consumer.register_portal(second);
        assert_eq!(consumer.portals(), vec!["local".to_string()]);

        let result = consumer
            .call_at("local://second/only-on-second", json!(null))
            .await
            .unwrap();
        assert_eq!(result, json!("second"));
    }

    #[test]
    fn scheme_extraction() {
        assert_eq!(extract_scheme("ws://h/f").unwrap(), "ws");
        assert_eq!(extract_scheme("HTTP://h/f").unwrap(), "http");
        // URL-parse fallback for forms without the literal separator.
        assert_eq!(extract_scheme("mailto:a@b").unwrap(), "mailto");
        assert!(matches!(
            extract_scheme("plainly wrong"),
            Err(CallError::Address(_))
        ));
    }
}
