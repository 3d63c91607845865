//! The HTTP portal: axum server plus reqwest-backed resolution.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use portico_core::{FunctionPortal, NetworkPortal};
use portico_types::{Address, AddressError, BoxFuture, CallError, Function, Service};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::HttpCaller;
use crate::config::HttpPortalConfig;
use crate::middleware::{RequestMiddleware, ResponseMiddleware};
use crate::server;

pub(crate) struct HttpShared {
    config: HttpPortalConfig,
    client: reqwest::Client,
    functions: RwLock<HashMap<String, Function>>,
    services: RwLock<HashMap<String, Service>>,
    listen: RwLock<Option<SocketAddr>>,
    serve_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    request_middleware: RwLock<Vec<Arc<dyn RequestMiddleware>>>,
    response_middleware: RwLock<Vec<Arc<dyn ResponseMiddleware>>>,
}

impl HttpShared {
    pub(crate) fn local_function(&self, name: &str) -> Option<Function> {
        self.functions.read().unwrap().get(name).cloned()
    }
}

/// Portal for functions reachable over HTTP.
///
/// Serving and calling are independent: a portal that never starts its
/// listener still resolves remote addresses through the client path.
pub struct HttpPortal {
    shared: Arc<HttpShared>,
}

impl HttpPortal {
    pub fn new(config: HttpPortalConfig) -> Self {
        let client = reqwest::Client::new();
        Self {
            shared: Arc::new(HttpShared {
                config,
                client,
                functions: RwLock::new(HashMap::new()),
                services: RwLock::new(HashMap::new()),
                listen: RwLock::new(None),
                serve_task: Mutex::new(None),
                closed: AtomicBool::new(false),
                request_middleware: RwLock::new(Vec::new()),
                response_middleware: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Append request middleware; runs in the order added.
    pub fn add_request_middleware(&self, middleware: Arc<dyn RequestMiddleware>) {
        self.shared.request_middleware.write().unwrap().push(middleware);
    }

    /// Append response middleware; best-effort observers.
    pub fn add_response_middleware(&self, middleware: Arc<dyn ResponseMiddleware>) {
        self.shared.response_middleware.write().unwrap().push(middleware);
    }

    /// The call/health router, for mounting into an existing axum app
    /// instead of using [`NetworkPortal::start`].
    pub fn router(&self) -> axum::Router {
        server::router(Arc::clone(&self.shared))
    }

    fn guard_open(&self) -> Result<(), CallError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            Err(CallError::Closed)
        } else {
            Ok(())
        }
    }

    fn authority(&self) -> String {
        match *self.shared.listen.read().unwrap() {
            Some(addr) => addr.to_string(),
            None => format!("{}:{}", self.shared.config.host, self.shared.config.port),
        }
    }

    fn address_for(&self, name: &str, metadata: &BTreeMap<String, String>) -> Result<Address, CallError> {
        let mut builder = Address::builder("http")
            .authority(self.authority())
            .path(format!("call/{name}"));
        for (k, v) in metadata {
            builder = builder.query_param(k, v);
        }
        builder.build().map_err(CallError::from)
    }

    fn remote_caller(&self, address: &Address) -> Function {
        let caller = HttpCaller::new(
            self.shared.client.clone(),
            address,
            self.shared.config.endpoint.clone(),
            self.shared.config.default_timeout,
            self.shared.request_middleware.read().unwrap().clone(),
            self.shared.response_middleware.read().unwrap().clone(),
        );
        Function::new(address.function_name(), None, Arc::new(caller))
    }

    /// Whether this address points at our own listener.
    fn is_self(&self, address: &Address) -> bool {
        let listen = self.shared.listen.read().unwrap();
        match *listen {
            Some(addr) => address.authority() == addr.to_string(),
            None => false,
        }
    }
}

impl FunctionPortal for HttpPortal {
    fn apply(&self, function: Function) -> BoxFuture<'_, Result<Address, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            let address = self.address_for(function.name(), &BTreeMap::new())?;
            debug!(name = function.name(), %address, "http apply");
            self.shared
                .functions
                .write()
                .unwrap()
                .insert(function.name().to_string(), function);
            Ok(address)
        })
    }

    fn apply_service(&self, service: Service) -> BoxFuture<'_, Result<Address, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            let address = self.address_for(service.name(), &BTreeMap::new())?;
            {
                let mut functions = self.shared.functions.write().unwrap();
                for function in service.functions() {
                    let key = format!("{}/{}", service.name(), function.name());
                    functions.insert(key, function.clone());
                }
            }
            self.shared
                .services
                .write()
                .unwrap()
                .insert(service.name().to_string(), service);
            Ok(address)
        })
    }

    fn resolve_function<'a>(
        &'a self,
        address: &'a Address,
    ) -> BoxFuture<'a, Result<Function, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            if !matches!(address.scheme(), "http" | "https") {
                return Err(AddressError::UnsupportedScheme(address.scheme().to_string()).into());
            }
            if self.is_self(address) {
                let name = address.path().trim_start_matches("/call/").to_string();
                return self
                    .shared
                    .local_function(&name)
                    .ok_or(CallError::NotFound { name });
            }
            Ok(self.remote_caller(address))
        })
    }

    fn resolve_service<'a>(
        &'a self,
        address: &'a Address,
    ) -> BoxFuture<'a, Result<Service, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            if !matches!(address.scheme(), "http" | "https") {
                return Err(AddressError::UnsupportedScheme(address.scheme().to_string()).into());
            }
            let name = address.path().trim_start_matches("/call/").to_string();
            self.shared
                .services
                .read()
                .unwrap()
                .get(&name)
                .cloned()
                .ok_or(CallError::NotFound { name })
        })
    }

    fn generate_address<'a>(
        &'a self,
        name: &'a str,
        metadata: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<Address, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            self.address_for(name, metadata)
        })
    }

    fn schemes(&self) -> Vec<String> {
        vec!["http".to_string(), "https".to_string()]
    }

    fn health(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move { self.guard_open() })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            if self.shared.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            debug!("closing http portal");
            if let Some(task) = self.shared.serve_task.lock().unwrap().take() {
                task.abort();
            }
            *self.shared.listen.write().unwrap() = None;
            self.shared.functions.write().unwrap().clear();
            self.shared.services.write().unwrap().clear();
            Ok(())
        })
    }

    fn as_network(&self) -> Option<&dyn NetworkPortal> {
        Some(self)
    }
}

impl NetworkPortal for HttpPortal {
    fn start(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            if self.shared.listen.read().unwrap().is_some() {
                return Ok(());
            }
            let bind = (self.shared.config.host.as_str(), self.shared.config.port);
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .map_err(|e| CallError::network("bind", e.to_string()))?;
            let addr = listener
                .local_addr()
                .map_err(|e| CallError::network("bind", e.to_string()))?;
            *self.shared.listen.write().unwrap() = Some(addr);

            let app = server::router(Arc::clone(&self.shared));
            let task = tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    warn!(error = %e, "http serve loop ended");
                }
            });
            *self.shared.serve_task.lock().unwrap() = Some(task);
            debug!(%addr, "http portal listening");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            if let Some(task) = self.shared.serve_task.lock().unwrap().take() {
                task.abort();
            }
            *self.shared.listen.write().unwrap() = None;
            Ok(())
        })
    }

    fn listen_address(&self) -> Option<SocketAddr> {
        *self.shared.listen.read().unwrap()
    }

    fn base_url(&self) -> Option<String> {
        self.listen_address().map(|addr| format!("http://{addr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Function {
        Function::from_fn("echo", |p| async move { Ok(p) })
    }

    #[tokio::test]
    async fn serves_applied_function_end_to_end() {
        let portal = HttpPortal::new(HttpPortalConfig::default());
        portal.start().await.unwrap();
        let address = portal.apply(echo()).await.unwrap();

        let function = portal.resolve_function(&address).await.unwrap();
        let result = function.call(json!({"hello": "world"})).await.unwrap();
        assert_eq!(result, json!({"hello": "world"}));

        portal.close().await.unwrap();
    }

    #[tokio::test]
    async fn self_addresses_resolve_without_network() {
        let portal = HttpPortal::new(HttpPortalConfig::default());
        portal.start().await.unwrap();
        let address = portal.apply(echo()).await.unwrap();
        assert!(portal.is_self(&address));

        let missing = Address::parse(&format!(
            "http://{}/call/ghost",
            portal.listen_address().unwrap()
        ))
        .unwrap();
        assert!(matches!(
            portal.resolve_function(&missing).await,
            Err(CallError::NotFound { .. })
        ));
        portal.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_fails_fast() {
        let portal = HttpPortal::new(HttpPortalConfig::default());
        portal.start().await.unwrap();
        portal.close().await.unwrap();
        portal.close().await.unwrap();

        assert!(matches!(portal.apply(echo()).await, Err(CallError::Closed)));
        assert!(matches!(portal.health().await, Err(CallError::Closed)));
    }

    #[test]
    fn reports_both_http_schemes() {
        let portal = HttpPortal::new(HttpPortalConfig::default());
        assert_eq!(portal.schemes(), vec!["http", "https"]);
    }
}
