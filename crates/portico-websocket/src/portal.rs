//! The WebSocket portal.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Router;
use portico_core::{
    ConnectionMiddleware, FunctionPortal, MessageMiddleware, NetworkPortal,
};
use portico_types::{Address, AddressError, BoxFuture, CallError, Function, Handler, Service};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client;
use crate::config::WsConfig;
use crate::connection::WsConnection;
use crate::registration::FunctionRegistration;
use crate::server;
use crate::shared::WsShared;

/// Portal for functions reachable over a persistent WebSocket connection.
///
/// One portal serves both directions: `start` accepts connections on a
/// `GET /ws` upgrade endpoint, [`WebSocketPortal::connect`] dials out, and
/// resolution works against either. Name resolution consults the portal's
/// registration table first (applied functions and functions a peer exported
/// with a `register` frame), then falls back to dialing the address
/// authority.
pub struct WebSocketPortal {
    shared: Arc<WsShared>,
}

impl WebSocketPortal {
    pub fn new(config: WsConfig) -> Self {
        Self {
            shared: WsShared::new(config),
        }
    }

    /// Append connection middleware; runs on accept and dial, in order.
    pub fn add_connection_middleware(&self, middleware: Arc<dyn ConnectionMiddleware>) {
        self.shared
            .connection_middleware
            .write()
            .unwrap()
            .push(middleware);
    }

    /// Append message middleware; runs per received frame, in order.
    pub fn add_message_middleware(&self, middleware: Arc<dyn MessageMiddleware>) {
        self.shared
            .message_middleware
            .write()
            .unwrap()
            .push(middleware);
    }

    /// The upgrade router, for mounting into an existing axum app instead
    /// of using [`NetworkPortal::start`].
    pub fn router(&self) -> Router {
        server::router(Arc::clone(&self.shared))
    }

    /// Dial `url` and return the live connection. The connection is tracked
    /// by the portal and torn down with it.
    pub async fn connect(&self, url: &str) -> Result<Arc<WsConnection>, CallError> {
        Ok(client::dial(&self.shared, url).await?)
    }

    /// Export an applied function to the peer on `conn`. The peer records a
    /// registration that calls back over this connection.
    pub async fn export(&self, conn: &WsConnection, name: &str) -> Result<(), CallError> {
        let registration = self
            .shared
            .registration(name)
            .ok_or_else(|| CallError::NotFound {
                name: name.to_string(),
            })?;
        let schema = registration.schema().map(|s| s.to_json_schema());
        conn.send_register(name, schema).await
    }

    /// Every function this portal can dispatch inbound calls to.
    pub fn registrations(&self) -> Vec<FunctionRegistration> {
        self.shared
            .registrations
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.read().unwrap().len()
    }

    fn guard_open(&self) -> Result<(), CallError> {
        if self.shared.is_closed() {
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

    fn address_for(
        &self,
        name: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Address, CallError> {
        let mut builder = Address::builder("ws").authority(self.authority()).path(name);
        for (k, v) in metadata {
            builder = builder.query_param(k, v);
        }
        builder.build().map_err(CallError::from)
    }
}

/// Handler for functions behind a remote portal; each call reuses the live
/// connection to the authority or dials a new one.
struct RemoteCaller {
    shared: Arc<WsShared>,
    scheme: String,
    authority: String,
    name: String,
}

impl Handler for RemoteCaller {
    fn call(&self, params: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin(async move {
            let conn =
                client::connection_for(&self.shared, &self.scheme, &self.authority).await?;
            conn.call(&self.name, params).await
        })
    }
}

impl FunctionPortal for WebSocketPortal {
    fn apply(&self, function: Function) -> BoxFuture<'_, Result<Address, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            let address = self.address_for(function.name(), &BTreeMap::new())?;
            debug!(name = function.name(), %address, "websocket apply");
            let name = function.name().to_string();
            let registration =
                FunctionRegistration::local(name, address.clone(), function);
            self.shared
                .registrations
                .write()
                .unwrap()
                .insert(registration.name().to_string(), registration);
            Ok(address)
        })
    }

    fn apply_service(&self, service: Service) -> BoxFuture<'_, Result<Address, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            let address = self.address_for(service.name(), &BTreeMap::new())?;
            {
                let mut registrations = self.shared.registrations.write().unwrap();
                for function in service.functions() {
                    let name = format!("{}/{}", service.name(), function.name());
                    let member = self.address_for(&name, &BTreeMap::new())?;
                    registrations.insert(
                        name.clone(),
                        FunctionRegistration::local(name, member, function.clone()),
                    );
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
            if !matches!(address.scheme(), "ws" | "wss") {
                return Err(AddressError::UnsupportedScheme(address.scheme().to_string()).into());
            }
            let name = address.path().trim_start_matches('/').to_string();

            // Known names resolve directly: functions applied here and
            // functions a peer registered over a live connection.
            if let Some(registration) = self.shared.registration(&name) {
                return Ok(registration.function().clone());
            }

            let is_self = match *self.shared.listen.read().unwrap() {
                Some(addr) => address.authority() == addr.to_string(),
                None => false,
            };
            if is_self || address.authority().is_empty() {
                return Err(CallError::NotFound { name });
            }

            let caller = RemoteCaller {
                shared: Arc::clone(&self.shared),
                scheme: address.scheme().to_string(),
                authority: address.authority().to_string(),
                name: name.clone(),
            };
            Ok(Function::new(name, None, Arc::new(caller)))
        })
    }

    fn resolve_service<'a>(
        &'a self,
        address: &'a Address,
    ) -> BoxFuture<'a, Result<Service, CallError>> {
        Box::pin(async move {
            self.guard_open()?;
            if !matches!(address.scheme(), "ws" | "wss") {
                return Err(AddressError::UnsupportedScheme(address.scheme().to_string()).into());
            }
            let name = address.path().trim_start_matches('/').to_string();
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
        vec!["ws".to_string(), "wss".to_string()]
    }

    fn health(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move { self.guard_open() })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), CallError>> {
        Box::pin(async move {
            if self.shared.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            debug!("closing websocket portal");
            if let Some(task) = self.shared.serve_task.lock().unwrap().take() {
                task.abort();
            }
            *self.shared.listen.write().unwrap() = None;

            let connections: Vec<Arc<WsConnection>> = self
                .shared
                .connections
                .read()
                .unwrap()
                .values()
                .cloned()
                .collect();
            for conn in connections {
                self.shared.teardown(&conn).await;
            }

            self.shared.registrations.write().unwrap().clear();
            self.shared.services.write().unwrap().clear();
            self.shared.outbound.write().unwrap().clear();
            Ok(())
        })
    }

    fn as_network(&self) -> Option<&dyn NetworkPortal> {
        Some(self)
    }
}

impl NetworkPortal for WebSocketPortal {
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
                    warn!(error = %e, "websocket serve loop ended");
                }
            });
            *self.shared.serve_task.lock().unwrap() = Some(task);
            debug!(%addr, "websocket portal listening");
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
        self.listen_address().map(|addr| format!("ws://{addr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn quiet_config() -> WsConfig {
        WsConfig {
            ping_interval: None,
            call_timeout: Duration::from_secs(2),
            ..WsConfig::default()
        }
    }

    fn echo() -> Function {
        Function::from_fn("echo", |p| async move { Ok(p) })
    }

    #[tokio::test]
    async fn resolves_applied_function_by_name() {
        let portal = WebSocketPortal::new(quiet_config());
        let address = portal.apply(echo()).await.unwrap();
        let function = portal.resolve_function(&address).await.unwrap();
        let result = function.call(json!({"n": 7})).await.unwrap();
        assert_eq!(result, json!({"n": 7}));
    }

    #[tokio::test]
    async fn dial_resolve_and_call_across_portals() {
        let server = WebSocketPortal::new(quiet_config());
        server.start().await.unwrap();
        server.apply(echo()).await.unwrap();
        let listen = server.listen_address().unwrap();

        let client = WebSocketPortal::new(quiet_config());
        let address = Address::parse(&format!("ws://{listen}/echo")).unwrap();
        let function = client.resolve_function(&address).await.unwrap();
        let result = function.call(json!({"from": "client"})).await.unwrap();
        assert_eq!(result, json!({"from": "client"}));

        // The dialed connection is reused for the next call.
        assert_eq!(client.connection_count(), 1);
        let again = function.call(json!(2)).await.unwrap();
        assert_eq!(again, json!(2));
        assert_eq!(client.connection_count(), 1);

        client.close().await.unwrap();
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_tears_down_connections_and_fails_fast() {
        let server = WebSocketPortal::new(quiet_config());
        server.start().await.unwrap();
        server.apply(echo()).await.unwrap();
        let base = server.base_url().unwrap();

        let client = WebSocketPortal::new(quiet_config());
        let conn = client.connect(&format!("{base}/ws")).await.unwrap();
        assert_eq!(client.connection_count(), 1);

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(client.connection_count(), 0);
        assert!(matches!(
            conn.call("echo", json!(null)).await,
            Err(CallError::Closed)
        ));
        assert!(matches!(client.apply(echo()).await, Err(CallError::Closed)));

        // A closed portal refuses to dial at all.
        assert!(matches!(
            client.connect(&format!("{base}/ws")).await,
            Err(CallError::Closed)
        ));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn wrong_scheme_is_rejected() {
        let portal = WebSocketPortal::new(quiet_config());
        let address = Address::parse("http://somewhere/echo").unwrap();
        assert!(matches!(
            portal.resolve_function(&address).await,
            Err(CallError::Address(AddressError::UnsupportedScheme(_)))
        ));
    }

    #[test]
    fn reports_both_ws_schemes() {
        let portal = WebSocketPortal::new(quiet_config());
        assert_eq!(portal.schemes(), vec!["ws", "wss"]);
    }

    #[tokio::test]
    async fn service_members_resolve_by_path() {
        let portal = WebSocketPortal::new(quiet_config());
        let svc = Service::new("math").with_function(Function::from_fn("add", |p| async move {
            let a = p["a"].as_i64().unwrap_or(0);
            let b = p["b"].as_i64().unwrap_or(0);
            Ok(Value::from(a + b))
        }));
        let address = portal.apply_service(svc).await.unwrap();

        let resolved = portal.resolve_service(&address).await.unwrap();
        assert!(resolved.function("add").is_some());

        let member = portal
            .resolve_function(&Address::parse("ws://ignored/math/add").unwrap())
            .await
            .unwrap();
        assert_eq!(member.call(json!({"a": 4, "b": 5})).await.unwrap(), json!(9));
    }
}
