//! State shared by a portal's connections and tasks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use portico_core::{ConnectionMiddleware, MessageMiddleware};
use portico_types::{Address, BoxFuture, CallError, Function, Handler, Service};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::WsConfig;
use crate::connection::WsConnection;
use crate::registration::FunctionRegistration;

pub(crate) struct WsShared {
    pub(crate) config: WsConfig,
    /// Arena of live connections, keyed by connection id.
    pub(crate) connections: RwLock<HashMap<u64, Arc<WsConnection>>>,
    /// Dialed-connection reuse: authority → connection id.
    pub(crate) outbound: RwLock<HashMap<String, u64>>,
    pub(crate) registrations: RwLock<HashMap<String, FunctionRegistration>>,
    pub(crate) services: RwLock<HashMap<String, Service>>,
    pub(crate) next_conn_id: AtomicU64,
    pub(crate) closed: AtomicBool,
    pub(crate) listen: RwLock<Option<SocketAddr>>,
    pub(crate) serve_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) connection_middleware: RwLock<Vec<Arc<dyn ConnectionMiddleware>>>,
    pub(crate) message_middleware: RwLock<Vec<Arc<dyn MessageMiddleware>>>,
}

impl WsShared {
    pub(crate) fn new(config: WsConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            connections: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
            registrations: RwLock::new(HashMap::new()),
            services: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            listen: RwLock::new(None),
            serve_task: Mutex::new(None),
            connection_middleware: RwLock::new(Vec::new()),
            message_middleware: RwLock::new(Vec::new()),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn registration(&self, name: &str) -> Option<FunctionRegistration> {
        self.registrations.read().unwrap().get(name).cloned()
    }

    /// Record a function a peer exported over `conn`; inbound resolution
    /// finds it by name and calls back over that connection.
    pub(crate) fn register_remote(
        self: &Arc<Self>,
        conn: &Arc<WsConnection>,
        name: &str,
        _schema: Option<Value>,
    ) -> Result<(), CallError> {
        let address = Address::builder("ws")
            .authority(format!("conn-{}", conn.id()))
            .path(name)
            .build()?;
        let handler = CallbackHandler {
            conn: Arc::clone(conn),
            name: name.to_string(),
        };
        let function = Function::new(name, None, Arc::new(handler));
        let registration = FunctionRegistration::remote(name, address, function, conn.id());
        debug!(conn = conn.id(), name, "peer registered function");
        self.registrations
            .write()
            .unwrap()
            .insert(name.to_string(), registration);
        Ok(())
    }

    /// Tear a connection down. Idempotent: the first caller does the work,
    /// later callers (driver exit racing a portal close) fall through.
    pub(crate) async fn teardown(&self, conn: &Arc<WsConnection>) {
        if !conn.begin_close() {
            return;
        }
        debug!(conn = conn.id(), "connection teardown");
        if let Some(handle) = conn.take_keepalive() {
            handle.abort();
        }
        // Wake the driver so it can drop the socket.
        conn.notify_close();
        // Blocked callers observe closure now, not at their timeout.
        conn.fail_all_pending();
        self.connections.write().unwrap().remove(&conn.id());
        self.outbound
            .write()
            .unwrap()
            .retain(|_, id| *id != conn.id());
        self.registrations
            .write()
            .unwrap()
            .retain(|_, reg| reg.origin() != Some(conn.id()));

        // Best-effort notification only.
        let middleware = self.connection_middleware.read().unwrap().clone();
        for layer in &middleware {
            layer.on_disconnect(conn.info()).await;
        }
    }
}

/// Handler for functions a peer exported: calls travel back over the
/// connection the `register` frame arrived on.
struct CallbackHandler {
    conn: Arc<WsConnection>,
    name: String,
}

impl Handler for CallbackHandler {
    fn call(&self, params: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin(async move { self.conn.call(&self.name, params).await })
    }
}
