//! Dial path: outbound connections over tokio-tungstenite.

use std::io;
use std::sync::Arc;

use portico_core::{ConnectionInfo, Role};
use portico_types::{CallError, ConnectionError};
use tracing::debug;

use crate::connection::WsConnection;
use crate::engine;
use crate::shared::WsShared;
use crate::transport::TungsteniteTransport;

/// Dial `url` and return the live connection. The driver runs on its own
/// task; dropping the returned handle does not close the connection —
/// teardown happens through the portal.
pub(crate) async fn dial(
    shared: &Arc<WsShared>,
    url: &str,
) -> Result<Arc<WsConnection>, ConnectionError> {
    if shared.is_closed() {
        return Err(ConnectionError::Closed);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ConnectionError::Io(io::Error::other(e.to_string())))?;

    let info = ConnectionInfo {
        id: shared.next_connection_id(),
        role: Role::Initiator,
        remote: None,
        origin: None,
    };

    // Dialed connections go through the same admission middleware.
    let middleware = shared.connection_middleware.read().unwrap().clone();
    for layer in &middleware {
        if let Err(rejection) = layer.on_connect(&info).await {
            return Err(ConnectionError::Rejected {
                reason: rejection.to_string(),
            });
        }
    }

    debug!(conn = info.id, url, "dialed websocket connection");
    let (conn, driver) = engine::attach(shared, info, TungsteniteTransport::new(stream));
    tokio::spawn(driver);
    Ok(conn)
}

/// Reuse the live connection to `authority`, or dial a fresh one. Stale
/// table entries (closed or torn down) are replaced.
pub(crate) async fn connection_for(
    shared: &Arc<WsShared>,
    scheme: &str,
    authority: &str,
) -> Result<Arc<WsConnection>, CallError> {
    let existing = shared.outbound.read().unwrap().get(authority).copied();
    if let Some(id) = existing {
        let conn = shared.connections.read().unwrap().get(&id).cloned();
        if let Some(conn) = conn {
            if !conn.is_closed() {
                return Ok(conn);
            }
        }
    }

    let url = format!("{scheme}://{authority}/ws");
    let conn = dial(shared, &url).await?;
    shared
        .outbound
        .write()
        .unwrap()
        .insert(authority.to_string(), conn.id());
    Ok(conn)
}
