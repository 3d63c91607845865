//! Accept path: axum upgrade endpoint and connection admission.

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use portico_core::{ConnectionInfo, Role};
use tracing::{debug, warn};

use crate::engine;
use crate::shared::WsShared;
use crate::transport::AxumTransport;

pub(crate) fn router(shared: Arc<WsShared>) -> Router {
    Router::new()
        .route("/ws", get(handle_upgrade))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(shared)
}

/// Admit or reject an upgrade.
///
/// Origin filtering and connection middleware both run before the upgrade
/// completes, so a rejection aborts the handshake with an HTTP status
/// instead of opening a doomed socket.
async fn handle_upgrade(
    State(shared): State<Arc<WsShared>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if shared.is_closed() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if !shared.config.origin_allowed(origin.as_deref()) {
        warn!(?origin, "origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    let info = ConnectionInfo {
        id: shared.next_connection_id(),
        role: Role::Acceptor,
        remote: None,
        origin,
    };

    let middleware = shared.connection_middleware.read().unwrap().clone();
    for layer in &middleware {
        if let Err(rejection) = layer.on_connect(&info).await {
            warn!(conn = info.id, %rejection, "connection rejected");
            return (StatusCode::FORBIDDEN, rejection.message).into_response();
        }
    }

    let max_message_size = shared.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            debug!(conn = info.id, "accepted websocket connection");
            let (_conn, driver) = engine::attach(&shared, info, AxumTransport::new(socket));
            // The upgrade task is this connection's driver.
            driver.await;
        })
}
