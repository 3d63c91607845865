//! The per-connection protocol engine.
//!
//! Exactly one driver task per connection reads frames in arrival order and
//! drains the outgoing queue. Every received frame is dispatched onto its
//! own task, so a slow handler never blocks subsequent reads — replies may
//! complete out of order and correlation by id is the only ordering
//! guarantee callers get.

use std::sync::Arc;

use portico_core::ConnectionInfo;
use portico_types::{CallError, ErrorBody, Frame};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::connection::WsConnection;
use crate::shared::WsShared;
use crate::transport::{FrameTransport, Inbound};

/// Create a connection from an already-established transport and hand back
/// the driver future. The caller decides whether to run it inline (accepted
/// sockets) or spawn it (dialed sockets).
pub(crate) fn attach<T: FrameTransport>(
    shared: &Arc<WsShared>,
    info: ConnectionInfo,
    transport: T,
) -> (Arc<WsConnection>, impl std::future::Future<Output = ()>) {
    let (outgoing_tx, outgoing_rx) = mpsc::channel(shared.config.outgoing_buffer);
    let conn = Arc::new(WsConnection::new(
        info,
        outgoing_tx,
        shared.config.call_timeout,
    ));
    shared
        .connections
        .write()
        .unwrap()
        .insert(conn.id(), Arc::clone(&conn));
    spawn_keepalive(shared, &conn);
    debug!(conn = conn.id(), role = ?conn.role(), "connection attached");

    let driver = drive(Arc::clone(shared), Arc::clone(&conn), transport, outgoing_rx);
    (conn, driver)
}

/// The single reader/writer loop for one connection.
async fn drive<T: FrameTransport>(
    shared: Arc<WsShared>,
    conn: Arc<WsConnection>,
    mut transport: T,
    mut outgoing_rx: mpsc::Receiver<Frame>,
) {
    loop {
        tokio::select! {
            biased;

            // Incoming frames take priority over the outgoing queue.
            result = transport.recv() => match result {
                Ok(Some(Inbound::Frame(frame))) => {
                    conn.touch();
                    dispatch(&shared, &conn, frame);
                }
                Ok(Some(Inbound::Malformed(reason))) => {
                    conn.touch();
                    warn!(conn = conn.id(), %reason, "malformed frame");
                    let frame = Frame::error(
                        "",
                        ErrorBody::new(400, format!("malformed frame: {reason}")),
                    );
                    if transport.send(&frame).await.is_err() {
                        break;
                    }
                }
                Ok(Some(Inbound::Control)) => conn.touch(),
                Ok(None) => {
                    debug!(conn = conn.id(), "peer closed");
                    break;
                }
                Err(e) => {
                    debug!(conn = conn.id(), error = %e, "transport read failed");
                    break;
                }
            },

            maybe = outgoing_rx.recv() => match maybe {
                Some(frame) => {
                    if let Err(e) = transport.send(&frame).await {
                        debug!(conn = conn.id(), error = %e, "transport write failed");
                        break;
                    }
                }
                None => break,
            },

            _ = conn.close_signal() => break,
        }
    }

    transport.close().await;
    shared.teardown(&conn).await;
}

/// Route one frame onto its own task.
fn dispatch(shared: &Arc<WsShared>, conn: &Arc<WsConnection>, frame: Frame) {
    let shared = Arc::clone(shared);
    let conn = Arc::clone(conn);
    tokio::spawn(async move {
        let middleware = shared.message_middleware.read().unwrap().clone();
        for layer in &middleware {
            if let Err(rejection) = layer.on_message(conn.info(), &frame).await {
                debug!(conn = conn.id(), %rejection, "frame rejected");
                // Only frames that expect a reply get an error back.
                if matches!(frame, Frame::Call { .. } | Frame::Register { .. }) {
                    let _ = conn
                        .send_frame(Frame::error(frame.id(), rejection.into()))
                        .await;
                }
                return;
            }
        }

        match frame {
            Frame::Call {
                id,
                function,
                params,
                ..
            } => handle_call(&shared, &conn, id, function, params).await,
            Frame::Response { id, result, .. } => conn.complete(&id, Ok(result)),
            Frame::Error { id, error, .. } => {
                conn.complete(&id, Err(CallError::Function(error)))
            }
            Frame::Register {
                id,
                function,
                schema,
                ..
            } => {
                let reply = match shared.register_remote(&conn, &function, schema) {
                    Ok(()) => {
                        Frame::response(id, serde_json::json!({ "registered": function }))
                    }
                    Err(e) => Frame::error(id, error_body(e)),
                };
                let _ = conn.send_frame(reply).await;
            }
            Frame::Ping { id, .. } => {
                let _ = conn.send_frame(Frame::pong(id)).await;
            }
            Frame::Pong { id, .. } => conn.complete(&id, Ok(serde_json::Value::Null)),
        }
    });
}

/// Execute an inbound call and reply on the same id.
async fn handle_call(
    shared: &Arc<WsShared>,
    conn: &Arc<WsConnection>,
    id: String,
    function: String,
    params: serde_json::Value,
) {
    let Some(registration) = shared.registration(&function) else {
        // Unknown name is an error frame, never a connection failure.
        let _ = conn
            .send_frame(Frame::error(
                id,
                ErrorBody::new(404, format!("function not found: {function}")),
            ))
            .await;
        return;
    };

    let result = match shared.config.handler_timeout {
        Some(limit) => {
            match tokio::time::timeout(limit, registration.function().call(params)).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout { stage: "handler" }),
            }
        }
        None => registration.function().call(params).await,
    };

    let reply = match result {
        Ok(value) => Frame::response(id, value),
        Err(e) => Frame::error(id, error_body(e)),
    };
    let _ = conn.send_frame(reply).await;
}

/// Flatten a call error into a wire error body.
fn error_body(e: CallError) -> ErrorBody {
    match e {
        CallError::Function(body) => body,
        CallError::Timeout { .. } => ErrorBody::new(504, e.to_string()),
        CallError::NotFound { .. } => ErrorBody::new(404, e.to_string()),
        other => ErrorBody::new(500, other.to_string()),
    }
}

/// Periodic liveness task; one per connection, aborted on teardown.
fn spawn_keepalive(shared: &Arc<WsShared>, conn: &Arc<WsConnection>) {
    let Some(interval) = shared.config.ping_interval else {
        return;
    };
    let idle_timeout = shared.config.idle_timeout;
    let shared = Arc::clone(shared);
    let task_conn = Arc::clone(conn);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if task_conn.is_closed() {
                break;
            }
            if task_conn.idle_for() >= idle_timeout {
                warn!(conn = task_conn.id(), "idle past deadline, closing");
                shared.teardown(&task_conn).await;
                break;
            }
            match task_conn.ping(interval).await {
                Ok(()) => {}
                Err(CallError::Closed) => break,
                Err(e) => debug!(conn = task_conn.id(), error = %e, "keepalive ping failed"),
            }
        }
    });
    conn.set_keepalive(handle);
}
