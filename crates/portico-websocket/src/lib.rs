//! WebSocket portal.
//!
//! Every connection is served by exactly one driver task that reads frames
//! in arrival order and drains a bounded outgoing queue; each received frame
//! is dispatched onto its own task, so replies complete out of order and
//! correlation by frame id is the only ordering guarantee. Outbound calls
//! park a oneshot waiter in the per-connection pending map before the frame
//! is queued and are released on reply, timeout, or teardown.
//!
//! Accepted connections arrive through an axum `GET /ws` upgrade; outbound
//! connections are dialed with tokio-tungstenite. Both run the same engine.

#![deny(unsafe_code)]

mod client;
mod config;
mod connection;
mod engine;
mod portal;
mod registration;
mod server;
mod shared;
mod transport;

pub use config::WsConfig;
pub use connection::WsConnection;
pub use portal::WebSocketPortal;
pub use registration::FunctionRegistration;
