//! Socket adapters: one frame envelope, two socket libraries.
//!
//! Accepted connections arrive as `axum::extract::ws::WebSocket`; dialed
//! connections as a tokio-tungstenite stream. Both are adapted to
//! [`FrameTransport`] so the driver only ever sees envelope frames.

use std::future::Future;
use std::io;

use futures_util::{SinkExt, StreamExt};
use portico_types::Frame;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::WebSocketStream;

/// One received event, after framing.
pub(crate) enum Inbound {
    /// A parsed envelope frame.
    Frame(Frame),
    /// Text that was not a valid envelope; answered with an error frame,
    /// the connection stays open.
    Malformed(String),
    /// Transport-level control traffic; counts as liveness, nothing more.
    Control,
}

/// Transport abstraction the driver runs against.
pub(crate) trait FrameTransport: Send {
    fn send(&mut self, frame: &Frame) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive the next event. `Ok(None)` means the peer closed cleanly.
    fn recv(&mut self) -> impl Future<Output = io::Result<Option<Inbound>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

fn encode(frame: &Frame) -> io::Result<String> {
    serde_json::to_string(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn decode(text: &str) -> Inbound {
    match serde_json::from_str::<Frame>(text) {
        Ok(frame) => Inbound::Frame(frame),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}

// ============================================================================
// Accepted connections (axum)
// ============================================================================

pub(crate) struct AxumTransport {
    socket: axum::extract::ws::WebSocket,
}

impl AxumTransport {
    pub(crate) fn new(socket: axum::extract::ws::WebSocket) -> Self {
        Self { socket }
    }
}

impl FrameTransport for AxumTransport {
    async fn send(&mut self, frame: &Frame) -> io::Result<()> {
        let text = encode(frame)?;
        self.socket
            .send(axum::extract::ws::Message::Text(text.into()))
            .await
            .map_err(io::Error::other)
    }

    async fn recv(&mut self) -> io::Result<Option<Inbound>> {
        use axum::extract::ws::Message;
        match self.socket.recv().await {
            None => Ok(None),
            Some(Err(e)) => Err(io::Error::other(e)),
            Some(Ok(Message::Text(text))) => {
                let text: &str = text.as_ref();
                Ok(Some(decode(text)))
            }
            Some(Ok(Message::Binary(_))) => Ok(Some(Inbound::Malformed(
                "binary frames are not part of the protocol".to_string(),
            ))),
            // axum answers pings itself; both directions count as liveness.
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(Some(Inbound::Control)),
            Some(Ok(Message::Close(_))) => Ok(None),
        }
    }

    async fn close(&mut self) {
        let _ = self
            .socket
            .send(axum::extract::ws::Message::Close(None))
            .await;
    }
}

// ============================================================================
// Dialed connections (tokio-tungstenite)
// ============================================================================

pub(crate) struct TungsteniteTransport<S> {
    stream: WebSocketStream<S>,
}

impl<S> TungsteniteTransport<S> {
    pub(crate) fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl<S> FrameTransport for TungsteniteTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: &Frame) -> io::Result<()> {
        let text = encode(frame)?;
        self.stream
            .send(TungsteniteMessage::Text(text.into()))
            .await
            .map_err(|e| io::Error::other(e.to_string()))
    }

    async fn recv(&mut self) -> io::Result<Option<Inbound>> {
        match self.stream.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(io::Error::other(e.to_string())),
            Some(Ok(TungsteniteMessage::Text(text))) => {
                let text: &str = text.as_ref();
                Ok(Some(decode(text)))
            }
            Some(Ok(TungsteniteMessage::Binary(_))) => Ok(Some(Inbound::Malformed(
                "binary frames are not part of the protocol".to_string(),
            ))),
            Some(Ok(TungsteniteMessage::Ping(data))) => {
                // Answer control pings ourselves on the dialed side.
                let _ = self.stream.send(TungsteniteMessage::Pong(data)).await;
                Ok(Some(Inbound::Control))
            }
            Some(Ok(TungsteniteMessage::Pong(_))) => Ok(Some(Inbound::Control)),
            Some(Ok(TungsteniteMessage::Close(_))) => Ok(None),
            // Raw frames don't surface from a configured stream.
            Some(Ok(TungsteniteMessage::Frame(_))) => Ok(Some(Inbound::Control)),
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
