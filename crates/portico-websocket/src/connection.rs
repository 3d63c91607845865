//! Per-connection state: outgoing queue, pending-call correlation, liveness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use portico_core::{ConnectionInfo, Role};
use portico_types::{CallError, Frame};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

type PendingReply = oneshot::Sender<Result<Value, CallError>>;

/// A live WebSocket connection.
///
/// Outbound frames go through a bounded queue drained by the connection's
/// driver; outbound calls park a oneshot sender in the pending map *before*
/// the frame is queued, so the reply can never race past its waiter. The
/// pending map is emptied on match, caller timeout, or teardown — an entry
/// never outlives its call.
pub struct WsConnection {
    info: ConnectionInfo,
    outgoing: mpsc::Sender<Frame>,
    pending: Mutex<HashMap<String, PendingReply>>,
    next_frame_id: AtomicU64,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
    close_notify: Notify,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    call_timeout: Duration,
}

impl WsConnection {
    pub(crate) fn new(
        info: ConnectionInfo,
        outgoing: mpsc::Sender<Frame>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            info,
            outgoing,
            pending: Mutex::new(HashMap::new()),
            next_frame_id: AtomicU64::new(1),
            last_activity: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            keepalive: Mutex::new(None),
            call_timeout,
        }
    }

    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn role(&self) -> Role {
        self.info.role
    }

    pub(crate) fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> String {
        self.next_frame_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Record inbound activity; any frame counts toward liveness.
    pub(crate) fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    /// Queue a frame for the writer. Fails once the connection is closed;
    /// callers on a torn-down connection never hang.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), CallError> {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| CallError::Closed)
    }

    /// Invoke a remote function and wait for the correlated reply.
    pub async fn call(&self, function: &str, params: Value) -> Result<Value, CallError> {
        let timeout = self.call_timeout;
        self.call_with_timeout(function, params, timeout).await
    }

    pub async fn call_with_timeout(
        &self,
        function: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let id = self.next_id();
        self.request(Frame::call(id, function, params), timeout)
            .await
    }

    /// Announce a function to the peer; resolves once the peer acks.
    pub async fn send_register(
        &self,
        function: &str,
        schema: Option<Value>,
    ) -> Result<(), CallError> {
        let id = self.next_id();
        self.request(Frame::register(id, function, schema), self.call_timeout)
            .await
            .map(|_| ())
    }

    /// Envelope-level liveness probe.
    pub async fn ping(&self, timeout: Duration) -> Result<(), CallError> {
        let id = self.next_id();
        self.request(Frame::ping(id), timeout).await.map(|_| ())
    }

    /// Send a frame that expects a correlated reply and wait for it.
    async fn request(&self, frame: Frame, timeout: Duration) -> Result<Value, CallError> {
        if self.is_closed() {
            return Err(CallError::Closed);
        }
        let id = frame.id().to_string();
        let (tx, rx) = oneshot::channel();
        // Park the waiter before the frame can reach the wire.
        self.pending.lock().unwrap().insert(id.clone(), tx);

        if self.send_frame(frame).await.is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(CallError::Closed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Teardown dropped the sender; the connection is gone.
            Ok(Err(_)) => Err(CallError::Closed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(CallError::Timeout { stage: "websocket" })
            }
        }
    }

    /// Deliver a correlated reply. Replies whose caller already left
    /// (timed out or gone) are dropped with a trace, never blocking the
    /// reader.
    pub(crate) fn complete(&self, id: &str, result: Result<Value, CallError>) {
        let waiter = self.pending.lock().unwrap().remove(id);
        match waiter {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!(conn = self.id(), id, "reply for departed caller dropped");
                }
            }
            None => debug!(conn = self.id(), id, "unmatched reply id"),
        }
    }

    /// First caller wins; later calls see `false` and skip teardown work.
    pub(crate) fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Wake the driver so it can release the socket.
    pub(crate) fn notify_close(&self) {
        self.close_notify.notify_one();
    }

    pub(crate) async fn close_signal(&self) {
        self.close_notify.notified().await;
    }

    /// Drop every pending waiter; blocked callers observe closure
    /// immediately instead of waiting out their timeout.
    pub(crate) fn fail_all_pending(&self) {
        let drained: Vec<PendingReply> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(CallError::Closed));
        }
    }

    pub(crate) fn set_keepalive(&self, handle: JoinHandle<()>) {
        *self.keepalive.lock().unwrap() = Some(handle);
    }

    pub(crate) fn take_keepalive(&self) -> Option<JoinHandle<()>> {
        self.keepalive.lock().unwrap().take()
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
