//! Scripted WebSocket connector for testing.
//!
//! Every accepted connection gets a [`MockServer`] handle that plays the
//! server side: push frames to the client, read what the client sent, end
//! the stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::traits::{WsConnector, WsError, WsFrame, WsTransport};

type FrameTx = mpsc::UnboundedSender<Result<WsFrame, WsError>>;
type FrameRx = mpsc::UnboundedReceiver<Result<WsFrame, WsError>>;

/// Mock connector for testing.
///
/// # Example
///
/// ```ignore
/// use wepp_status::adapters::mock::MockConnector;
///
/// let connector = MockConnector::new();
/// let socket = ChannelSocket::new(address, SocketConfig::default(), Arc::new(connector.clone()));
/// socket.connect();
///
/// let server = connector.wait_for_connection(0).await;
/// server.send_text(r#"{"type":"ping"}"#);
/// let sent = server.wait_for_sent(2).await; // init + pong
/// ```
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<ConnectorState>,
}

struct ConnectorState {
    attempted_urls: Mutex<Vec<String>>,
    refusals: Mutex<VecDeque<WsError>>,
    refuse_all: Mutex<Option<WsError>>,
    servers: Mutex<Vec<MockServer>>,
    attempts: watch::Sender<usize>,
    accepted: watch::Sender<usize>,
}

impl Default for ConnectorState {
    fn default() -> Self {
        Self {
            attempted_urls: Mutex::new(Vec::new()),
            refusals: Mutex::new(VecDeque::new()),
            refuse_all: Mutex::new(None),
            servers: Mutex::new(Vec::new()),
            attempts: watch::channel(0).0,
            accepted: watch::channel(0).0,
        }
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next connection attempt with `err`. Calls queue up.
    pub fn refuse_next(&self, err: WsError) {
        self.inner.refusals.lock().unwrap().push_back(err);
    }

    /// Fail every attempt with `err` until [`MockConnector::accept_all`].
    pub fn refuse_all(&self, err: WsError) {
        *self.inner.refuse_all.lock().unwrap() = Some(err);
    }

    /// Stop refusing attempts.
    pub fn accept_all(&self) {
        *self.inner.refuse_all.lock().unwrap() = None;
    }

    /// Number of connection attempts, successful or not.
    pub fn attempts(&self) -> usize {
        *self.inner.attempts.borrow()
    }

    /// URLs of all attempts, in order.
    pub fn attempted_urls(&self) -> Vec<String> {
        self.inner.attempted_urls.lock().unwrap().clone()
    }

    /// Number of accepted connections.
    pub fn connection_count(&self) -> usize {
        *self.inner.accepted.borrow()
    }

    /// Server handle of accepted connection `index`.
    pub fn server(&self, index: usize) -> Option<MockServer> {
        self.inner.servers.lock().unwrap().get(index).cloned()
    }

    /// Wait until connection `index` (0-based) has been accepted.
    pub async fn wait_for_connection(&self, index: usize) -> MockServer {
        let mut rx = self.inner.accepted.subscribe();
        let _ = rx.wait_for(|count| *count > index).await;
        self.server(index).expect("accepted connection is recorded")
    }

    /// Wait until at least `count` attempts have been made.
    pub async fn wait_for_attempts(&self, count: usize) {
        let mut rx = self.inner.attempts.subscribe();
        let _ = rx.wait_for(|attempts| *attempts >= count).await;
    }
}

#[async_trait]
impl WsConnector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsTransport>, WsError> {
        self.inner.attempted_urls.lock().unwrap().push(url.to_string());
        self.inner.attempts.send_modify(|n| *n += 1);

        if let Some(err) = self.inner.refusals.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(err) = self.inner.refuse_all.lock().unwrap().clone() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let server = MockServer::new(tx);
        let transport = MockTransport {
            incoming: rx,
            sent: server.sent.clone(),
            closed: server.closed.clone(),
        };

        self.inner.servers.lock().unwrap().push(server);
        self.inner.accepted.send_modify(|n| *n += 1);
        Ok(Box::new(transport))
    }
}

/// Server side of one mock connection.
#[derive(Clone)]
pub struct MockServer {
    incoming: Arc<Mutex<Option<FrameTx>>>,
    sent: Arc<watch::Sender<Vec<String>>>,
    closed: Arc<watch::Sender<bool>>,
}

impl MockServer {
    fn new(tx: FrameTx) -> Self {
        let (sent, _) = watch::channel(Vec::new());
        let (closed, _) = watch::channel(false);
        Self {
            incoming: Arc::new(Mutex::new(Some(tx))),
            sent: Arc::new(sent),
            closed: Arc::new(closed),
        }
    }

    fn push(&self, frame: Result<WsFrame, WsError>) {
        if let Some(tx) = self.incoming.lock().unwrap().as_ref() {
            // Client may already be gone.
            let _ = tx.send(frame);
        }
    }

    /// Push a raw text frame.
    pub fn send_text(&self, text: &str) {
        self.push(Ok(WsFrame::Text(text.to_string())));
    }

    /// Push a JSON envelope.
    pub fn send_json(&self, value: serde_json::Value) {
        self.send_text(&value.to_string());
    }

    /// Push a `status` envelope carrying `data`.
    pub fn send_status(&self, data: &str) {
        self.send_json(serde_json::json!({ "type": "status", "data": data }));
    }

    /// Push a `ping` envelope.
    pub fn send_ping(&self) {
        self.send_json(serde_json::json!({ "type": "ping" }));
    }

    /// Push a `hangup` envelope.
    pub fn send_hangup(&self) {
        self.send_json(serde_json::json!({ "type": "hangup" }));
    }

    /// Push a close frame.
    pub fn send_close(&self) {
        self.push(Ok(WsFrame::Close));
    }

    /// Push a transport error.
    pub fn send_error(&self, err: WsError) {
        self.push(Err(err));
    }

    /// End the stream without a close frame.
    pub fn end(&self) {
        self.incoming.lock().unwrap().take();
    }

    /// Frames the client has sent so far.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }

    /// Wait until the client has sent at least `count` frames.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<String> {
        let mut rx = self.sent.subscribe();
        let result = rx.wait_for(|frames| frames.len() >= count).await;
        match result {
            Ok(frames) => frames.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether the client closed this connection.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Wait until the client closes this connection.
    pub async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Client side of one mock connection.
struct MockTransport {
    incoming: FrameRx,
    sent: Arc<watch::Sender<Vec<String>>>,
    closed: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl WsTransport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<(), WsError> {
        if *self.closed.borrow() {
            return Err(WsError::SendFailed("connection closed".to_string()));
        }
        self.sent.send_modify(|frames| frames.push(text));
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<WsFrame, WsError>> {
        if *self.closed.borrow() {
            return None;
        }
        self.incoming.recv().await
    }

    async fn close(&mut self) {
        self.closed.send_replace(true);
    }
}
