use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::address::Endpoint;
use super::messages::{decode, encode, ControlMessage, Envelope};
use crate::config::SocketConfig;
use crate::control::{Attachment, ControlSlot, TriggerPayload};
use crate::error::StatusError;
use crate::status_line::{classify_status_line, StatusLine};
use crate::traits::{WsConnector, WsError, WsFrame, WsTransport};

/// Connection state of a channel socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; waiting for `connect()` or for the next retry
    Idle,
    /// Transport is being opened
    Connecting,
    /// Transport is open and `init` has been sent
    Open,
    /// Disconnected on request; no retry is scheduled
    Closed,
}

impl ConnectionState {
    /// Connecting or open.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// Soft status text for display, if the state has one.
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            ConnectionState::Connecting => Some("Connecting..."),
            ConnectionState::Open => Some("Connected"),
            _ => None,
        }
    }
}

/// One classified line of a status message.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedLine {
    pub text: String,
    pub kind: StatusLine,
}

/// A decoded `status` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    /// The `data` field as received
    pub raw: String,
    /// Non-blank lines of `raw`, classified
    pub lines: Vec<ClassifiedLine>,
}

/// Events published by a channel socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Status(StatusMessage),
    Preflight {
        checklist: BTreeMap<String, bool>,
        lock_statuses: BTreeMap<String, bool>,
    },
    Hangup,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    Hangup,
    Closed,
    TransportError,
    IdleTimeout,
}

struct Shared {
    endpoint: Endpoint,
    label: String,
    url: String,
    config: SocketConfig,
    connector: Arc<dyn WsConnector>,
    state_tx: watch::Sender<ConnectionState>,
    /// Whether the socket should be connected (and reconnect after drops)
    keep_alive: watch::Sender<bool>,
    /// Bumped to cut a pending retry delay short
    wake: watch::Sender<u64>,
    /// Bumped by `disconnect()` to end the current attempt, session or delay
    cancel: watch::Sender<u64>,
    events_tx: broadcast::Sender<SocketEvent>,
    control: ControlSlot,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn handle_status(&self, data: String) {
        let owner = self.endpoint.channel();
        let lines: Vec<ClassifiedLine> = data
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| ClassifiedLine {
                text: line.to_string(),
                kind: classify_status_line(line, owner),
            })
            .collect();

        for line in &lines {
            if let StatusLine::Trigger { event, tokens, .. } = &line.kind {
                if line.kind.trigger_for(owner).is_none() {
                    debug!(channel = %self.label, event = %event, "Ignoring trigger for another channel");
                    continue;
                }
                let payload = TriggerPayload {
                    tokens: tokens.clone(),
                    raw: line.text.clone(),
                };
                let outcome = self.control.dispatch(event, &payload);
                debug!(channel = %self.label, event = %event, ?outcome, "Dispatched trigger");
            }
        }

        // No subscribers is fine.
        let _ = self.events_tx.send(SocketEvent::Status(StatusMessage { raw: data, lines }));
    }
}

/// Reconnecting WebSocket for one channel.
///
/// The socket owns at most one transport at a time. While it wants to be
/// connected (`connect()` was called and `disconnect()` was not) every
/// dropped connection is retried after the configured delay, forever.
/// `disconnect()` is the only way to stop it and is checked when a retry
/// timer fires, not only when it is scheduled.
///
/// `connect()` spawns the driver task, so it must be called from within a
/// tokio runtime.
///
/// Streams and monitors hold the socket through [`ChannelSocket::retain`];
/// releasing the last hold disconnects it.
pub struct ChannelSocket {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
    holders: AtomicUsize,
}

impl ChannelSocket {
    pub fn new(
        endpoint: impl Into<Endpoint>,
        config: SocketConfig,
        connector: Arc<dyn WsConnector>,
    ) -> Self {
        let endpoint = endpoint.into();
        let url = endpoint.url(&config);
        let label = endpoint.label();
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (keep_alive, _) = watch::channel(false);
        let (wake, _) = watch::channel(0u64);
        let (cancel, _) = watch::channel(0u64);
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                endpoint,
                label,
                url,
                config,
                connector,
                state_tx,
                keep_alive,
                wake,
                cancel,
                events_tx,
                control: ControlSlot::new(),
            }),
            driver: Mutex::new(None),
            holders: AtomicUsize::new(0),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// True while the transport is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Whether dropped connections will be retried.
    pub fn should_reconnect(&self) -> bool {
        *self.shared.keep_alive.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to decoded events.
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Route in-channel triggers to `attachment`, replacing any previous
    /// controller.
    pub fn attach_control(&self, attachment: Attachment) {
        if self.shared.control.attach(attachment).is_some() {
            debug!(channel = %self.shared.label, "Replaced attached controller");
        }
    }

    pub fn detach_control(&self) {
        self.shared.control.detach();
    }

    /// Open the connection. No-op while connecting or open.
    ///
    /// A `connect()` straight after `disconnect()` reopens the socket even
    /// if the driver has not yet observed the disconnect.
    pub fn connect(&self) {
        let was_wanted = self.shared.keep_alive.send_replace(true);
        if was_wanted && self.state().is_active() {
            debug!(channel = %self.shared.label, "Already connected");
            return;
        }

        let mut driver = self.driver.lock().unwrap_or_else(|e| e.into_inner());
        match driver.as_ref() {
            Some(handle) if !handle.is_finished() => {
                // Parked or waiting out a retry delay: go now.
                self.shared.wake.send_modify(|generation| {
                    *generation = generation.wrapping_add(1);
                });
            }
            _ => {
                *driver = Some(tokio::spawn(drive(self.shared.clone())));
            }
        }
    }

    /// Register a user of this socket.
    pub fn retain(&self) {
        self.holders.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop a hold taken with [`retain`](Self::retain). The last release
    /// disconnects the socket.
    pub fn release(&self) {
        let previous = self
            .holders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            debug!(channel = %self.shared.label, "Last holder released socket");
            self.disconnect();
        }
    }

    /// Number of current holders.
    pub fn holders(&self) -> usize {
        self.holders.load(Ordering::SeqCst)
    }

    /// Close the connection and stop retrying. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let was_wanted = self.shared.keep_alive.send_replace(false);
        if was_wanted {
            info!(channel = %self.shared.label, "Disconnecting status channel");
            self.shared.cancel.send_modify(|generation| {
                *generation = generation.wrapping_add(1);
            });
        }

        let driver_running = self
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);
        if !driver_running {
            self.shared.set_state(ConnectionState::Closed);
        }
    }
}

impl Drop for ChannelSocket {
    fn drop(&mut self) {
        let driver = self.driver.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = driver.take() {
            handle.abort();
        }
    }
}

/// Resolves once the socket should be connected. False if the socket is gone.
async fn wanted(keep_rx: &mut watch::Receiver<bool>) -> bool {
    keep_rx.wait_for(|keep| *keep).await.is_ok()
}

/// Resolves on the first `disconnect()` since the receiver was last marked seen.
async fn cancelled(cancel_rx: &mut watch::Receiver<u64>) {
    if cancel_rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Driver task: connect, run the session, wait, repeat.
async fn drive(shared: Arc<Shared>) {
    let mut keep_rx = shared.keep_alive.subscribe();
    let mut wake_rx = shared.wake.subscribe();
    let mut cancel_rx = shared.cancel.subscribe();
    let mut retries: u32 = 0;

    loop {
        if !wanted(&mut keep_rx).await {
            return;
        }
        // Disconnects that happened while parked are already settled.
        cancel_rx.borrow_and_update();

        shared.set_state(ConnectionState::Connecting);
        info!(channel = %shared.label, url = %shared.url, "Connecting status channel");

        let attempt = tokio::select! {
            result = shared.connector.connect(&shared.url) => Some(result),
            _ = cancelled(&mut cancel_rx) => None,
        };

        let interrupted = match attempt {
            None => {
                debug!(channel = %shared.label, "Connect abandoned after disconnect");
                true
            }
            Some(Ok(transport)) => {
                retries = 0;
                shared.set_state(ConnectionState::Open);
                info!(channel = %shared.label, "Status channel open");
                let end = run_session(&shared, transport, &mut cancel_rx).await;
                info!(channel = %shared.label, reason = ?end, "Status channel closed");
                end == SessionEnd::Disconnected
            }
            Some(Err(e)) => {
                let err = StatusError::from(e);
                warn!(
                    channel = %shared.label,
                    category = %err.category(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Failed to connect status channel"
                );
                false
            }
        };

        if !*keep_rx.borrow() {
            shared.set_state(ConnectionState::Closed);
            continue;
        }
        if interrupted {
            // Disconnected and connected again: open a fresh transport now.
            retries = 0;
            continue;
        }

        retries = retries.saturating_add(1);
        let delay = shared.config.reconnect.delay_for(retries);
        // Only wake-ups requested from here on cut this delay short.
        wake_rx.borrow_and_update();
        shared.set_state(ConnectionState::Idle);
        info!(
            channel = %shared.label,
            attempt = retries,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake_rx.changed() => {
                debug!(channel = %shared.label, "Reconnect requested before delay elapsed");
            }
            _ = cancelled(&mut cancel_rx) => {}
        }

        // The flag, not the timer, decides whether to reconnect.
        if !*keep_rx.borrow() {
            shared.set_state(ConnectionState::Closed);
        }
    }
}

/// Read the next frame. `None` means the idle timeout elapsed first.
async fn read_frame(
    transport: &mut dyn WsTransport,
    idle_timeout: Option<Duration>,
) -> Option<Option<Result<WsFrame, WsError>>> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, transport.next_frame()).await.ok(),
        None => Some(transport.next_frame().await),
    }
}

/// Handle one open transport until it closes or the socket is told to stop.
async fn run_session(
    shared: &Shared,
    mut transport: Box<dyn WsTransport>,
    cancel_rx: &mut watch::Receiver<u64>,
) -> SessionEnd {
    if let Err(e) = transport.send_text(encode(ControlMessage::Init)).await {
        warn!(channel = %shared.label, error = %e, "Failed to send init");
        return SessionEnd::TransportError;
    }

    loop {
        let frame = tokio::select! {
            frame = read_frame(transport.as_mut(), shared.config.idle_timeout) => frame,
            _ = cancelled(cancel_rx) => {
                transport.close().await;
                return SessionEnd::Disconnected;
            }
        };

        let text = match frame {
            None => {
                warn!(channel = %shared.label, "No frames within idle timeout, dropping connection");
                transport.close().await;
                return SessionEnd::IdleTimeout;
            }
            Some(None) | Some(Some(Ok(WsFrame::Close))) => return SessionEnd::Closed,
            Some(Some(Err(e))) => {
                let err = StatusError::from(e);
                error!(channel = %shared.label, category = %err.category(), error = %err, "Status channel transport error");
                return SessionEnd::TransportError;
            }
            Some(Some(Ok(WsFrame::Other))) => continue,
            Some(Some(Ok(WsFrame::Text(text)))) => text,
        };

        let Some(envelope) = decode(&text) else {
            continue;
        };

        match envelope {
            Envelope::Ping => {
                debug!(channel = %shared.label, "Received ping, sending pong");
                if let Err(e) = transport.send_text(encode(ControlMessage::Pong)).await {
                    warn!(channel = %shared.label, error = %e, "Failed to send pong");
                    return SessionEnd::TransportError;
                }
            }
            Envelope::Hangup => {
                info!(channel = %shared.label, "Server hung up");
                let _ = shared.events_tx.send(SocketEvent::Hangup);
                transport.close().await;
                return SessionEnd::Hangup;
            }
            Envelope::Status { data } => shared.handle_status(data),
            Envelope::Preflight {
                checklist,
                lock_statuses,
            } => {
                let _ = shared.events_tx.send(SocketEvent::Preflight {
                    checklist,
                    lock_statuses,
                });
            }
            Envelope::Init | Envelope::Pong => {
                debug!(channel = %shared.label, "Ignoring client-side envelope from server");
            }
        }
    }
}
