//! Status stream: binds a channel socket to a status panel.
//!
//! A [`StatusStream`] subscribes to the socket of one `runId:channel`,
//! appends every received line to its [`LogBuffer`], keeps the panel's
//! current-status line up to date, forwards exception lines to an optional
//! [`StacktraceResolver`] and announces appends and in-channel triggers on
//! a broadcast channel.
//!
//! ```ignore
//! let hub = ChannelHub::new(SocketConfig::default(), Arc::new(TungsteniteConnector::new()));
//! let stream = StatusStream::attach(
//!     &hub,
//!     StatusStreamOptions::new(panel, "dusty-sandpiper", "wepp")
//!         .with_log_limit(500)
//!         .on_trigger(|trigger| println!("{}", trigger.event)),
//! )?;
//! stream.append("Submitting job...");
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::control::{Attachment, TriggerPayload};
use crate::error::StatusResult;
use crate::log_buffer::{LogBuffer, LogEntry};
use crate::stacktrace::{JobInfoFetcher, StacktraceResolver};
use crate::status_line::{summarize, StatusLine};
use crate::traits::{StacktracePanel, StatusPanel};
use crate::websocket::{
    ChannelAddress, ChannelHub, ChannelSocket, ConnectionState, SocketEvent, StatusMessage,
};

/// Capacity of the stream event channel.
const STREAM_EVENT_CAPACITY: usize = 256;

/// Callback run for every in-channel trigger.
pub type TriggerCallback = Arc<dyn Fn(&TriggerEvent) + Send + Sync>;

/// An in-channel trigger seen by a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub channel: String,
    pub event: String,
    pub payload: TriggerPayload,
}

/// Activity announced by a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A line was appended to the log
    Append(String),
    /// An in-channel trigger arrived
    Trigger(TriggerEvent),
}

/// Stacktrace panel and the fetcher that fills it.
#[derive(Clone)]
pub struct StacktraceOptions {
    pub panel: Arc<dyn StacktracePanel>,
    pub fetcher: Arc<dyn JobInfoFetcher>,
}

/// Options for [`StatusStream::attach`].
#[derive(Clone)]
pub struct StatusStreamOptions {
    panel: Arc<dyn StatusPanel>,
    run_id: String,
    channel: String,
    log_limit: Option<usize>,
    stacktrace: Option<StacktraceOptions>,
    on_trigger: Option<TriggerCallback>,
}

impl StatusStreamOptions {
    pub fn new(
        panel: Arc<dyn StatusPanel>,
        run_id: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            panel,
            run_id: run_id.into(),
            channel: channel.into(),
            log_limit: None,
            stacktrace: None,
            on_trigger: None,
        }
    }

    /// Keep at most `limit` log entries. Zero means unlimited.
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = Some(limit);
        self
    }

    /// Fetch and show stacktraces for exception lines.
    pub fn with_stacktrace(
        mut self,
        panel: Arc<dyn StacktracePanel>,
        fetcher: Arc<dyn JobInfoFetcher>,
    ) -> Self {
        self.stacktrace = Some(StacktraceOptions { panel, fetcher });
        self
    }

    /// Run `callback` for every in-channel trigger.
    pub fn on_trigger(mut self, callback: impl Fn(&TriggerEvent) + Send + Sync + 'static) -> Self {
        self.on_trigger = Some(Arc::new(callback));
        self
    }
}

struct StreamInner {
    label: String,
    channel: String,
    panel: Arc<dyn StatusPanel>,
    log: Mutex<LogBuffer>,
    events: broadcast::Sender<StreamEvent>,
    stacktrace: Option<StacktraceResolver>,
    on_trigger: Option<TriggerCallback>,
}

impl StreamInner {
    /// Append to the log, re-render and announce.
    fn append_line(&self, text: &str) {
        {
            let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
            log.append(text);
            self.panel.render_log(&log);
        }
        self.panel.scroll_to_bottom();
        // No listeners is fine.
        let _ = self.events.send(StreamEvent::Append(text.to_string()));
    }

    fn handle_status(&self, message: StatusMessage) {
        for line in message.lines {
            self.append_line(&line.text);

            match &line.kind {
                StatusLine::Plain { .. } | StatusLine::CommandBarResult { .. } => {
                    if let Some(text) = line.kind.display_text() {
                        self.panel.set_status(text);
                    }
                }
                StatusLine::Trigger {
                    channel,
                    event,
                    tokens,
                } => {
                    if line.kind.trigger_for(&self.channel).is_none() {
                        continue;
                    }
                    self.emit_trigger(TriggerEvent {
                        channel: channel.clone(),
                        event: event.clone(),
                        payload: TriggerPayload {
                            tokens: tokens.clone(),
                            raw: line.text.clone(),
                        },
                    });
                }
                StatusLine::Exception { job_id, .. } => {
                    if let Some(failure) = line.kind.job_failure() {
                        warn!(channel = %self.label, category = %failure.category(), error = %failure, "Job reported an exception");
                    }
                    match &self.stacktrace {
                        Some(resolver) => {
                            let outcome = resolver.resolve(job_id);
                            debug!(channel = %self.label, job_id = %job_id, ?outcome, "Exception line");
                        }
                        None => debug!(channel = %self.label, job_id = %job_id, "Exception line, no stacktrace panel"),
                    }
                }
            }
        }
    }

    fn emit_trigger(&self, trigger: TriggerEvent) {
        info!(channel = %self.label, event = %trigger.event, "Trigger received");
        if let Some(callback) = &self.on_trigger {
            if catch_unwind(AssertUnwindSafe(|| callback(&trigger))).is_err() {
                warn!(channel = %self.label, event = %trigger.event, "Trigger callback panicked");
            }
        }
        let _ = self.events.send(StreamEvent::Trigger(trigger));
    }

    fn show_state(&self, state: ConnectionState) {
        if let Some(text) = state.status_text() {
            self.panel.set_status(text);
        }
    }
}

/// Live status feed of one channel rendered into one panel.
pub struct StatusStream {
    id: Uuid,
    address: ChannelAddress,
    socket: Arc<ChannelSocket>,
    inner: Arc<StreamInner>,
    task: JoinHandle<()>,
}

impl StatusStream {
    /// Bind a panel to the `run_id:channel` socket of `hub` and connect it.
    ///
    /// The socket is created on first use and shared with every other
    /// stream or controller using the same address. Must be called from
    /// within a tokio runtime.
    pub fn attach(hub: &ChannelHub, options: StatusStreamOptions) -> StatusResult<Self> {
        let address = ChannelAddress::new(options.run_id, options.channel)?;
        let socket = hub.socket(&address);

        let (events, _) = broadcast::channel(STREAM_EVENT_CAPACITY);
        let inner = Arc::new(StreamInner {
            label: address.segment(),
            channel: address.channel().to_string(),
            panel: options.panel,
            log: Mutex::new(LogBuffer::with_limit(options.log_limit)),
            events,
            stacktrace: options
                .stacktrace
                .map(|s| StacktraceResolver::new(s.panel, s.fetcher)),
            on_trigger: options.on_trigger,
        });

        // Subscribe before connecting so no early frame is missed.
        let socket_events = socket.subscribe();
        let state = socket.state_receiver();
        let task = tokio::spawn(run(inner.clone(), socket_events, state));

        let id = Uuid::new_v4();
        socket.retain();
        info!(stream = %id, channel = %address, "Attached status stream");
        socket.connect();

        Ok(Self {
            id,
            address,
            socket,
            inner,
            task,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    pub fn socket(&self) -> &Arc<ChannelSocket> {
        &self.socket
    }

    /// Append a client-side line, e.g. "Submitting job...".
    ///
    /// The line goes to the log and becomes the current status.
    pub fn append(&self, message: &str) {
        self.inner.append_line(message);
        self.inner.panel.set_status(&summarize(message));
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    /// Tear down the underlying socket. Reconnection stops.
    ///
    /// Dropping the stream only disconnects once no other stream or monitor
    /// holds the socket.
    pub fn disconnect(&self) {
        self.socket.disconnect();
    }

    /// Route in-channel triggers of this stream's socket to a controller.
    pub fn attach_control(&self, attachment: Attachment) {
        self.socket.attach_control(attachment);
    }

    /// Receive appends and triggers from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the log, oldest first.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.inner
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries()
    }

    /// Log text joined with newlines.
    pub fn log_text(&self) -> String {
        self.inner
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .text()
    }

    pub fn clear_log(&self) {
        let mut log = self.inner.log.lock().unwrap_or_else(|e| e.into_inner());
        log.clear();
        self.inner.panel.render_log(&log);
    }
}

impl Drop for StatusStream {
    fn drop(&mut self) {
        self.task.abort();
        self.socket.release();
    }
}

async fn run(
    inner: Arc<StreamInner>,
    mut events: broadcast::Receiver<SocketEvent>,
    mut state: watch::Receiver<ConnectionState>,
) {
    let initial = *state.borrow_and_update();
    inner.show_state(initial);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SocketEvent::Status(message)) => inner.handle_status(message),
                Ok(SocketEvent::Hangup) => debug!(channel = %inner.label, "Server hung up"),
                Ok(SocketEvent::Preflight { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %inner.label, skipped, "Status stream fell behind, messages dropped");
                }
                Err(RecvError::Closed) => return,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
                let current = *state.borrow_and_update();
                inner.show_state(current);
            }
        }
    }
}
