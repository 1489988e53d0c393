//! WebSocket transport trait abstraction.
//!
//! A [`WsConnector`] opens one physical connection per call and hands back a
//! [`WsTransport`]. The channel socket owns the transport for the lifetime
//! of a single session and drops it when the session ends, so a closed
//! transport is never touched again.

use async_trait::async_trait;

/// WebSocket connection errors.
#[derive(Debug, Clone, PartialEq)]
pub enum WsError {
    /// Connection failed
    ConnectionFailed(String),
    /// Disconnected from server
    Disconnected,
    /// Failed to send message
    SendFailed(String),
    /// Failed to read from the socket
    ReceiveFailed(String),
    /// Invalid endpoint URL
    InvalidUrl(String),
}

impl std::fmt::Display for WsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WsError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            WsError::Disconnected => write!(f, "Disconnected from server"),
            WsError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            WsError::ReceiveFailed(msg) => write!(f, "Receive failed: {}", msg),
            WsError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for WsError {}

/// A frame read from the transport, reduced to what the status protocol
/// cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum WsFrame {
    /// Text frame carrying a JSON envelope
    Text(String),
    /// Close frame from the server
    Close,
    /// Binary, ping/pong or raw frames; ignored by the status protocol
    Other,
}

/// One open WebSocket connection.
#[async_trait]
pub trait WsTransport: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), WsError>;

    /// Read the next frame.
    ///
    /// Returns `None` once the stream has ended. Must be cancel safe: the
    /// socket polls it inside `tokio::select!`.
    async fn next_frame(&mut self) -> Option<Result<WsFrame, WsError>>;

    /// Close the connection. Errors are ignored; the transport is discarded
    /// afterwards either way.
    async fn close(&mut self);
}

/// Factory for transports.
///
/// # Example
///
/// ```ignore
/// use wepp_status::traits::WsConnector;
///
/// async fn open<C: WsConnector>(connector: &C) {
///     let mut transport = connector.connect("wss://wepp.cloud/weppcloud-microservices/status/run:wepp").await?;
///     transport.send_text(r#"{"type":"init"}"#.to_string()).await?;
/// }
/// ```
#[async_trait]
pub trait WsConnector: Send + Sync {
    /// Open a new connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn WsTransport>, WsError>;
}
