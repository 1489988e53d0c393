//! Tungstenite-based WebSocket adapter.
//!
//! Implements [`WsConnector`] and [`WsTransport`] on top of
//! `tokio-tungstenite`. Protocol-level ping/pong frames are answered by
//! tungstenite itself; the status protocol's JSON `ping` envelopes arrive
//! here as ordinary text frames.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::traits::{WsConnector, WsError, WsFrame, WsTransport};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use wepp_status::adapters::TungsteniteConnector;
/// use wepp_status::websocket::{ChannelAddress, ChannelSocket};
///
/// let socket = ChannelSocket::new(
///     ChannelAddress::new("dusty-sandpiper", "wepp")?,
///     SocketConfig::default(),
///     Arc::new(TungsteniteConnector::new()),
/// );
/// socket.connect();
/// ```
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn WsTransport>, WsError> {
        let (stream, response) = connect_async(url).await.map_err(convert_error)?;
        debug!(url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

/// One open tungstenite connection.
pub struct TungsteniteTransport {
    stream: Stream,
}

#[async_trait]
impl WsTransport for TungsteniteTransport {
    async fn send_text(&mut self, text: String) -> Result<(), WsError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<WsFrame, WsError>> {
        let message = self.stream.next().await?;
        Some(match message {
            Ok(Message::Text(text)) => Ok(WsFrame::Text(text)),
            Ok(Message::Close(_)) => Ok(WsFrame::Close),
            Ok(_) => Ok(WsFrame::Other),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(WsFrame::Close)
            }
            Err(e) => Err(WsError::ReceiveFailed(e.to_string())),
        })
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}

fn convert_error(err: tungstenite::Error) -> WsError {
    match err {
        tungstenite::Error::Url(e) => WsError::InvalidUrl(e.to_string()),
        other => WsError::ConnectionFailed(other.to_string()),
    }
}
