//! WEPPcloud job status streaming.
//!
//! Follows the status channels of long-running model jobs over WebSocket,
//! classifies the status lines they carry, buffers them for display and
//! routes lifecycle triggers to attached controllers.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod log_buffer;
pub mod preflight;
pub mod stacktrace;
pub mod status_line;
pub mod status_stream;
pub mod traits;
pub mod websocket;

pub use config::{ReconnectPolicy, SocketConfig};
pub use error::{ErrorCategory, StatusError, StatusResult};
pub use status_stream::{StatusStream, StatusStreamOptions, StreamEvent, TriggerEvent};
pub use websocket::{ChannelAddress, ChannelHub, ChannelSocket, ConnectionState};
