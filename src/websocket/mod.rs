//! WebSocket transport for job status channels.
//!
//! One [`ChannelSocket`] per `runId:channel` keeps a connection to the status
//! microservice alive, answers heartbeats, decodes envelopes and classifies
//! status lines. Sockets are shared through a [`ChannelHub`].

pub mod address;
pub mod client;
pub mod hub;
pub mod messages;

pub use address::{ChannelAddress, Endpoint, PREFLIGHT_CHANNEL};
pub use client::{ChannelSocket, ClassifiedLine, ConnectionState, SocketEvent, StatusMessage};
pub use hub::ChannelHub;
pub use messages::{decode, encode, parse, ControlMessage, Envelope};
