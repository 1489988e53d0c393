//! Concrete implementations of trait abstractions.
//!
//! Production adapters for the traits in `crate::traits`, plus test doubles
//! in [`mock`].
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`TungsteniteConnector`] - WebSocket connections using tokio-tungstenite

pub mod mock;
pub mod reqwest_http;
pub mod tungstenite_ws;

pub use mock::{MockConnector, MockHttpClient, RecordingPanel};
pub use reqwest_http::ReqwestHttpClient;
pub use tungstenite_ws::{TungsteniteConnector, TungsteniteTransport};
