//! Mock implementations for testing.
//!
//! These implement the trait abstractions without network access so the
//! socket, stream and resolver can be driven deterministically.
//!
//! # Available Mocks
//!
//! - [`MockConnector`] - WebSocket connector with a scripted server side
//! - [`MockHttpClient`] - HTTP client with configurable responses
//! - [`RecordingPanel`] - Status and stacktrace panel that records calls

pub mod http;
pub mod panel;
pub mod websocket;

pub use http::{MockHttpClient, MockResponse, RecordedRequest};
pub use panel::{PanelRecord, RecordingPanel};
pub use websocket::{MockConnector, MockServer};
