//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`WsConnector`] / [`WsTransport`] - WebSocket connections
//! - [`HttpClient`] - HTTP GET for job-info lookups
//! - [`StatusPanel`] - status line and log rendering surface
//! - [`StacktracePanel`] - stacktrace display surface

pub mod http;
pub mod panel;
pub mod websocket;

pub use http::{Headers, HttpClient, HttpError, Response};
pub use panel::{StacktracePanel, StatusPanel};
pub use websocket::{WsConnector, WsError, WsFrame, WsTransport};
