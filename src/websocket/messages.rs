//! Wire envelopes exchanged with the status microservice.
//!
//! Every frame is a JSON object tagged by `type`. The client only ever
//! originates `init` (on open) and `pong` (in reply to `ping`); everything
//! else comes from the server and is treated as untrusted input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StatusError, StatusResult};

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Client hello, sent once per connection
    Init,
    /// Server liveness check; must be answered with [`Envelope::Pong`]
    Ping,
    /// Liveness reply
    Pong,
    /// Server asks the client to drop this connection
    Hangup,
    /// One or more status lines emitted by a running job
    Status { data: String },
    /// Readiness checklist for a run (preflight endpoint only)
    Preflight {
        #[serde(default)]
        checklist: BTreeMap<String, bool>,
        #[serde(default)]
        lock_statuses: BTreeMap<String, bool>,
    },
}

/// Control messages the client originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Init,
    Pong,
}

impl ControlMessage {
    /// Wire name of the message type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMessage::Init => "init",
            ControlMessage::Pong => "pong",
        }
    }
}

/// Produce the minimal JSON envelope for a client control message.
pub fn encode(kind: ControlMessage) -> String {
    serde_json::json!({ "type": kind.as_str() }).to_string()
}

/// Parse a raw text frame, reporting why it could not be understood.
pub fn parse(raw: &str) -> StatusResult<Envelope> {
    serde_json::from_str::<Envelope>(raw).map_err(|e| StatusError::Protocol(e.to_string()))
}

/// Parse a raw text frame.
///
/// Returns `None` for malformed JSON and for unknown or ill-typed
/// envelopes, so callers can drop corrupt frames without error handling.
pub fn decode(raw: &str) -> Option<Envelope> {
    match parse(raw) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            debug!(category = %err.category(), error = %err, "Dropping undecodable frame");
            None
        }
    }
}
