//! Channel addressing.

use std::fmt;

use crate::config::SocketConfig;
use crate::error::{StatusError, StatusResult};

/// Channel name used for the preflight endpoint.
pub const PREFLIGHT_CHANNEL: &str = "preflight";

/// Identifies one logical status stream: a channel of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    run_id: String,
    channel: String,
}

impl ChannelAddress {
    /// Create an address. Both parts must be non-empty.
    pub fn new(run_id: impl Into<String>, channel: impl Into<String>) -> StatusResult<Self> {
        let run_id = run_id.into();
        let channel = channel.into();
        if run_id.trim().is_empty() {
            return Err(StatusError::config("run id must not be empty"));
        }
        if channel.trim().is_empty() {
            return Err(StatusError::config("channel must not be empty"));
        }
        Ok(Self { run_id, channel })
    }

    /// Parse the `runId:channel` form. The channel is everything after the
    /// last colon.
    pub fn parse(segment: &str) -> StatusResult<Self> {
        match segment.rsplit_once(':') {
            Some((run_id, channel)) => Self::new(run_id, channel),
            None => Err(StatusError::config(format!(
                "expected runId:channel, got '{}'",
                segment
            ))),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The `runId:channel` URL path segment.
    pub fn segment(&self) -> String {
        format!("{}:{}", self.run_id, self.channel)
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.run_id, self.channel)
    }
}

/// What a socket connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Status lines of one channel
    Status(ChannelAddress),
    /// Readiness checklist of a run
    Preflight { run_id: String },
}

impl Endpoint {
    /// Channel that owns triggers arriving on this endpoint.
    pub fn channel(&self) -> &str {
        match self {
            Endpoint::Status(address) => address.channel(),
            Endpoint::Preflight { .. } => PREFLIGHT_CHANNEL,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Endpoint::Status(address) => address.run_id(),
            Endpoint::Preflight { run_id } => run_id,
        }
    }

    /// Short label used in log lines.
    pub fn label(&self) -> String {
        match self {
            Endpoint::Status(address) => address.segment(),
            Endpoint::Preflight { run_id } => format!("{}:{}", run_id, PREFLIGHT_CHANNEL),
        }
    }

    /// Full socket URL under `config`.
    pub fn url(&self, config: &SocketConfig) -> String {
        match self {
            Endpoint::Status(address) => format!(
                "{}/{}:{}",
                config.base_url(&config.status_path),
                urlencoding::encode(address.run_id()),
                urlencoding::encode(address.channel())
            ),
            Endpoint::Preflight { run_id } => format!(
                "{}/{}",
                config.base_url(&config.preflight_path),
                urlencoding::encode(run_id)
            ),
        }
    }
}

impl From<ChannelAddress> for Endpoint {
    fn from(address: ChannelAddress) -> Self {
        Endpoint::Status(address)
    }
}
