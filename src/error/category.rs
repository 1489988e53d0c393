//! Error category classification for status-stream failures.
//!
//! Categories follow the failure taxonomy of the streaming core: each layer
//! contains its own failures, and the category decides whether the failure
//! feeds the reconnect policy or is simply reported.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket-level failures (connect refused, reset, TLS).
    /// Logged and fed into the reconnect policy.
    Transport,

    /// Malformed frames or unexpected envelope types.
    /// Dropped silently, never surfaced to callers.
    Protocol,

    /// A monitored job reported an exception in-band.
    /// Surfaced through the stacktrace panel.
    JobFailure,

    /// An attached controller failed while handling a trigger.
    /// Caught at the registry boundary and logged.
    Dispatch,

    /// Invalid settings, addresses or command-line arguments.
    Configuration,
}

impl ErrorCategory {
    /// Returns true if errors in this category are transient and the
    /// operation is retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transport)
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::JobFailure => "job_failure",
            ErrorCategory::Dispatch => "dispatch",
            ErrorCategory::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
