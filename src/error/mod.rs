//! Unified error handling for the status-streaming client.
//!
//! Seam-level errors ([`WsError`], [`HttpError`]) stay small and `Clone` so
//! they can travel through channels. [`StatusError`] wraps them for callers
//! that want a single error type, and [`ErrorCategory`] classifies every
//! variant the same way the streaming core contains it:
//!
//! | Category | Contained by | Retryable |
//! |----------|--------------|-----------|
//! | Transport | channel socket reconnect loop | Yes |
//! | Protocol | envelope decoder (frame dropped) | No |
//! | JobFailure | stacktrace resolver | No |
//! | Dispatch | controller attachment slot | No |
//! | Configuration | caller | No |

mod category;

pub use category::ErrorCategory;

use thiserror::Error;

use crate::traits::{HttpError, WsError};

/// Error type for status-stream operations.
#[derive(Debug, Error)]
pub enum StatusError {
    /// WebSocket transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] WsError),

    /// HTTP failure while fetching job details.
    #[error("job info request failed: {0}")]
    Http(#[from] HttpError),

    /// Frame or payload that could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The monitored job reported an exception.
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// An attached controller failed while handling a trigger.
    #[error("controller failed handling {event}: {message}")]
    Dispatch { event: String, message: String },

    /// Invalid configuration or argument.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StatusError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StatusError::Transport(_) => ErrorCategory::Transport,
            StatusError::Http(err) => {
                if err.is_transient() {
                    ErrorCategory::Transport
                } else {
                    ErrorCategory::Protocol
                }
            }
            StatusError::Protocol(_) => ErrorCategory::Protocol,
            StatusError::JobFailed { .. } => ErrorCategory::JobFailure,
            StatusError::Dispatch { .. } => ErrorCategory::Dispatch,
            StatusError::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Check if this error is likely transient and can be retried.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        StatusError::Configuration(message.into())
    }
}

/// Type alias for Results using [`StatusError`].
pub type StatusResult<T> = Result<T, StatusError>;
