//! Connection configuration.
//!
//! Use the builder methods to customize behavior, or [`SocketConfig::from_env`]
//! to pick settings up from `WEPP_STATUS_*` environment variables.
//!
//! ```ignore
//! use std::time::Duration;
//! use wepp_status::config::{ReconnectPolicy, SocketConfig};
//!
//! let config = SocketConfig::new("wepp.cloud")
//!     .with_reconnect(ReconnectPolicy::exponential(Duration::from_secs(1), Duration::from_secs(30)))
//!     .with_idle_timeout(Some(Duration::from_secs(90)));
//! ```

use std::time::Duration;

use crate::error::{StatusError, StatusResult};

/// Default host of the status microservice.
pub const DEFAULT_HOST: &str = "wepp.cloud";
/// Path prefix of status channels.
pub const DEFAULT_STATUS_PATH: &str = "/weppcloud-microservices/status";
/// Path prefix of the preflight channel.
pub const DEFAULT_PREFLIGHT_PATH: &str = "/weppcloud-microservices/preflight";
/// Fixed reconnect delay used when nothing else is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Capacity of each socket's event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Delay between reconnection attempts.
///
/// Retries never stop while the socket still wants to be connected; the
/// policy only decides how long to wait before each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt
    Fixed(Duration),
    /// Doubling delay starting at `initial`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        ReconnectPolicy::Fixed(delay)
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        ReconnectPolicy::Exponential { initial, max }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial
                    .checked_mul(1u32 << shift)
                    .map(|d| d.min(max))
                    .unwrap_or(max)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

/// Configuration shared by every channel socket.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketConfig {
    /// Host (and optional port) of the status microservice
    pub host: String,
    /// `wss://` when true, `ws://` otherwise
    pub use_tls: bool,
    /// Path prefix of status channels
    pub status_path: String,
    /// Path prefix of the preflight channel
    pub preflight_path: String,
    /// Delay policy between reconnection attempts
    pub reconnect: ReconnectPolicy,
    /// Drop the connection when no frame arrives for this long
    pub idle_timeout: Option<Duration>,
    /// Capacity of the per-socket event channel
    pub event_capacity: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            use_tls: true,
            status_path: DEFAULT_STATUS_PATH.to_string(),
            preflight_path: DEFAULT_PREFLIGHT_PATH.to_string(),
            reconnect: ReconnectPolicy::default(),
            idle_timeout: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SocketConfig {
    /// Create a config for `host` with default settings.
    pub fn new(host: impl Into<String>) -> Self {
        Self::default().with_host(host)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_status_path(mut self, path: impl Into<String>) -> Self {
        self.status_path = path.into();
        self
    }

    pub fn with_preflight_path(mut self, path: impl Into<String>) -> Self {
        self.preflight_path = path.into();
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// URL scheme for sockets.
    pub fn scheme(&self) -> &'static str {
        if self.use_tls {
            "wss"
        } else {
            "ws"
        }
    }

    /// Base URL of `path` on the configured host, without a trailing slash.
    pub fn base_url(&self, path: &str) -> String {
        let host = self.host.trim_end_matches('/');
        let path = path.trim_end_matches('/');
        if path.is_empty() || path.starts_with('/') {
            format!("{}://{}{}", self.scheme(), host, path)
        } else {
            format!("{}://{}/{}", self.scheme(), host, path)
        }
    }

    /// Build a config from environment variables.
    ///
    /// - `WEPP_STATUS_HOST` - host[:port] of the status service
    /// - `WEPP_STATUS_INSECURE` - use `ws://` instead of `wss://` when set
    /// - `WEPP_STATUS_RECONNECT_SECS` - reconnect delay in seconds
    /// - `WEPP_STATUS_MAX_RECONNECT_SECS` - switch to exponential backoff
    ///   capped at this many seconds
    /// - `WEPP_STATUS_IDLE_TIMEOUT_SECS` - drop silent connections
    pub fn from_env() -> StatusResult<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("WEPP_STATUS_HOST") {
            if !host.trim().is_empty() {
                config.host = host.trim().to_string();
            }
        }

        if std::env::var("WEPP_STATUS_INSECURE").is_ok() {
            config.use_tls = false;
        }

        let delay = env_secs("WEPP_STATUS_RECONNECT_SECS")?.unwrap_or(DEFAULT_RECONNECT_DELAY);
        config.reconnect = match env_secs("WEPP_STATUS_MAX_RECONNECT_SECS")? {
            Some(max) => ReconnectPolicy::exponential(delay, max.max(delay)),
            None => ReconnectPolicy::fixed(delay),
        };

        config.idle_timeout = env_secs("WEPP_STATUS_IDLE_TIMEOUT_SECS")?;

        Ok(config)
    }
}

fn env_secs(name: &str) -> StatusResult<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| StatusError::config(format!("{} must be a whole number of seconds, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
