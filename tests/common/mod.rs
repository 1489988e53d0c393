//! Common test utilities for integration tests.
//!
//! Fixtures for wiring sockets and streams against the mock connector,
//! plus recording controllers.
//!
//! # Example
//!
//! ```ignore
//! let connector = MockConnector::new();
//! let hub = test_hub(&connector);
//! let socket = hub.socket(&address("run-1", "wepp"));
//! socket.connect();
//! let server = connector.wait_for_connection(0).await;
//! ```

#![allow(dead_code)]

pub mod mocks;

pub use mocks::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use wepp_status::config::{ReconnectPolicy, SocketConfig};
use wepp_status::control::{EventSink, FormTrigger, HandlerError, TriggerPayload};
use wepp_status::websocket::{ChannelAddress, ChannelHub, ChannelSocket, ConnectionState};

/// Reconnect delay used by the default test config.
pub const TEST_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default config with the documented 5 second fixed reconnect delay.
pub fn test_config() -> SocketConfig {
    SocketConfig::new("status.test").with_reconnect(ReconnectPolicy::fixed(TEST_RECONNECT_DELAY))
}

/// Hub backed by `connector`.
pub fn test_hub(connector: &MockConnector) -> ChannelHub {
    ChannelHub::new(test_config(), Arc::new(connector.clone()))
}

/// Stand-alone socket backed by `connector`.
pub fn test_socket(connector: &MockConnector, config: SocketConfig) -> ChannelSocket {
    ChannelSocket::new(address("run-1", "wepp"), config, Arc::new(connector.clone()))
}

pub fn address(run_id: &str, channel: &str) -> ChannelAddress {
    ChannelAddress::new(run_id, channel).expect("valid test address")
}

/// Wait until the socket reaches `state`.
pub async fn wait_for_state(socket: &ChannelSocket, state: ConnectionState) {
    let mut rx = socket.state_receiver();
    rx.wait_for(|s| *s == state)
        .await
        .expect("socket state channel closed");
}

/// Controller that records every trigger it receives.
pub struct RecordingController {
    events: Mutex<Vec<(String, TriggerPayload)>>,
    count: watch::Sender<usize>,
}

impl RecordingController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            count: watch::channel(0).0,
        })
    }

    pub fn events(&self) -> Vec<(String, TriggerPayload)> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }

    pub async fn wait_for_events(&self, count: usize) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }
}

impl EventSink for RecordingController {
    fn trigger_event(&self, event: &str, payload: &TriggerPayload) -> Result<(), HandlerError> {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload.clone()));
        self.count.send_modify(|n| *n += 1);
        Ok(())
    }
}

/// Controller whose handler always panics.
pub struct PanickingController;

impl EventSink for PanickingController {
    fn trigger_event(&self, event: &str, _payload: &TriggerPayload) -> Result<(), HandlerError> {
        panic!("controller failed on {}", event);
    }
}

/// Controller that only understands bare form triggers.
#[derive(Default)]
pub struct LegacyFormController {
    pub fired: Mutex<Vec<String>>,
}

impl FormTrigger for LegacyFormController {
    fn trigger_form(&self, event: &str) -> Result<(), HandlerError> {
        self.fired.lock().unwrap().push(event.to_string());
        Ok(())
    }
}
