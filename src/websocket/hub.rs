//! Registry of channel sockets.
//!
//! The hub is built once at application wiring time and passed by
//! reference to everything that needs a channel. Asking for the same
//! endpoint twice returns the same socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::address::{ChannelAddress, Endpoint};
use super::client::ChannelSocket;
use crate::config::SocketConfig;
use crate::traits::WsConnector;

pub struct ChannelHub {
    config: SocketConfig,
    connector: Arc<dyn WsConnector>,
    sockets: Mutex<HashMap<Endpoint, Arc<ChannelSocket>>>,
}

impl ChannelHub {
    pub fn new(config: SocketConfig, connector: Arc<dyn WsConnector>) -> Self {
        Self {
            config,
            connector,
            sockets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Socket for a status channel, created on first use.
    pub fn socket(&self, address: &ChannelAddress) -> Arc<ChannelSocket> {
        self.get_or_create(Endpoint::Status(address.clone()))
    }

    /// Socket for the preflight endpoint of a run, created on first use.
    pub fn preflight(&self, run_id: &str) -> Arc<ChannelSocket> {
        self.get_or_create(Endpoint::Preflight {
            run_id: run_id.to_string(),
        })
    }

    /// Existing socket for an endpoint.
    pub fn get(&self, endpoint: &Endpoint) -> Option<Arc<ChannelSocket>> {
        self.sockets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .cloned()
    }

    /// Disconnect and forget a socket.
    pub fn remove(&self, endpoint: &Endpoint) -> Option<Arc<ChannelSocket>> {
        let removed = self
            .sockets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(endpoint);
        if let Some(socket) = &removed {
            socket.disconnect();
        }
        removed
    }

    /// Disconnect every socket. Sockets stay registered and can reconnect.
    pub fn disconnect_all(&self) {
        let sockets: Vec<Arc<ChannelSocket>> = self
            .sockets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for socket in sockets {
            socket.disconnect();
        }
    }

    pub fn len(&self) -> usize {
        self.sockets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_create(&self, endpoint: Endpoint) -> Arc<ChannelSocket> {
        let mut sockets = self.sockets.lock().unwrap_or_else(|e| e.into_inner());
        sockets
            .entry(endpoint)
            .or_insert_with_key(|endpoint| {
                debug!(channel = %endpoint.label(), "Creating channel socket");
                Arc::new(ChannelSocket::new(
                    endpoint.clone(),
                    self.config.clone(),
                    self.connector.clone(),
                ))
            })
            .clone()
    }
}
