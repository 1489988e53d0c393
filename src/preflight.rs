//! Preflight checklist client.
//!
//! The preflight endpoint of a run reports which pipeline stages are done
//! and which are locked. [`PreflightMonitor`] keeps the latest report in a
//! `watch` channel so any number of readers can poll or await changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{StatusError, StatusResult};
use crate::websocket::{ChannelHub, ChannelSocket, SocketEvent};

/// Latest preflight report of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightState {
    pub checklist: BTreeMap<String, bool>,
    pub lock_statuses: BTreeMap<String, bool>,
    /// When the report arrived; `None` until the first one does
    pub updated_at: Option<DateTime<Utc>>,
}

impl PreflightState {
    /// Whether `stage` is reported complete.
    pub fn is_complete(&self, stage: &str) -> bool {
        self.checklist.get(stage).copied().unwrap_or(false)
    }

    /// Whether `stage` is reported locked.
    pub fn is_locked(&self, stage: &str) -> bool {
        self.lock_statuses.get(stage).copied().unwrap_or(false)
    }

    /// Completed stages, sorted by name.
    pub fn completed(&self) -> Vec<&str> {
        self.checklist
            .iter()
            .filter(|(_, done)| **done)
            .map(|(stage, _)| stage.as_str())
            .collect()
    }

    /// Locked stages, sorted by name.
    pub fn locked(&self) -> Vec<&str> {
        self.lock_statuses
            .iter()
            .filter(|(_, locked)| **locked)
            .map(|(stage, _)| stage.as_str())
            .collect()
    }

    /// Whether any report has arrived.
    pub fn is_received(&self) -> bool {
        self.updated_at.is_some()
    }
}

/// Follows the preflight endpoint of one run.
pub struct PreflightMonitor {
    run_id: String,
    socket: Arc<ChannelSocket>,
    state: watch::Receiver<PreflightState>,
    task: JoinHandle<()>,
}

impl PreflightMonitor {
    /// Subscribe to the preflight socket of `run_id` and connect it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(hub: &ChannelHub, run_id: &str) -> StatusResult<Self> {
        if run_id.trim().is_empty() {
            return Err(StatusError::config("run id must not be empty"));
        }

        let socket = hub.preflight(run_id);
        let (state_tx, state) = watch::channel(PreflightState::default());
        let events = socket.subscribe();
        let task = tokio::spawn(follow(run_id.to_string(), events, state_tx));

        info!(run_id, "Following preflight checklist");
        socket.retain();
        socket.connect();

        Ok(Self {
            run_id: run_id.to_string(),
            socket,
            state,
            task,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Latest report.
    pub fn state(&self) -> PreflightState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified on every new report.
    pub fn subscribe(&self) -> watch::Receiver<PreflightState> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    pub fn disconnect(&self) {
        self.socket.disconnect();
    }
}

impl Drop for PreflightMonitor {
    fn drop(&mut self) {
        self.task.abort();
        self.socket.release();
    }
}

async fn follow(
    run_id: String,
    mut events: broadcast::Receiver<SocketEvent>,
    state_tx: watch::Sender<PreflightState>,
) {
    loop {
        match events.recv().await {
            Ok(SocketEvent::Preflight {
                checklist,
                lock_statuses,
            }) => {
                debug!(
                    run_id = %run_id,
                    completed = checklist.values().filter(|v| **v).count(),
                    locked = lock_statuses.values().filter(|v| **v).count(),
                    "Preflight update"
                );
                state_tx.send_replace(PreflightState {
                    checklist,
                    lock_statuses,
                    updated_at: Some(Utc::now()),
                });
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(run_id = %run_id, skipped, "Preflight monitor fell behind");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
