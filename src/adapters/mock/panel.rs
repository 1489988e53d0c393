//! Recording panels for testing.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::log_buffer::LogBuffer;
use crate::traits::{StacktracePanel, StatusPanel};

/// Everything a [`RecordingPanel`] has been asked to show.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelRecord {
    /// Every status line set, in order
    pub statuses: Vec<String>,
    /// Log text of the latest render
    pub log_text: String,
    /// Number of log renders
    pub renders: usize,
    /// Number of scroll-to-bottom requests
    pub scrolls: usize,
    /// Number of reveal calls
    pub reveals: usize,
    /// Every stacktrace body set, in order
    pub bodies: Vec<String>,
}

/// Panel that records calls instead of drawing. Implements both
/// [`StatusPanel`] and [`StacktracePanel`].
///
/// # Example
///
/// ```ignore
/// let panel = RecordingPanel::new();
/// let options = StatusStreamOptions::new(panel.clone(), "run-1", "wepp");
/// // ...
/// let record = panel.wait_until(|r| r.statuses.len() >= 2).await;
/// ```
#[derive(Debug, Clone)]
pub struct RecordingPanel {
    record: Arc<watch::Sender<PanelRecord>>,
    // Serializes read-modify-write so concurrent callers do not lose updates.
    guard: Arc<Mutex<()>>,
}

impl RecordingPanel {
    pub fn new() -> Self {
        let (record, _) = watch::channel(PanelRecord::default());
        Self {
            record: Arc::new(record),
            guard: Arc::new(Mutex::new(())),
        }
    }

    fn update(&self, f: impl FnOnce(&mut PanelRecord)) {
        let _guard = self.guard.lock().unwrap();
        self.record.send_modify(f);
    }

    /// Snapshot of everything recorded so far.
    pub fn record(&self) -> PanelRecord {
        self.record.borrow().clone()
    }

    /// The current status line, if one was ever set.
    pub fn status(&self) -> Option<String> {
        self.record.borrow().statuses.last().cloned()
    }

    /// Wait until `predicate` holds for the record, then return it.
    pub async fn wait_until(&self, predicate: impl Fn(&PanelRecord) -> bool) -> PanelRecord {
        let mut rx = self.record.subscribe();
        let result = rx.wait_for(|record| predicate(record)).await;
        match result {
            Ok(record) => record.clone(),
            Err(_) => self.record(),
        }
    }
}

impl Default for RecordingPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPanel for RecordingPanel {
    fn set_status(&self, text: &str) {
        self.update(|r| r.statuses.push(text.to_string()));
    }

    fn render_log(&self, log: &LogBuffer) {
        let text = log.text();
        self.update(|r| {
            r.log_text = text;
            r.renders += 1;
        });
    }

    fn scroll_to_bottom(&self) {
        self.update(|r| r.scrolls += 1);
    }
}

impl StacktracePanel for RecordingPanel {
    fn reveal(&self) {
        self.update(|r| r.reveals += 1);
    }

    fn set_body(&self, text: &str) {
        self.update(|r| r.bodies.push(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls() {
        let panel = RecordingPanel::new();
        panel.set_status("Connecting...");
        panel.set_status("Connected");

        let mut log = LogBuffer::new();
        log.append("one");
        log.append("two");
        panel.render_log(&log);
        panel.scroll_to_bottom();
        panel.reveal();
        panel.set_body("Traceback");

        let record = panel.record();
        assert_eq!(record.statuses, vec!["Connecting...", "Connected"]);
        assert_eq!(record.log_text, "one\ntwo");
        assert_eq!(record.renders, 1);
        assert_eq!(record.scrolls, 1);
        assert_eq!(record.reveals, 1);
        assert_eq!(record.bodies, vec!["Traceback"]);
        assert_eq!(panel.status().as_deref(), Some("Connected"));
    }

    #[tokio::test]
    async fn test_wait_until() {
        let panel = RecordingPanel::new();
        let writer = panel.clone();
        tokio::spawn(async move {
            writer.set_status("done");
        });
        let record = panel.wait_until(|r| !r.statuses.is_empty()).await;
        assert_eq!(record.statuses, vec!["done"]);
    }
}
