//! Display surfaces driven by the status stream.
//!
//! These stand in for the UI regions a status stream renders into. A panel
//! only ever receives already-decoded text; it never sees the socket.

use crate::log_buffer::LogBuffer;

/// A status region: one "current status" line plus a scrollable log.
pub trait StatusPanel: Send + Sync {
    /// Replace the visible current-status line.
    fn set_status(&self, text: &str);

    /// Re-render the scrollable log from the buffer, oldest entry first.
    fn render_log(&self, log: &LogBuffer);

    /// Scroll the log to its newest entry.
    fn scroll_to_bottom(&self) {}
}

/// The collapsible panel that shows a failed job's stacktrace.
pub trait StacktracePanel: Send + Sync {
    /// Unhide the panel and expand it if it is collapsible.
    fn reveal(&self);

    /// Write the stacktrace detail into the panel body.
    fn set_body(&self, text: &str);
}
