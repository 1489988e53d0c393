//! Plain-text panel for the tail command.

use std::io::{self, Write};
use std::sync::Mutex;

use crate::log_buffer::LogBuffer;
use crate::traits::{StacktracePanel, StatusPanel};

#[derive(Default)]
struct Printed {
    /// Sequence number of the newest printed log entry
    last_seq: Option<u64>,
    last_line: Option<String>,
    last_status: Option<String>,
}

/// Writes new log lines as they arrive, plus status changes that are not
/// already visible as a log line.
pub struct TerminalPanel<W: Write + Send> {
    out: Mutex<W>,
    printed: Mutex<Printed>,
}

impl TerminalPanel<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalPanel<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            printed: Mutex::new(Printed::default()),
        }
    }

    /// Consume the panel and return the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        // A closed stdout is not worth failing the stream for.
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

impl<W: Write + Send> StatusPanel for TerminalPanel<W> {
    fn set_status(&self, text: &str) {
        {
            let mut printed = self.printed.lock().unwrap_or_else(|e| e.into_inner());
            if printed.last_status.as_deref() == Some(text)
                || printed.last_line.as_deref() == Some(text)
            {
                printed.last_status = Some(text.to_string());
                return;
            }
            printed.last_status = Some(text.to_string());
        }
        self.write_line(&format!("-- {}", text));
    }

    fn render_log(&self, log: &LogBuffer) {
        let mut printed = self.printed.lock().unwrap_or_else(|e| e.into_inner());
        let fresh: Vec<_> = log
            .iter()
            .filter(|entry| printed.last_seq.map_or(true, |seq| entry.seq > seq))
            .collect();

        for entry in fresh {
            self.write_line(&format!("[{}] {}", entry.timestamp.format("%H:%M:%S"), entry.text));
            printed.last_seq = Some(entry.seq);
            printed.last_line = Some(entry.text.clone());
        }
    }
}

impl<W: Write + Send> StacktracePanel for TerminalPanel<W> {
    fn reveal(&self) {
        self.write_line("==== stacktrace ====");
    }

    fn set_body(&self, text: &str) {
        self.write_line(text);
        self.write_line("====================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(panel: TerminalPanel<Vec<u8>>) -> String {
        String::from_utf8(panel.into_inner()).unwrap()
    }

    #[test]
    fn test_prints_only_new_entries() {
        let panel = TerminalPanel::new(Vec::new());
        let mut log = LogBuffer::new();
        log.append("one");
        panel.render_log(&log);
        log.append("two");
        panel.render_log(&log);
        panel.render_log(&log);

        let text = output(panel);
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().ends_with("] one"));
        assert!(text.lines().nth(1).unwrap().ends_with("] two"));
    }

    #[test]
    fn test_status_echo_is_suppressed() {
        let panel = TerminalPanel::new(Vec::new());
        panel.set_status("Connecting...");
        panel.set_status("Connecting...");

        let mut log = LogBuffer::new();
        log.append("building soils");
        panel.render_log(&log);
        panel.set_status("building soils");

        let text = output(panel);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "-- Connecting...");
    }

    #[test]
    fn test_stacktrace_block() {
        let panel = TerminalPanel::new(Vec::new());
        panel.reveal();
        panel.set_body("Traceback");
        let text = output(panel);
        assert!(text.contains("==== stacktrace ====\nTraceback\n"));
    }
}
