//! Bounded, ordered status log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// One appended log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Monotonic sequence number within the owning buffer.
    pub seq: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered in-memory log that keeps at most `limit` most-recent entries.
///
/// A limit of `None` (or `Some(0)`) means unbounded. Eviction is oldest
/// first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    limit: Option<usize>,
    next_seq: u64,
}

impl LogBuffer {
    /// Create an unbounded buffer.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a buffer retaining at most `limit` entries.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.filter(|l| *l > 0),
            next_seq: 0,
        }
    }

    /// Configured retention limit.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Append a line, evicting from the front while over the limit.
    pub fn append(&mut self, text: impl Into<String>) -> &LogEntry {
        let entry = LogEntry {
            seq: self.next_seq,
            text: text.into(),
            timestamp: Utc::now(),
        };
        self.next_seq += 1;
        self.entries.push_back(entry);

        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }

        // Just pushed, so the deque is non-empty.
        &self.entries[self.entries.len() - 1]
    }

    /// Snapshot of all retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + Clone {
        self.entries.iter()
    }

    /// Retained lines joined with newlines.
    pub fn text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Sequence numbers keep counting.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}
