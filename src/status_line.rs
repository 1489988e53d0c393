//! Classification of the text sub-protocol embedded in status lines.
//!
//! Jobs report progress as free text. A few reserved markers inside that
//! text carry meaning for the client:
//!
//! - `COMMAND_BAR_RESULT <message>` - a result meant for the command bar
//! - `<tag><jobId> ... EXCEPTION ...` - the job failed; the first token is
//!   the job id behind a three-character tag
//! - `... TRIGGER <channel> <EVENT>` - a lifecycle signal for a controller
//!
//! Markers are checked in exactly that order, so a line carrying both
//! `EXCEPTION` and `TRIGGER` is an exception.

use crate::error::StatusError;

/// Marker for command-bar results.
pub const COMMAND_BAR_MARKER: &str = "COMMAND_BAR_RESULT";
/// Marker for job exceptions.
pub const EXCEPTION_MARKER: &str = "EXCEPTION";
/// Marker for lifecycle triggers.
pub const TRIGGER_MARKER: &str = "TRIGGER";
/// Maximum number of characters kept for the live status line.
pub const MAX_DISPLAY_CHARS: usize = 120;
/// Appended to truncated display text.
pub const ELLIPSIS: &str = "...";

/// Length of the tag in front of job ids in exception lines.
const JOB_ID_TAG_LEN: usize = 3;

/// Semantic meaning of one status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// Ordinary progress text, already shortened for the live status line.
    Plain { display: String },
    /// Text following the `COMMAND_BAR_RESULT` marker.
    CommandBarResult { message: String },
    /// Lifecycle signal addressed to `channel`.
    Trigger {
        channel: String,
        event: String,
        tokens: Vec<String>,
    },
    /// Job failure report.
    Exception { job_id: String, message: String },
}

impl StatusLine {
    /// The trigger event name, if this is a trigger addressed to `owner_channel`.
    pub fn trigger_for(&self, owner_channel: &str) -> Option<&str> {
        match self {
            StatusLine::Trigger { channel, event, .. } if channel == owner_channel => {
                Some(event.as_str())
            }
            _ => None,
        }
    }

    /// The failure this line reports, if it is an exception.
    pub fn job_failure(&self) -> Option<StatusError> {
        match self {
            StatusLine::Exception { job_id, message } => Some(StatusError::JobFailed {
                job_id: job_id.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }

    /// Text for the live status line, if this line updates it.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            StatusLine::Plain { display } => Some(display),
            StatusLine::CommandBarResult { message } => Some(message),
            _ => None,
        }
    }
}

/// Classify a status line.
///
/// `owner_channel` does not change the classification; it is used by
/// [`StatusLine::trigger_for`] callers to decide whether a trigger is
/// actionable. Triggers for other channels are still returned as triggers.
pub fn classify_status_line(line: &str, _owner_channel: &str) -> StatusLine {
    if let Some(idx) = line.find(COMMAND_BAR_MARKER) {
        let message = line[idx + COMMAND_BAR_MARKER.len()..].trim().to_string();
        return StatusLine::CommandBarResult { message };
    }

    if line.contains(EXCEPTION_MARKER) {
        let job_id = line
            .split_whitespace()
            .next()
            .map(|token| token.chars().skip(JOB_ID_TAG_LEN).collect())
            .unwrap_or_default();
        return StatusLine::Exception {
            job_id,
            message: line.to_string(),
        };
    }

    if line.contains(TRIGGER_MARKER) {
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        // Need at least `TRIGGER <channel> <EVENT>`.
        if tokens.len() >= 3 {
            let event = tokens[tokens.len() - 1].clone();
            let channel = tokens[tokens.len() - 2].clone();
            return StatusLine::Trigger {
                channel,
                event,
                tokens,
            };
        }
    }

    StatusLine::Plain {
        display: summarize(line),
    }
}

/// Shorten text for the live status line.
///
/// Keeps only the first line, followed by an ellipsis when more lines
/// follow, and caps the result at [`MAX_DISPLAY_CHARS`] characters.
pub fn summarize(text: &str) -> String {
    let trimmed = text.trim_end_matches(['\r', '\n']);
    let mut lines = trimmed.lines();
    let first = lines.next().unwrap_or("");
    let multi_line = lines.next().is_some();

    if first.chars().count() > MAX_DISPLAY_CHARS {
        let mut out: String = first.chars().take(MAX_DISPLAY_CHARS).collect();
        out.push_str(ELLIPSIS);
        out
    } else if multi_line {
        format!("{}{}", first, ELLIPSIS)
    } else {
        first.to_string()
    }
}

/// Check whether an extracted job id is usable in a job-info request.
pub fn is_valid_job_id(job_id: &str) -> bool {
    !job_id.is_empty()
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line() {
        assert_eq!(
            classify_status_line("Building climate files", "climate"),
            StatusLine::Plain {
                display: "Building climate files".to_string()
            }
        );
    }

    #[test]
    fn test_command_bar_result_takes_text_after_marker() {
        let line = "rq:9 COMMAND_BAR_RESULT   Set outlet to 44.2, -116.1  ";
        assert_eq!(
            classify_status_line(line, "wepp"),
            StatusLine::CommandBarResult {
                message: "Set outlet to 44.2, -116.1".to_string()
            }
        );
    }

    #[test]
    fn test_command_bar_result_wins_over_exception() {
        let line = "COMMAND_BAR_RESULT EXCEPTION in user input";
        assert!(matches!(
            classify_status_line(line, "wepp"),
            StatusLine::CommandBarResult { .. }
        ));
    }

    #[test]
    fn test_exception_strips_tag_from_first_token() {
        assert_eq!(
            classify_status_line("JID123 EXCEPTION Failure", "wepp"),
            StatusLine::Exception {
                job_id: "123".to_string(),
                message: "JID123 EXCEPTION Failure".to_string()
            }
        );
    }

    #[test]
    fn test_exception_with_short_first_token_has_empty_id() {
        match classify_status_line("ab EXCEPTION", "wepp") {
            StatusLine::Exception { job_id, .. } => assert!(job_id.is_empty()),
            other => panic!("Expected Exception, got {:?}", other),
        }
    }

    #[test]
    fn test_exception_checked_before_trigger() {
        let line = "rq:abc EXCEPTION TRIGGER wepp WEPP_RUN_TASK_COMPLETED";
        assert!(matches!(
            classify_status_line(line, "wepp"),
            StatusLine::Exception { .. }
        ));
    }

    #[test]
    fn test_trigger_uses_last_two_tokens() {
        let line = "rq:abc TRIGGER   wepp WEPP_RUN_TASK_COMPLETED";
        let classified = classify_status_line(line, "wepp");
        match &classified {
            StatusLine::Trigger {
                channel,
                event,
                tokens,
            } => {
                assert_eq!(channel, "wepp");
                assert_eq!(event, "WEPP_RUN_TASK_COMPLETED");
                assert_eq!(tokens.len(), 4);
                assert_eq!(tokens[0], "rq:abc");
            }
            other => panic!("Expected Trigger, got {:?}", other),
        }
        assert_eq!(classified.trigger_for("wepp"), Some("WEPP_RUN_TASK_COMPLETED"));
        assert_eq!(classified.trigger_for("fork"), None);
    }

    #[test]
    fn test_trigger_for_other_channel_still_classified() {
        let classified = classify_status_line("TRIGGER fork FORK_COMPLETE", "wepp");
        assert!(matches!(classified, StatusLine::Trigger { ref channel, .. } if channel == "fork"));
        assert_eq!(classified.trigger_for("wepp"), None);
    }

    #[test]
    fn test_incomplete_trigger_is_plain() {
        assert!(matches!(
            classify_status_line("TRIGGER wepp", "wepp"),
            StatusLine::Plain { .. }
        ));
    }

    #[test]
    fn test_classification_is_pure() {
        let line = "rq:1 TRIGGER team TEAM_DONE";
        assert_eq!(
            classify_status_line(line, "team"),
            classify_status_line(line, "team")
        );
    }

    #[test]
    fn test_plain_line_truncated_to_display_limit() {
        let line = "x".repeat(MAX_DISPLAY_CHARS + 30);
        match classify_status_line(&line, "wepp") {
            StatusLine::Plain { display } => {
                assert_eq!(display.chars().count(), MAX_DISPLAY_CHARS + ELLIPSIS.len());
                assert!(display.ends_with(ELLIPSIS));
            }
            other => panic!("Expected Plain, got {:?}", other),
        }
    }

    #[test]
    fn test_line_at_display_limit_is_untouched() {
        let line = "y".repeat(MAX_DISPLAY_CHARS);
        assert_eq!(summarize(&line), line);
    }

    #[test]
    fn test_summarize_multi_line_keeps_first_line() {
        assert_eq!(summarize("first\nsecond\nthird"), "first...");
        assert_eq!(summarize("only\n"), "only");
    }

    #[test]
    fn test_summarize_counts_characters_not_bytes() {
        let line = "é".repeat(MAX_DISPLAY_CHARS);
        assert_eq!(summarize(&line), line);
    }

    #[test]
    fn test_exception_reports_job_failure() {
        let line = classify_status_line("JID123 EXCEPTION Failure", "wepp");
        match line.job_failure() {
            Some(err) => {
                assert_eq!(err.category(), crate::error::ErrorCategory::JobFailure);
                assert_eq!(err.to_string(), "job 123 failed: JID123 EXCEPTION Failure");
            }
            None => panic!("Expected a job failure"),
        }
        assert!(classify_status_line("rq:1 building soils", "wepp")
            .job_failure()
            .is_none());
    }

    #[test]
    fn test_display_text() {
        assert_eq!(
            StatusLine::Plain {
                display: "a".to_string()
            }
            .display_text(),
            Some("a")
        );
        assert_eq!(
            StatusLine::CommandBarResult {
                message: "b".to_string()
            }
            .display_text(),
            Some("b")
        );
        assert_eq!(
            StatusLine::Exception {
                job_id: "1".to_string(),
                message: "m".to_string()
            }
            .display_text(),
            None
        );
    }

    #[test]
    fn test_job_id_validation() {
        assert!(is_valid_job_id("123"));
        assert!(is_valid_job_id("3f2b9c1e-77aa-4c51-9d3e-0b8f1c2d3e4f"));
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("12/../admin"));
        assert!(!is_valid_job_id("id with space"));
    }
}
